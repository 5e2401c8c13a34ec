//! Filter-graph assembly.
//!
//! Graphs are built as a list of labelled stages and serialised once; no
//! string splicing mid-stage. Input indices are assigned by the scene
//! renderer and passed in explicitly so overlay ordering stays visible.

use std::path::{Path, PathBuf};

use crate::kenburns::{PanPath, ZoomPanSpec};

/// An ordered list of filter stages, joined with `;`.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: impl Into<String>) {
        self.stages.push(stage.into());
    }

    pub fn join(&self) -> String {
        self.stages.join(";")
    }
}

/// Timed visibility of one band overlay input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayWindow {
    /// FFmpeg input index of the looped band PNG.
    pub input_index: usize,
    pub start: f64,
    pub end: f64,
}

/// The Ken-Burns stage of a content scene.
#[derive(Debug, Clone)]
pub enum BaseStage {
    PanOnly(PanPath),
    ZoomPan(ZoomPanSpec),
}

/// Typing-subtitle stage appended after the overlays.
#[derive(Debug, Clone)]
pub struct SubtitleStage {
    pub ass_path: PathBuf,
    pub fonts_dir: Option<PathBuf>,
    pub force_style: Option<String>,
}

/// Opening scene graph: centred title over the black lavfi canvas.
pub fn opening_graph(fps: u32) -> String {
    let mut chain = FilterChain::new();
    chain.push(format!(
        "[0:v][1:v]overlay=x=(W-w)/2:y=(H-h)/2:eval=init:format=auto,\
         fps={fps},format=yuv420p[vout]"
    ));
    chain.join()
}

/// Content scene graph: Ken-Burns base, gated band overlays, optional
/// typing subtitles, final pixel format.
pub fn content_graph(
    base: &BaseStage,
    overlays: &[OverlayWindow],
    subtitles: Option<&SubtitleStage>,
) -> String {
    let mut chain = FilterChain::new();

    match base {
        BaseStage::PanOnly(path) => {
            chain.push(format!(
                "[0:v]scale={sw}:{sh},setsar=1,crop={w}:{h}:x='{x}':y='{y}'[base]",
                sw = path.scaled_w,
                sh = path.scaled_h,
                w = path.canvas_w,
                h = path.canvas_h,
                x = path.crop_x_expr(),
                y = path.crop_y_expr(),
            ));
        }
        BaseStage::ZoomPan(spec) => {
            chain.push(format!("[0:v]{}[base]", spec.to_filter()));
        }
    }

    let mut last = "[base]".to_string();
    for (i, window) in overlays.iter().enumerate() {
        let label = format!("[v{i}]");
        chain.push(format!(
            "{last}[{idx}:v]overlay=x=0:y=H-h:enable='between(t,{start:.3},{end:.3})'{label}",
            idx = window.input_index,
            start = window.start,
            end = window.end,
        ));
        last = label;
    }

    if let Some(stage) = subtitles {
        let mut filter = format!(
            "subtitles=filename='{}'",
            escape_filter_path(&stage.ass_path)
        );
        if let Some(fonts_dir) = &stage.fonts_dir {
            filter.push_str(&format!(":fontsdir='{}'", escape_filter_path(fonts_dir)));
        }
        if let Some(style) = &stage.force_style {
            filter.push_str(&format!(":force_style='{style}'"));
        }
        chain.push(format!("{last}{filter}[vsub]"));
        last = "[vsub]".to_string();
    }

    chain.push(format!("{last}format=yuv420p[vout]"));
    chain.join()
}

/// Quote-escape a path for use inside a single-quoted filter option.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
