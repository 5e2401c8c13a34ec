//! Typing-animation subtitle generation (ASS).
//!
//! Two event shapes are supported: karaoke (one event per display row, the
//! reveal encoded with per-character `\kf` ticks) and per-character events
//! (one dialogue per revealed prefix). Karaoke is the default; it keeps the
//! event count low and lets libass fix the layout once per row.
//!
//! Row positions are taken from the same [`BandPlan`] the overlay painter
//! used, so typed glyphs land inside the painted band to the pixel.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use lform_models::{BandPlan, RenderSettings, ScenePlan, TextSegment};

use crate::error::MediaResult;
use crate::font::ResolvedFont;

/// ASS colours in `&HAABBGGRR`.
const DEFAULT_OUTLINE: &str = "&H00222222";
const DEFAULT_BACK: &str = "&H64000000";

/// Builds the per-scene `.ass` file for the typing overlay.
#[derive(Debug, Clone)]
pub struct AssBuilder {
    width: u32,
    height: u32,
    font_size: u32,
    typing_speed: f64,
    font_name: String,
    bold: bool,
    primary: String,
    outline: String,
    back: String,
    outline_width: u32,
    shadow: u32,
}

impl AssBuilder {
    pub fn new(settings: &RenderSettings, font: &ResolvedFont) -> Self {
        let primary = settings
            .text
            .text_color()
            .map(|c| c.to_ass())
            .unwrap_or_else(|_| "&H00FFFFFF".to_string());
        Self {
            width: settings.video.width,
            height: settings.video.height,
            font_size: settings.text.default_size,
            typing_speed: if settings.overlay.typing_speed > 0.0 {
                settings.overlay.typing_speed
            } else {
                1.0
            },
            font_name: font
                .style_name()
                .unwrap_or("Noto Sans JP")
                .to_string(),
            bold: font.bold,
            primary,
            outline: DEFAULT_OUTLINE.to_string(),
            back: DEFAULT_BACK.to_string(),
            outline_width: 3,
            shadow: 0,
        }
    }

    /// Style override for the subtitles filter, pinning libass to the
    /// resolved font.
    pub fn force_style(&self) -> String {
        format!(
            "FontName={},Bold={}",
            self.font_name,
            i32::from(self.bold)
        )
    }

    /// Karaoke events for every visible segment of a scene.
    ///
    /// `plans` must align index-wise with `scene.segments`.
    pub fn karaoke_for_scene(&self, scene: &ScenePlan, plans: &[BandPlan]) -> String {
        let mut out = self.header(8);
        for (segment, plan) in scene.segments.iter().zip(plans) {
            self.push_karaoke_segment(&mut out, segment, plan);
        }
        out
    }

    /// Per-character events; one dialogue per revealed prefix per row.
    pub fn per_char_for_scene(&self, scene: &ScenePlan, plans: &[BandPlan]) -> String {
        let mut out = self.header(7);
        for (segment, plan) in scene.segments.iter().zip(plans) {
            self.push_per_char_segment(&mut out, segment, plan);
        }
        out
    }

    /// Write subtitle content under `<dir>/<scene_id>.ass`.
    pub fn write(&self, dir: &Path, scene_id: &str, content: &str) -> MediaResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{scene_id}.ass"));
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn header(&self, alignment: u8) -> String {
        format!(
            "[Script Info]\n\
             ScriptType: v4.00+\n\
             PlayResX: {width}\n\
             PlayResY: {height}\n\
             ScaledBorderAndShadow: yes\n\
             [V4+ Styles]\n\
             Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,BackColour,\
             Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,\
             Alignment,MarginL,MarginR,MarginV,Encoding\n\
             Style: Typing,{font},{size},{primary},&H00FFFFFF,{outline},{back},\
             {bold},0,0,0,100,100,0,0,1,{outline_w},{shadow},{alignment},0,0,0,1\n\
             [Events]\n\
             Format: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text\n",
            width = self.width,
            height = self.height,
            font = self.font_name,
            size = self.font_size,
            primary = self.primary,
            outline = self.outline,
            back = self.back,
            bold = i32::from(self.bold),
            outline_w = self.outline_width,
            shadow = self.shadow,
            alignment = alignment,
        )
    }

    /// Auto-fitted typing rate for a segment: the full text finishes inside
    /// the segment at speed 1.0; higher speeds finish earlier.
    fn chars_per_second(&self, total_chars: usize, duration: f64) -> f64 {
        let base = total_chars as f64 / duration.max(0.01);
        (base * self.typing_speed).max(1.0)
    }

    fn push_karaoke_segment(&self, out: &mut String, segment: &TextSegment, plan: &BandPlan) {
        if segment.duration <= 0.0 || segment.is_blank() {
            return;
        }
        let rows: Vec<String> = segment.lines.iter().map(|l| escape_ass_text(l)).collect();
        let total_chars: usize = rows.iter().map(|r| r.chars().count()).sum();
        if total_chars == 0 {
            return;
        }
        let cps = self.chars_per_second(total_chars, segment.duration);
        let seg_end = segment.end_offset();
        let cx = self.width / 2;

        let mut row_start = segment.start_offset;
        for (index, row) in rows.iter().enumerate() {
            let n = row.chars().count();
            if n == 0 {
                continue;
            }
            let y = plan.line_top_on_canvas(self.height, index);
            let highlight = (n as f64 / cps).min((seg_end - row_start).max(0.01));
            let total_ticks = ((highlight * 100.0).round() as usize).max(n);
            let base = (total_ticks / n).max(1);
            let remainder = total_ticks.saturating_sub(base * n);

            let mut text = format!("{{\\an8\\pos({cx},{y})\\q2\\2a&HFF&}}");
            for (i, ch) in row.chars().enumerate() {
                let ticks = base + usize::from(i < remainder);
                let _ = write!(text, "{{\\kf{ticks}}}{ch}");
            }
            let _ = writeln!(
                out,
                "Dialogue: 0,{},{},Typing,,0,0,0,,{}",
                format_ass_time(row_start),
                format_ass_time(seg_end),
                text
            );
            row_start += n as f64 / cps;
        }
    }

    fn push_per_char_segment(&self, out: &mut String, segment: &TextSegment, plan: &BandPlan) {
        if segment.duration <= 0.0 || segment.is_blank() {
            return;
        }
        let rows: Vec<String> = segment.lines.iter().map(|l| escape_ass_text(l)).collect();
        let total_chars: usize = rows.iter().map(|r| r.chars().count()).sum();
        if total_chars == 0 {
            return;
        }
        let cps = self.chars_per_second(total_chars, segment.duration);
        let seg_end = segment.end_offset();

        let mut row_start = segment.start_offset;
        for (index, row) in rows.iter().enumerate() {
            let n = row.chars().count();
            if n == 0 {
                continue;
            }
            let (line_x, _) = plan.line_origin(index);
            let x = line_x;
            let y = plan.line_top_on_canvas(self.height, index);
            let pos_tag = format!("{{\\pos({x},{y})}}");

            let chars: Vec<char> = row.chars().collect();
            for i in 1..=n {
                let t0 = row_start + (i - 1) as f64 / cps;
                let t1 = if i == n {
                    seg_end
                } else {
                    row_start + i as f64 / cps
                };
                let snippet: String = chars[..i].iter().collect();
                let _ = writeln!(
                    out,
                    "Dialogue: 0,{},{},Typing,,0,0,0,,{}{}",
                    format_ass_time(t0),
                    format_ass_time(t1),
                    pos_tag,
                    snippet
                );
            }
            row_start += n as f64 / cps;
        }
    }
}

/// ASS timestamp `H:MM:SS.CC`.
pub fn format_ass_time(seconds: f64) -> String {
    let cs_total = (seconds.max(0.0) * 100.0).round() as u64;
    let h = cs_total / 360_000;
    let m = (cs_total % 360_000) / 6_000;
    let s = (cs_total % 6_000) / 100;
    let cs = cs_total % 100;
    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

/// The single escape point for subtitle text.
///
/// ASS has no escape for braces, so they are swapped for their full-width
/// forms; backslashes likewise. Hard breaks become libass breaks.
pub fn escape_ass_text(text: &str) -> String {
    text.replace('{', "｛")
        .replace('}', "｝")
        .replace('\\', "＼")
        .replace('\t', "    ")
        .replace('\r', "")
        .replace('\n', "\\N")
}
