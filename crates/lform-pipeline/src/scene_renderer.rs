//! Per-scene rendering.
//!
//! Gathers a scene's inputs (painted overlays, subtitle file, probed image
//! dimensions), composes the filter graph and drives one FFmpeg invocation
//! writing `scenes/<id>.mp4`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use lform_media::{
    command::{encode_args, FfmpegCommand, FfmpegRunner},
    filtergraph::{content_graph, opening_graph, BaseStage, OverlayWindow, SubtitleStage},
    kenburns::{PanPath, ZoomPanSpec},
    probe::probe_dimensions,
    AssBuilder, MediaError, MediaResult, OverlayPainter, ProgressAccumulator, RenderBar,
};
use lform_models::{
    KenBurnsMode, KenBurnsProfile, OverlayKind, RenderSettings, ScenePlan, TypingEvents,
};

use crate::pipeline::RunPaths;

/// How a scene reports render progress.
pub enum SceneProgress {
    /// Sole expected work: own the interactive bar.
    Interactive(Arc<RenderBar>),
    /// One of many parallel scenes feeding the joined bar.
    Shared {
        accumulator: Arc<ProgressAccumulator>,
        index: usize,
    },
    Silent,
}

/// Renders individual scenes.
pub struct SceneRenderer {
    settings: RenderSettings,
    profile: KenBurnsProfile,
    painter: OverlayPainter,
    ass: AssBuilder,
}

impl SceneRenderer {
    pub fn new(settings: RenderSettings) -> MediaResult<Self> {
        let painter = OverlayPainter::new(&settings)?;
        let ass = AssBuilder::new(&settings, painter.body_font());
        let profile = settings.animation.profile();
        Ok(Self {
            settings,
            profile,
            painter,
            ass,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render one scene to `scenes/<id>.mp4`.
    pub async fn render_scene(
        &self,
        paths: &RunPaths,
        scene: &ScenePlan,
        runner: &FfmpegRunner,
        progress: SceneProgress,
    ) -> MediaResult<PathBuf> {
        let output = paths.scene_output(&scene.id);
        info!(scene_id = %scene.id, "Rendering scene ({:.2}s)", scene.duration_seconds);

        let cmd = if scene.is_opening() {
            self.opening_command(paths, scene, &output)?
        } else {
            self.content_command(paths, scene, &output).await?
        };

        let duration = scene.duration_seconds;
        match progress {
            SceneProgress::Interactive(bar) => {
                bar.set_label(scene.id.clone());
                let reporter = Arc::clone(&bar);
                runner
                    .run_with_progress(&cmd, duration, move |t| reporter.update(t))
                    .await?;
                bar.finish();
            }
            SceneProgress::Shared { accumulator, index } => {
                let reporter = Arc::clone(&accumulator);
                runner
                    .run_with_progress(&cmd, duration, move |t| reporter.report(index, t))
                    .await?;
                accumulator.complete_scene(index);
            }
            SceneProgress::Silent => {
                runner.run(&cmd, duration).await?;
            }
        }
        Ok(output)
    }

    fn opening_command(
        &self,
        paths: &RunPaths,
        scene: &ScenePlan,
        output: &std::path::Path,
    ) -> MediaResult<FfmpegCommand> {
        let video = &self.settings.video;
        let duration = scene.duration_seconds.max(0.01);
        let title_lines = scene
            .segments
            .first()
            .map(|s| s.lines.clone())
            .unwrap_or_default();
        let title_png =
            self.painter
                .paint_opening_title(&paths.overlays_dir, &scene.id, &title_lines)?;

        let cmd = FfmpegCommand::new(output)
            .lavfi(
                [
                    "-t".to_string(),
                    format!("{duration:.3}"),
                    "-r".to_string(),
                    video.fps.to_string(),
                ],
                format!("color=c=black:size={}x{}", video.width, video.height),
            )
            .looped_image(&title_png, video.fps, duration)
            .input(&scene.narration_audio_path)
            .filter_complex(opening_graph(video.fps))
            .map("[vout]")
            .map("2:a:0")
            .args(encode_args(&self.settings))
            .shortest();
        Ok(cmd)
    }

    async fn content_command(
        &self,
        paths: &RunPaths,
        scene: &ScenePlan,
        output: &std::path::Path,
    ) -> MediaResult<FfmpegCommand> {
        let video = &self.settings.video;
        let duration = scene.duration_seconds.max(0.01);
        let canvas = (video.width, video.height);

        let image = scene
            .base_image_path
            .as_ref()
            .ok_or_else(|| MediaError::AssetMissing(PathBuf::from(format!("{}.png", scene.id))))?;
        if !image.exists() {
            return Err(MediaError::AssetMissing(image.clone()));
        }

        let typing = self.settings.overlay.kind == OverlayKind::Typing;

        // Base Ken-Burns stage; pan_only needs the source dimensions to plan
        // the crop path, zoompan expands a single frame on its own.
        let (base, mut cmd) = match self.profile.mode {
            KenBurnsMode::PanOnly => {
                let dims = probe_dimensions(image).await?;
                let path = PanPath::plan(
                    &self.profile,
                    scene.motion_vector,
                    dims,
                    canvas,
                    duration,
                    scene.intro_relief_seconds,
                );
                let cmd = FfmpegCommand::new(output).looped_image(image, video.fps, duration);
                (BaseStage::PanOnly(path), cmd)
            }
            KenBurnsMode::Zoompan => {
                let spec = ZoomPanSpec::plan(
                    &self.profile,
                    scene.motion_vector,
                    canvas,
                    video.fps,
                    duration,
                );
                let cmd = FfmpegCommand::new(output).input(image);
                (BaseStage::ZoomPan(spec), cmd)
            }
        };

        // One looped band PNG input per visible segment.
        let mut windows = Vec::new();
        for segment in scene.visible_segments() {
            let overlay =
                self.painter
                    .paint_band(&paths.overlays_dir, &scene.id, segment, !typing)?;
            windows.push(OverlayWindow {
                input_index: cmd.input_count(),
                start: segment.start_offset,
                end: segment.end_offset(),
            });
            cmd = cmd.looped_image(&overlay.path, video.fps, duration);
        }

        let subtitles = if typing {
            let plans: Vec<_> = scene
                .segments
                .iter()
                .map(|segment| self.painter.plan_band(segment))
                .collect();
            let content = match self.settings.overlay.typing_events {
                TypingEvents::Karaoke => self.ass.karaoke_for_scene(scene, &plans),
                TypingEvents::PerChar => self.ass.per_char_for_scene(scene, &plans),
            };
            let ass_path = self.ass.write(&paths.ass_dir, &scene.id, &content)?;
            Some(SubtitleStage {
                ass_path,
                fonts_dir: self.painter.body_font().fonts_dir().map(PathBuf::from),
                force_style: Some(self.ass.force_style()),
            })
        } else {
            None
        };

        let audio_index = cmd.input_count();
        cmd = cmd
            .input(&scene.narration_audio_path)
            .filter_complex(content_graph(&base, &windows, subtitles.as_ref()))
            .map("[vout]")
            .map(format!("{audio_index}:a:0"))
            .args(encode_args(&self.settings))
            .shortest();
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lform_models::{Direction, SceneKind, TextSegment};

    fn scene(kind: SceneKind, image: Option<PathBuf>) -> ScenePlan {
        ScenePlan {
            id: "S002".to_string(),
            kind,
            base_image_path: image,
            narration_audio_path: PathBuf::from("narration/S002.wav"),
            duration_seconds: 6.0,
            segments: vec![TextSegment {
                index: 0,
                lines: vec!["hello".to_string()],
                start_offset: 0.0,
                duration: 6.0,
            }],
            motion_vector: Direction { dx: 1, dy: 0 },
            intro_relief_seconds: 0.0,
        }
    }

    fn renderer() -> Option<SceneRenderer> {
        SceneRenderer::new(RenderSettings::default()).ok()
    }

    #[tokio::test]
    async fn test_content_scene_without_image_is_asset_missing() {
        let Some(renderer) = renderer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path().join("run"), "run");
        paths.create_dirs().unwrap();
        let missing = scene(SceneKind::Content, Some(dir.path().join("absent.png")));
        let err = renderer
            .content_command(&paths, &missing, &paths.scene_output("S002"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::AssetMissing(_)));
    }

    #[test]
    fn test_opening_command_maps_title_and_narration() {
        let Some(renderer) = renderer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path().join("run"), "run");
        paths.create_dirs().unwrap();
        let opening = scene(SceneKind::Opening, None);
        let cmd = renderer
            .opening_command(&paths, &opening, &paths.scene_output("S001"))
            .unwrap();
        let args = cmd.build_args(false);
        let joined = args.join(" ");
        assert!(joined.contains("color=c=black:size=1280x720"));
        assert!(joined.contains("-map [vout] -map 2:a:0"));
        assert!(joined.contains("-shortest"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
    }
}
