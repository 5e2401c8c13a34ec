//! End-to-end orchestration: timeline, scenes, concat, mix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use lform_media::{
    check_ffmpeg, concat_streamcopy, probe_duration_seconds, BgmMixer, FfmpegRunner, RenderBar,
};
use lform_models::{RenderSettings, ScenePlan};

use crate::assets::AssetResolver;
use crate::error::PipelineResult;
use crate::executor::RenderExecutor;
use crate::scene_renderer::SceneRenderer;
use crate::script::ScriptDocument;
use crate::timeline::TimelineBuilder;

/// Artefact layout of one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub overlays_dir: PathBuf,
    pub ass_dir: PathBuf,
    pub scenes_dir: PathBuf,
    pub concat_path: PathBuf,
    pub final_path: PathBuf,
    pub timeline_path: PathBuf,
}

impl RunPaths {
    pub fn new(run_dir: impl Into<PathBuf>, run_id: &str) -> Self {
        let run_dir = run_dir.into();
        Self {
            overlays_dir: run_dir.join("overlays"),
            ass_dir: run_dir.join("ass"),
            scenes_dir: run_dir.join("scenes"),
            concat_path: run_dir.join("temp_concat.mp4"),
            final_path: run_dir.join(format!("{run_id}.mp4")),
            timeline_path: run_dir.join("timeline.json"),
            run_dir,
        }
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.run_dir)?;
        std::fs::create_dir_all(&self.overlays_dir)?;
        std::fs::create_dir_all(&self.ass_dir)?;
        std::fs::create_dir_all(&self.scenes_dir)?;
        Ok(())
    }

    pub fn scene_output(&self, scene_id: &str) -> PathBuf {
        self.scenes_dir.join(format!("{scene_id}.mp4"))
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub video_path: PathBuf,
    pub total_duration: f64,
    pub scene_count: usize,
}

#[derive(Serialize)]
struct TimelineRecord<'a> {
    run_id: &'a str,
    total_duration: f64,
    scenes: &'a [ScenePlan],
}

/// The full render pipeline.
///
/// Stages run sequentially; only the scene stage fans out. On any fatal
/// error the run directory is left in place for inspection and the final
/// MP4 is absent.
pub struct RenderPipeline {
    settings: RenderSettings,
    resolver: AssetResolver,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl RenderPipeline {
    pub fn new(settings: RenderSettings, resolver: AssetResolver) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            settings,
            resolver,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Handle for external cancellation (signal handlers).
    pub fn cancel_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.cancel_tx)
    }

    /// Render `document` into `<output_dir>/<run_id>/<run_id>.mp4`.
    pub async fn run(
        &self,
        document: &ScriptDocument,
        output_dir: &Path,
        run_id: &str,
    ) -> PipelineResult<PipelineOutput> {
        check_ffmpeg()?;

        let paths = RunPaths::new(output_dir.join(run_id), run_id);
        paths.create_dirs()?;
        info!("Run directory: {}", paths.run_dir.display());

        // Timeline from script plus measured narration.
        let profile = self.settings.animation.profile();
        let builder = TimelineBuilder::new(
            self.settings.sections.clone(),
            profile.padding_seconds,
            profile.intro_seconds,
        );
        let words_per_minute = self.settings.sections.words_per_minute;
        let durations = self
            .resolver
            .chunk_durations(document, |s| builder.estimate_duration(s, words_per_minute));
        let drafts = builder.build(document, &durations)?;
        let scenes = self.resolver.attach(drafts)?;

        let total_duration: f64 = scenes.iter().map(|s| s.duration_seconds).sum();
        self.write_timeline(&paths, run_id, total_duration, &scenes)?;

        // Scene stage: parallel, cancellable.
        let renderer = SceneRenderer::new(self.settings.clone())?;
        let executor = RenderExecutor::new(self.settings.workers, Arc::clone(&self.cancel_tx));
        let scene_paths = executor.render_all(&renderer, &paths, &scenes).await?;

        // Concat and mix are strictly serial.
        let runner = FfmpegRunner::new().with_cancel(self.cancel_tx.subscribe());
        concat_streamcopy(&scene_paths, &paths.concat_path, &runner, total_duration).await?;
        self.verify_concat_duration(&paths, total_duration).await;

        let mixer = BgmMixer::new(self.settings.bgm.clone(), self.settings.audio.clone());
        let bar = Arc::new(RenderBar::new(total_duration, "Render"));
        mixer
            .mix(
                &paths.concat_path,
                &paths.final_path,
                total_duration,
                &runner,
                Some(Arc::clone(&bar)),
            )
            .await?;
        bar.finish();

        if self.settings.cleanup_intermediates {
            self.cleanup(&paths);
        }

        info!(
            "Rendered {} ({:.2}s, {} scenes)",
            paths.final_path.display(),
            total_duration,
            scenes.len()
        );
        Ok(PipelineOutput {
            run_id: run_id.to_string(),
            run_dir: paths.run_dir.clone(),
            video_path: paths.final_path.clone(),
            total_duration,
            scene_count: scenes.len(),
        })
    }

    /// Stream-copy must preserve total duration to within one frame.
    async fn verify_concat_duration(&self, paths: &RunPaths, expected: f64) {
        let frame = 1.0 / f64::from(self.settings.video.fps.max(1));
        match probe_duration_seconds(&paths.concat_path).await {
            Ok(measured) if (measured - expected).abs() > frame => {
                warn!(
                    "Concat duration {:.3}s deviates from planned {:.3}s by more than a frame",
                    measured, expected
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Could not verify concat duration: {e}"),
        }
    }

    fn write_timeline(
        &self,
        paths: &RunPaths,
        run_id: &str,
        total_duration: f64,
        scenes: &[ScenePlan],
    ) -> PipelineResult<()> {
        let record = TimelineRecord {
            run_id,
            total_duration,
            scenes,
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&paths.timeline_path, json)?;
        Ok(())
    }

    fn cleanup(&self, paths: &RunPaths) {
        for dir in [&paths.overlays_dir, &paths.ass_dir, &paths.scenes_dir] {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                warn!("Could not remove {}: {e}", dir.display());
            }
        }
        for file in [
            &paths.concat_path,
            &paths.concat_path.with_extension("concat.txt"),
        ] {
            if file.exists() {
                if let Err(e) = std::fs::remove_file(file) {
                    warn!("Could not remove {}: {e}", file.display());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_paths_layout() {
        let paths = RunPaths::new("/out/longform_1", "longform_1");
        assert_eq!(paths.scenes_dir, PathBuf::from("/out/longform_1/scenes"));
        assert_eq!(
            paths.concat_path,
            PathBuf::from("/out/longform_1/temp_concat.mp4")
        );
        assert_eq!(
            paths.final_path,
            PathBuf::from("/out/longform_1/longform_1.mp4")
        );
        assert_eq!(paths.scene_output("S003"), paths.scenes_dir.join("S003.mp4"));
    }
}
