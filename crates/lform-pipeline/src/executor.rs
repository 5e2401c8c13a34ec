//! Parallel scene rendering.
//!
//! Scenes are independent once their inputs exist, so the render stage fans
//! out up to the configured worker count. Workers publish `(index, path)`
//! and the concat stage consumes them in timeline order no matter which
//! finished first. A failure or an external cancel signal stops every live
//! FFmpeg child and deletes partial scene files.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use lform_media::{FfmpegRunner, MediaError, ProgressAccumulator, RenderBar};
use lform_models::ScenePlan;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::RunPaths;
use crate::scene_renderer::{SceneProgress, SceneRenderer};

/// Runs the scene stage with bounded parallelism.
pub struct RenderExecutor {
    workers: usize,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl RenderExecutor {
    /// `workers == 0` means one worker per available CPU core.
    pub fn new(workers: usize, cancel_tx: Arc<watch::Sender<bool>>) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        Self { workers, cancel_tx }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Render every scene, returning outputs in timeline order.
    pub async fn render_all(
        &self,
        renderer: &SceneRenderer,
        paths: &RunPaths,
        scenes: &[ScenePlan],
    ) -> PipelineResult<Vec<PathBuf>> {
        info!(
            "Rendering {} scenes with {} workers",
            scenes.len(),
            self.workers
        );

        let durations: Vec<f64> = scenes.iter().map(|s| s.duration_seconds).collect();
        let single = scenes.len() == 1;
        let accumulator = if single {
            None
        } else {
            Some(ProgressAccumulator::new(durations, "Scenes"))
        };

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let futures = scenes.iter().enumerate().map(|(index, scene)| {
            let semaphore = Arc::clone(&semaphore);
            let accumulator = accumulator.clone();
            let cancel_tx = Arc::clone(&self.cancel_tx);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| MediaError::Cancelled)?;
                if *cancel_tx.borrow() {
                    return Err(MediaError::Cancelled);
                }

                let progress = match &accumulator {
                    Some(acc) => SceneProgress::Shared {
                        accumulator: Arc::clone(acc),
                        index,
                    },
                    None => {
                        SceneProgress::Interactive(Arc::new(RenderBar::new(
                            scene.duration_seconds,
                            scene.id.clone(),
                        )))
                    }
                };

                let runner = FfmpegRunner::new().with_cancel(cancel_tx.subscribe());
                let result = renderer.render_scene(paths, scene, &runner, progress).await;
                if let Err(e) = &result {
                    if !matches!(e, MediaError::Cancelled) {
                        // Pull the plug on the remaining workers.
                        let _ = cancel_tx.send(true);
                    }
                }
                result
            }
        });

        let results = join_all(futures).await;
        if let Some(acc) = &accumulator {
            if results.iter().all(|r| r.is_ok()) {
                acc.finish();
            }
        }

        let mut outputs = Vec::with_capacity(scenes.len());
        let mut first_error: Option<PipelineError> = None;
        for (scene, result) in scenes.iter().zip(results) {
            match result {
                Ok(path) => outputs.push(path),
                Err(source) => {
                    let output = paths.scene_output(&scene.id);
                    if output.exists() {
                        if let Err(e) = std::fs::remove_file(&output) {
                            warn!("Could not delete partial scene {}: {e}", output.display());
                        }
                    }
                    let error = match source {
                        MediaError::Cancelled => PipelineError::Media(MediaError::Cancelled),
                        source => PipelineError::SceneRenderFailed {
                            scene_id: scene.id.clone(),
                            source,
                        },
                    };
                    // Real failures beat cancellations in the report; the
                    // cancels are just fallout.
                    match (&first_error, &error) {
                        (None, _) => first_error = Some(error),
                        (Some(PipelineError::Media(MediaError::Cancelled)), _) => {
                            first_error = Some(error)
                        }
                        _ => {}
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(outputs),
        }
    }
}
