//! Asset resolution.
//!
//! Narration synthesis and image generation happen upstream; this module
//! binds their outputs to the timeline. Expected layout under the assets
//! directory:
//!
//! ```text
//! narration/chunk_001.wav   one WAV per script section
//! narration/S001.wav        merged narration per scene
//! images/S002.png           base image per content scene
//! ```
//!
//! Chunk durations are read from the WAV frame counts; missing chunk audio
//! falls back to the word-count estimate. Missing scene narration or base
//! images are fatal before any rendering starts.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use lform_media::{probe::wav_duration_seconds, MediaError};
use lform_models::{SceneKind, ScenePlan};

use crate::error::{PipelineError, PipelineResult};
use crate::script::{ScriptDocument, ScriptSection};
use crate::timeline::SceneDraft;

/// Tolerated drift between planned scene duration and merged narration.
const NARRATION_DRIFT_WARN_SECS: f64 = 0.05;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Locates and validates narration and image assets for a run.
pub struct AssetResolver {
    assets_dir: PathBuf,
}

impl AssetResolver {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    pub fn narration_chunk_path(&self, section_index: usize) -> PathBuf {
        self.assets_dir
            .join("narration")
            .join(format!("chunk_{section_index:03}.wav"))
    }

    pub fn scene_narration_path(&self, scene_id: &str) -> PathBuf {
        self.assets_dir.join("narration").join(format!("{scene_id}.wav"))
    }

    /// First existing image candidate for a scene, extension-agnostic.
    pub fn scene_image_path(&self, scene_id: &str) -> Option<PathBuf> {
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.assets_dir.join("images").join(format!("{scene_id}.{ext}")))
            .find(|p| p.exists())
    }

    /// Measured duration per script section, estimated where audio is absent.
    pub fn chunk_durations<F>(&self, document: &ScriptDocument, estimate: F) -> Vec<f64>
    where
        F: Fn(&ScriptSection) -> f64,
    {
        document
            .sections
            .iter()
            .map(|section| {
                let path = self.narration_chunk_path(section.index);
                match wav_duration_seconds(&path) {
                    Ok(duration) => {
                        debug!(
                            "Chunk {} narration: {:.3}s ({})",
                            section.index,
                            duration,
                            path.display()
                        );
                        duration
                    }
                    Err(_) => {
                        let estimated = estimate(section);
                        warn!(
                            "No narration for chunk {} ({}); estimating {:.2}s",
                            section.index,
                            path.display(),
                            estimated
                        );
                        estimated
                    }
                }
            })
            .collect()
    }

    /// Attach asset paths to the drafted timeline, failing fast on anything
    /// missing so no partial render ever starts.
    pub fn attach(&self, drafts: Vec<SceneDraft>) -> PipelineResult<Vec<ScenePlan>> {
        let mut scenes = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let narration = self.scene_narration_path(&draft.id);
            if !narration.exists() {
                return Err(PipelineError::Media(MediaError::AssetMissing(narration)));
            }
            self.check_narration_drift(&narration, draft.duration_seconds);

            let base_image_path = match draft.kind {
                SceneKind::Opening => None,
                SceneKind::Content => Some(self.scene_image_path(&draft.id).ok_or_else(|| {
                    PipelineError::Media(MediaError::AssetMissing(
                        self.assets_dir.join("images").join(format!("{}.png", draft.id)),
                    ))
                })?),
            };

            scenes.push(ScenePlan {
                id: draft.id,
                kind: draft.kind,
                base_image_path,
                narration_audio_path: narration,
                duration_seconds: draft.duration_seconds,
                segments: draft.segments,
                motion_vector: draft.motion_vector,
                intro_relief_seconds: draft.intro_relief_seconds,
            });
        }
        Ok(scenes)
    }

    fn check_narration_drift(&self, narration: &Path, planned: f64) {
        if let Ok(actual) = wav_duration_seconds(narration) {
            let drift = (actual - planned).abs();
            if drift > NARRATION_DRIFT_WARN_SECS {
                warn!(
                    "Narration {} is {:.3}s but the plan says {:.3}s (drift {:.3}s)",
                    narration.display(),
                    actual,
                    planned,
                    drift
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;
    use crate::timeline::TimelineBuilder;
    use lform_models::SectionSettings;

    fn write_wav(path: &Path, seconds: f64) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..((seconds * 48_000.0) as usize) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn drafts(
        resolver: &AssetResolver,
        doc_text: &str,
    ) -> (crate::script::ScriptDocument, Vec<SceneDraft>) {
        let doc = parse_script(doc_text).unwrap();
        let builder = TimelineBuilder::new(SectionSettings::default(), 0.35, 0.0);
        let durations = resolver.chunk_durations(&doc, |s| builder.estimate_duration(s, 150));
        let scenes = builder.build(&doc, &durations).unwrap();
        (doc, scenes)
    }

    #[test]
    fn test_measured_chunk_durations_win_over_estimates() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path());
        write_wav(&resolver.narration_chunk_path(1), 2.5);

        let doc = parse_script("s\"T\"\nhello there world").unwrap();
        let durations = resolver.chunk_durations(&doc, |_| 99.0);
        assert!((durations[0] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_chunk_audio_falls_back_to_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path());
        let doc = parse_script("s\"T\"\nhello there world").unwrap();
        let durations = resolver.chunk_durations(&doc, |_| 7.0);
        assert_eq!(durations, vec![7.0]);
    }

    #[test]
    fn test_attach_requires_scene_narration() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path());
        write_wav(&resolver.narration_chunk_path(1), 2.0);
        let (_, scenes) = drafts(&resolver, "s\"T\"\nopening words");
        let err = resolver.attach(scenes).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Media(MediaError::AssetMissing(_))
        ));
    }

    #[test]
    fn test_attach_requires_content_image() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path());
        write_wav(&resolver.narration_chunk_path(1), 2.0);
        write_wav(&resolver.narration_chunk_path(2), 3.0);
        write_wav(&resolver.scene_narration_path("S001"), 2.0);
        write_wav(&resolver.scene_narration_path("S002"), 3.0);

        let (_, scenes) = drafts(&resolver, "s\"T\"\nopening\n\ncontent body");
        let err = resolver.attach(scenes).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Media(MediaError::AssetMissing(_))
        ));
    }

    #[test]
    fn test_attach_completes_with_full_assets() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path());
        write_wav(&resolver.narration_chunk_path(1), 2.0);
        write_wav(&resolver.narration_chunk_path(2), 3.0);
        write_wav(&resolver.scene_narration_path("S001"), 2.0);
        write_wav(&resolver.scene_narration_path("S002"), 3.0);
        let image = dir.path().join("images/S002.png");
        std::fs::create_dir_all(image.parent().unwrap()).unwrap();
        std::fs::write(&image, b"png").unwrap();

        let (_, scenes) = drafts(&resolver, "s\"T\"\nopening\n\ncontent body");
        let plans = resolver.attach(scenes).unwrap();
        assert_eq!(plans.len(), 2);
        assert!(plans[0].base_image_path.is_none());
        assert_eq!(plans[1].base_image_path.as_deref(), Some(image.as_path()));
    }
}
