//! Background-music mixing with two-stage loudness normalisation.
//!
//! Stage one pulls the looped, trimmed BGM stem down to a low bed level
//! (-30 LUFS) before gain and fades; after mixing with narration the whole
//! programme is normalised to the -14 LUFS delivery target. The video
//! stream is never re-encoded here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use lform_models::{AudioSettings, BgmSettings};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::progress::RenderBar;

/// BGM stem loudness target before mixing.
const BGM_STAGE_LOUDNORM: &str = "loudnorm=I=-30:LRA=7:TP=-2";
/// Programme loudness target after mixing.
const PROGRAMME_LOUDNORM: &str = "loudnorm=I=-14:LRA=7:TP=-1.5";

/// Mixes an optional BGM bed under the concatenated narration programme.
#[derive(Debug, Clone)]
pub struct BgmMixer {
    bgm: BgmSettings,
    audio: AudioSettings,
}

impl BgmMixer {
    pub fn new(bgm: BgmSettings, audio: AudioSettings) -> Self {
        Self { bgm, audio }
    }

    /// Mix `bgm` under the programme, or stream-copy when no BGM is set.
    ///
    /// The result is written next to `output` and atomically renamed into
    /// place; on failure `output` is absent.
    pub async fn mix(
        &self,
        input_video: &Path,
        output: &Path,
        total_duration: f64,
        runner: &FfmpegRunner,
        bar: Option<Arc<RenderBar>>,
    ) -> MediaResult<PathBuf> {
        let total_duration = total_duration.max(0.1);
        let staging = output.with_extension("mix.tmp.mp4");

        let bgm_path = match &self.bgm.path {
            None => {
                self.passthrough(input_video, &staging, total_duration, runner, bar)
                    .await?;
                move_file(&staging, output).await?;
                return Ok(output.to_path_buf());
            }
            Some(path) if !path.exists() => {
                return Err(MediaError::AssetMissing(path.clone()));
            }
            Some(path) => path.clone(),
        };

        let graph = self.mix_graph(total_duration);
        info!(
            "BGM mix: file={}, total={:.2}s, gain={:.2}",
            bgm_path.display(),
            total_duration,
            self.bgm.bgm_boost
        );

        let mut cmd = FfmpegCommand::new(&staging)
            .input(input_video)
            .input_with_args(["-stream_loop", "-1"], bgm_path.to_string_lossy())
            .filter_complex(graph)
            .map("0:v")
            .map("[aout]")
            .args([
                "-c:v".to_string(),
                "copy".to_string(),
                "-c:a".to_string(),
                self.audio.codec.clone(),
                "-ar".to_string(),
                self.audio.sample_rate.to_string(),
                "-ac".to_string(),
                "2".to_string(),
            ]);
        if let Some(bitrate) = &self.audio.bitrate {
            cmd = cmd.args(["-b:a".to_string(), bitrate.clone()]);
        }
        cmd = cmd.args(["-movflags", "+faststart"]).shortest();

        let result = match bar {
            Some(bar) => {
                bar.set_label("Render");
                runner
                    .run_with_progress(&cmd, total_duration, move |t| bar.update(t))
                    .await
            }
            None => runner.run(&cmd, total_duration).await,
        };
        result.map_err(|e| match e {
            e @ (MediaError::Cancelled | MediaError::ToolTimeout { .. }) => e,
            other => MediaError::MixerFailure(other.to_string()),
        })?;

        move_file(&staging, output).await?;
        Ok(output.to_path_buf())
    }

    /// The full `-filter_complex` for the mix.
    pub fn mix_graph(&self, total_duration: f64) -> String {
        let sr = self.audio.sample_rate;
        let fade_out_start = (total_duration - self.bgm.fade_out).max(0.0);
        let aformat = format!(
            "aformat=sample_fmts=fltp:sample_rates={sr}:channel_layouts=stereo"
        );
        let narration = if (self.bgm.narration_boost - 1.0).abs() > f64::EPSILON {
            format!(
                "[0:a]volume={boost:.3},{aformat}[narr]",
                boost = self.bgm.narration_boost
            )
        } else {
            format!("[0:a]{aformat}[narr]")
        };
        format!(
            "[1:a]atrim=0:duration={dur:.3},asetpts=PTS-STARTPTS,\
             {BGM_STAGE_LOUDNORM},\
             volume={gain:.3},\
             afade=t=in:st=0:d={fade_in:.3},afade=t=out:st={fade_out_start:.3}:d={fade_out:.3},\
             {aformat}[bgm];\
             {narration};\
             [narr][bgm]amix=inputs=2:duration=first:dropout_transition=2[a];\
             [a]{PROGRAMME_LOUDNORM},{aformat}[aout]",
            dur = total_duration,
            gain = self.bgm.bgm_boost,
            fade_in = self.bgm.fade_in,
            fade_out = self.bgm.fade_out,
        )
    }

    async fn passthrough(
        &self,
        input_video: &Path,
        staging: &Path,
        total_duration: f64,
        runner: &FfmpegRunner,
        bar: Option<Arc<RenderBar>>,
    ) -> MediaResult<()> {
        info!("No BGM configured; stream-copying programme");
        let cmd = FfmpegCommand::new(staging)
            .input(input_video)
            .args(["-c", "copy", "-movflags", "+faststart"]);
        match bar {
            Some(bar) => {
                bar.set_label("Render");
                runner
                    .run_with_progress(&cmd, total_duration, move |t| bar.update(t))
                    .await
            }
            None => runner.run(&cmd, total_duration).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer(bgm: BgmSettings) -> BgmMixer {
        BgmMixer::new(bgm, AudioSettings::default())
    }

    #[test]
    fn test_mix_graph_two_stage_loudnorm() {
        let graph = mixer(BgmSettings::default()).mix_graph(9.0);
        assert!(graph.contains("loudnorm=I=-30:LRA=7:TP=-2"));
        assert!(graph.contains("loudnorm=I=-14:LRA=7:TP=-1.5"));
        let first = graph.find("I=-30").unwrap();
        let second = graph.find("I=-14").unwrap();
        assert!(first < second, "BGM stage normalises before the programme");
    }

    #[test]
    fn test_mix_graph_trims_and_fades() {
        let graph = mixer(BgmSettings::default()).mix_graph(9.0);
        assert!(graph.contains("atrim=0:duration=9.000"));
        assert!(graph.contains("afade=t=in:st=0:d=0.500"));
        assert!(graph.contains("afade=t=out:st=8.000:d=1.000"));
        assert!(graph.contains("volume=0.240"));
        assert!(graph.contains("amix=inputs=2:duration=first:dropout_transition=2"));
    }

    #[test]
    fn test_mix_graph_conforms_both_stems() {
        let graph = mixer(BgmSettings::default()).mix_graph(5.0);
        assert_eq!(
            graph
                .matches("aformat=sample_fmts=fltp:sample_rates=48000:channel_layouts=stereo")
                .count(),
            3
        );
    }

    #[test]
    fn test_narration_boost_inserts_volume() {
        let graph = mixer(BgmSettings {
            narration_boost: 1.2,
            ..Default::default()
        })
        .mix_graph(5.0);
        assert!(graph.contains("[0:a]volume=1.200,"));
    }

    #[test]
    fn test_unit_narration_boost_has_no_volume_stage() {
        let graph = mixer(BgmSettings::default()).mix_graph(5.0);
        assert!(!graph.contains("[0:a]volume="));
    }

    #[tokio::test]
    async fn test_configured_but_missing_bgm_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = mixer(BgmSettings {
            path: Some(dir.path().join("nope.mp3")),
            ..Default::default()
        });
        let err = mixer
            .mix(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                9.0,
                &FfmpegRunner::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::AssetMissing(_)));
    }
}
