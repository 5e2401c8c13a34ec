//! Stream-copy concatenation of identically-encoded scene MP4s.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate scene MP4s without re-encoding.
///
/// Inputs are validated for existence and non-emptiness. A single input is
/// stream-copied directly; multiple inputs go through the concat demuxer
/// with an `ffconcat version 1.0` list. PTS rebasing is the demuxer's job.
pub async fn concat_streamcopy(
    inputs: &[PathBuf],
    output: &Path,
    runner: &FfmpegRunner,
    total_duration: f64,
) -> MediaResult<PathBuf> {
    if inputs.is_empty() {
        return Err(MediaError::ConcatInputInvalid(
            "no input segments provided".to_string(),
        ));
    }

    let missing: Vec<&PathBuf> = inputs.iter().filter(|p| !p.exists()).collect();
    let empty: Vec<&PathBuf> = inputs
        .iter()
        .filter(|p| p.exists() && p.metadata().map(|m| m.len() == 0).unwrap_or(true))
        .collect();
    if !missing.is_empty() || !empty.is_empty() {
        error!(
            "concat: invalid inputs | missing={} zero={}",
            missing.len(),
            empty.len()
        );
        for p in missing.iter().take(10) {
            error!("missing: {}", p.display());
        }
        for p in empty.iter().take(10) {
            error!("zero-size: {}", p.display());
        }
        return Err(MediaError::ConcatInputInvalid(format!(
            "{} missing, {} empty segments",
            missing.len(),
            empty.len()
        )));
    }

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if inputs.len() == 1 {
        info!("concat: single segment, stream-copying to output");
        let cmd = FfmpegCommand::new(output)
            .input(&inputs[0])
            .args(["-c", "copy", "-movflags", "+faststart"]);
        runner.run(&cmd, total_duration).await?;
        return Ok(output.to_path_buf());
    }

    let list_file = output.with_extension("concat.txt");
    let mut payload = String::from("ffconcat version 1.0\n");
    for path in inputs {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
        payload.push_str(&format!("file '{}'\n", resolved.display()));
    }
    tokio::fs::write(&list_file, &payload).await?;
    debug!(
        "concat: list file => {} ({} segments)",
        list_file.display(),
        inputs.len()
    );

    let cmd = FfmpegCommand::new(output)
        .input_with_args(
            ["-safe", "0", "-f", "concat"],
            list_file.to_string_lossy(),
        )
        .args(["-c", "copy", "-movflags", "+faststart"]);

    if let Err(e) = runner.run(&cmd, total_duration).await {
        let lines: Vec<&str> = payload.lines().collect();
        let head = lines[..lines.len().min(5)].join(" | ");
        let tail = lines[lines.len().saturating_sub(5)..].join(" | ");
        error!("concat list head: {head}");
        error!("concat list tail: {tail}");
        return Err(e);
    }
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_input_list_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = concat_streamcopy(&[], &dir.path().join("out.mp4"), &FfmpegRunner::new(), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ConcatInputInvalid(_)));
    }

    #[tokio::test]
    async fn test_missing_segment_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().join("absent.mp4")];
        let err = concat_streamcopy(
            &inputs,
            &dir.path().join("out.mp4"),
            &FfmpegRunner::new(),
            1.0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::ConcatInputInvalid(_)));
    }

    #[tokio::test]
    async fn test_zero_byte_segment_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let seg = dir.path().join("empty.mp4");
        tokio::fs::write(&seg, b"").await.unwrap();
        let err = concat_streamcopy(
            &[seg],
            &dir.path().join("out.mp4"),
            &FfmpegRunner::new(),
            1.0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::ConcatInputInvalid(_)));
    }

    #[test]
    fn test_concat_list_format() {
        // The ffconcat header plus one quoted path per line is what the
        // demuxer expects with -safe 0.
        let payload = format!("ffconcat version 1.0\nfile '{}'\n", "/runs/a/scenes/S001.mp4");
        assert!(payload.starts_with("ffconcat version 1.0\n"));
        assert!(payload.contains("file '/runs/a/scenes/S001.mp4'"));
    }
}
