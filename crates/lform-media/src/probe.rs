//! Media probing: image dimensions and narration durations.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format (the subset the renderer needs).
#[derive(Debug, serde::Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

async fn ffprobe_json(path: &Path) -> MediaResult<FfprobeOutput> {
    if !path.exists() {
        return Err(MediaError::AssetMissing(path.to_path_buf()));
    }
    which::which("ffprobe").map_err(|_| MediaError::ProbeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::ProbeFailed(format!("{}: {e}", path.display())))
}

/// Container duration in seconds.
pub async fn probe_duration_seconds(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    let probe = ffprobe_json(path).await?;
    probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| MediaError::ProbeFailed(format!("no duration for {}", path.display())))
}

/// Pixel dimensions of the first video stream (stills included).
pub async fn probe_dimensions(path: impl AsRef<Path>) -> MediaResult<(u32, u32)> {
    let path = path.as_ref();
    let probe = ffprobe_json(path).await?;
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| Some((s.width?, s.height?)))
        .ok_or_else(|| {
            MediaError::ProbeFailed(format!("no video stream in {}", path.display()))
        })
}

/// Exact WAV duration derived from the sample frame count.
///
/// Narration chunks are WAV; reading the header is both cheaper and more
/// precise than a container-level probe.
pub fn wav_duration_seconds(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::AssetMissing(path.to_path_buf()));
    }
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_duration_from_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 48_000, 24_000);
        let d = wav_duration_seconds(&path).unwrap();
        assert!((d - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_wav_reports_asset_missing() {
        let err = wav_duration_seconds("no/such/file.wav").unwrap_err();
        assert!(matches!(err, MediaError::AssetMissing(_)));
    }

    #[test]
    fn test_garbage_wav_is_an_audio_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"definitely not a wav").unwrap();
        let err = wav_duration_seconds(&path).unwrap_err();
        assert!(matches!(err, MediaError::Audio(_)));
    }
}
