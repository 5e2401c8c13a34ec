//! FFmpeg command builder and runner.
//!
//! Every FFmpeg invocation in the pipeline goes through [`FfmpegRunner`];
//! no other module is allowed to spawn the tool. The runner owns the three
//! cross-cutting concerns of subprocess handling: error-stream capture,
//! cancellation, and wall-clock deadlines.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info};

use lform_models::RenderSettings;

use crate::error::{MediaError, MediaResult};

/// How many trailing stderr lines are preserved for diagnostics.
const STDERR_TAIL_LINES: usize = 50;

/// Default wall-clock deadline as a multiple of the expected output duration.
const DEFAULT_DEADLINE_MULTIPLIER: f64 = 10.0;

/// Deadline floor so very short scenes survive process startup cost.
const MIN_DEADLINE_SECS: u64 = 60;

/// One `-i` input with its preceding flags.
#[derive(Debug, Clone)]
pub struct FfmpegInput {
    args: Vec<String>,
    source: String,
}

/// Builder for a single FFmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output_args: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Add a plain file input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(Vec::<String>::new(), path.as_ref().to_string_lossy())
    }

    /// Add an input preceded by flags such as `-loop 1 -t 5`.
    pub fn input_with_args<I, S>(mut self, args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            source: source.into(),
        });
        self
    }

    /// Add a `lavfi` source such as a solid colour canvas.
    pub fn lavfi<I, S>(self, pre_args: I, spec: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = pre_args.into_iter().map(Into::into).collect();
        args.push("-f".to_string());
        args.push("lavfi".to_string());
        self.input_with_args(args, spec)
    }

    /// Add a still image looped for `duration` seconds at `fps`.
    pub fn looped_image(self, path: impl AsRef<Path>, fps: u32, duration: f64) -> Self {
        self.input_with_args(
            [
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                fps.to_string(),
                "-t".to_string(),
                format!("{duration:.3}"),
            ],
            path.as_ref().to_string_lossy(),
        )
    }

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.arg("-map").arg(stream)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Cut the output at the shortest input stream.
    pub fn shortest(self) -> Self {
        self.arg("-shortest")
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Number of inputs added so far; callers use this to compute map indices.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Build the argv, without the leading program name.
    pub fn build_args(&self, with_progress: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostats".into(),
        ];
        if with_progress {
            args.push("-progress".into());
            args.push("pipe:1".into());
        }
        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".into());
            args.push(input.source.clone());
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// One-line rendering of the command for logs and error payloads.
    pub fn describe(&self) -> String {
        let args = self.build_args(false);
        let mut out = String::from("ffmpeg");
        for a in args {
            out.push(' ');
            if a.contains(' ') {
                out.push('\'');
                out.push_str(&a);
                out.push('\'');
            } else {
                out.push_str(&a);
            }
        }
        out
    }
}

/// Runner with cancellation and deadline handling.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    deadline_multiplier: f64,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            deadline_multiplier: DEFAULT_DEADLINE_MULTIPLIER,
        }
    }

    /// Propagate a cancellation signal into every invocation.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Override the deadline multiplier (deadline = expected × multiplier).
    pub fn with_deadline_multiplier(mut self, multiplier: f64) -> Self {
        self.deadline_multiplier = multiplier;
        self
    }

    fn deadline_for(&self, expected_duration: f64) -> Duration {
        let secs = (expected_duration.max(0.0) * self.deadline_multiplier).ceil() as u64;
        Duration::from_secs(secs.max(MIN_DEADLINE_SECS))
    }

    /// Run silently. On non-zero exit the tail of the error stream is logged
    /// and returned inside the error.
    pub async fn run(&self, cmd: &FfmpegCommand, expected_duration: f64) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound)?;

        let args = cmd.build_args(false);
        debug!("FFmpeg: {}", cmd.describe());

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let tail_task = tokio::spawn(collect_tail(stderr));

        let outcome = self
            .wait_for_completion(&mut child, cmd, self.deadline_for(expected_duration))
            .await;
        let tail = tail_task.await.unwrap_or_default();

        finish(outcome, cmd, tail)
    }

    /// Run with `-progress pipe:1`, invoking `on_time` with the parsed output
    /// position in seconds on every progress flush.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        expected_duration: f64,
        on_time: F,
    ) -> MediaResult<()>
    where
        F: Fn(f64) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound)?;

        let args = cmd.build_args(true);
        debug!("FFmpeg(progress): {}", cmd.describe());

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout not captured");
        let stderr = child.stderr.take().expect("stderr not captured");
        let tail_task = tokio::spawn(collect_tail(stderr));

        let progress_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(seconds) = parse_progress_line(&line) {
                    on_time(seconds);
                }
            }
        });

        let outcome = self
            .wait_for_completion(&mut child, cmd, self.deadline_for(expected_duration))
            .await;
        let _ = progress_task.await;
        let tail = tail_task.await.unwrap_or_default();

        finish(outcome, cmd, tail)
    }

    async fn wait_for_completion(
        &self,
        child: &mut Child,
        cmd: &FfmpegCommand,
        deadline: Duration,
    ) -> MediaResult<Option<i32>> {
        enum Outcome {
            Finished(std::io::Result<std::process::ExitStatus>),
            Cancelled,
            TimedOut,
        }

        let mut cancel_rx = self.cancel_rx.clone();
        // The wait future borrows the child; kill only after select dropped it.
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Finished(status),
            _ = cancelled(&mut cancel_rx) => Outcome::Cancelled,
            _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
        };

        match outcome {
            Outcome::Finished(status) => {
                let status = status?;
                if status.success() {
                    Ok(None)
                } else {
                    Ok(Some(status.code().unwrap_or(-1)))
                }
            }
            Outcome::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            Outcome::TimedOut => {
                error!(
                    "FFmpeg exceeded {}s deadline, killing process",
                    deadline.as_secs()
                );
                let _ = child.kill().await;
                Err(MediaError::ToolTimeout {
                    command: cmd.describe(),
                    deadline_secs: deadline.as_secs(),
                })
            }
        }
    }
}

/// Resolves when the cancellation flag flips to true; pends forever when no
/// receiver is attached.
async fn cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(stream: R) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

fn finish(
    outcome: MediaResult<Option<i32>>,
    cmd: &FfmpegCommand,
    tail: Vec<String>,
) -> MediaResult<()> {
    match outcome {
        Ok(None) => Ok(()),
        Ok(code) => {
            for line in &tail {
                error!("ffmpeg: {line}");
            }
            Err(MediaError::tool_failure(cmd.describe(), code, tail))
        }
        Err(e) => Err(e),
    }
}

/// Parse one `-progress` line; returns the output position in seconds when
/// the line carries one. `out_time_ms` is microseconds despite the name.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            let us: i64 = value.parse().ok()?;
            Some(us as f64 / 1_000_000.0)
        }
        _ => None,
    }
}

/// Encoder arguments for the fixed delivery profile.
///
/// BT.709 tags and faststart are always applied; quality knobs come from the
/// settings.
pub fn encode_args(settings: &RenderSettings) -> Vec<String> {
    let video = &settings.video;
    let audio = &settings.audio;
    let mut args: Vec<String> = vec![
        "-r".into(),
        video.fps.to_string(),
        "-c:v".into(),
        video.codec.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-profile:v".into(),
        "high".into(),
        "-level:v".into(),
        "4.1".into(),
        "-color_primaries".into(),
        "bt709".into(),
        "-color_trc".into(),
        "bt709".into(),
        "-colorspace".into(),
        "bt709".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-c:a".into(),
        audio.codec.clone(),
        "-ar".into(),
        audio.sample_rate.to_string(),
        "-ac".into(),
        "2".into(),
    ];
    if let Some(crf) = video.crf {
        args.push("-crf".into());
        args.push(crf.to_string());
    }
    if let Some(bitrate) = &video.bitrate {
        args.push("-b:v".into());
        args.push(bitrate.clone());
    }
    if !video.preset.is_empty() {
        args.push("-preset".into());
        args.push(video.preset.clone());
    }
    if let Some(bitrate) = &audio.bitrate {
        args.push("-b:a".into());
        args.push(bitrate.clone());
    }
    args
}

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound)
}

/// Check that FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::ProbeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_orders_inputs_before_output_args() {
        let cmd = FfmpegCommand::new("out.mp4")
            .looped_image("a.png", 30, 5.0)
            .input("voice.wav")
            .filter_complex("[0:v][1:v]overlay[vout]")
            .map("[vout]")
            .shortest();

        let args = cmd.build_args(false);
        let i_first = args.iter().position(|a| a == "-i").unwrap();
        let fc = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert!(i_first < fc);
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args.contains(&"-loop".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_progress_flag_only_in_progress_mode() {
        let cmd = FfmpegCommand::new("out.mp4").input("in.mp4");
        assert!(!cmd.build_args(false).contains(&"-progress".to_string()));
        let args = cmd.build_args(true);
        let idx = args.iter().position(|a| a == "-progress").unwrap();
        assert_eq!(args[idx + 1], "pipe:1");
    }

    #[test]
    fn test_progress_line_parses_microseconds() {
        assert_eq!(parse_progress_line("out_time_ms=5000000"), Some(5.0));
        assert_eq!(parse_progress_line("out_time_us=1500000"), Some(1.5));
        assert_eq!(parse_progress_line("frame=42"), None);
        assert_eq!(parse_progress_line("out_time_ms=N/A"), None);
        assert_eq!(parse_progress_line("progress=end"), None);
    }

    #[test]
    fn test_encode_args_carry_delivery_profile() {
        let settings = RenderSettings::default();
        let args = encode_args(&settings);
        for expected in [
            "-pix_fmt",
            "yuv420p",
            "-profile:v",
            "high",
            "-level:v",
            "4.1",
            "-color_primaries",
            "bt709",
            "-colorspace",
            "bt709",
            "-movflags",
            "+faststart",
            "-ar",
            "48000",
            "-ac",
        ] {
            assert!(
                args.contains(&expected.to_string()),
                "missing {expected} in {args:?}"
            );
        }
        assert!(args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_describe_quotes_spaced_args() {
        let cmd = FfmpegCommand::new("out.mp4")
            .lavfi(["-t", "5"], "color=c=black:size=1280x720");
        let line = cmd.describe();
        assert!(line.starts_with("ffmpeg -y -hide_banner"));
        assert!(line.contains("color=c=black:size=1280x720"));
    }

    #[test]
    fn test_deadline_has_floor_and_multiplier() {
        let runner = FfmpegRunner::new();
        assert_eq!(runner.deadline_for(2.0).as_secs(), 60);
        assert_eq!(runner.deadline_for(30.0).as_secs(), 300);
    }
}
