//! Camera capture through FFmpeg's device inputs
//!
//! The platform device API (v4l2/ALSA, AVFoundation, DirectShow) is driven by
//! an `ffmpeg` child process that encodes to WebM on stdout. Stdout is read in
//! fixed-size pieces and pushed into the session's recording sink.
//!
//! Opening a source grabs a single frame from the device first, so permission
//! and hardware problems surface as typed [`DeviceError`]s before recording.

use super::traits::{
    CaptureBackend, CaptureSource, MediaConstraints, RecorderSignal, RecordingSink, SinkFeed,
};
use crate::config::CaptureConfig;
use crate::utils::error::DeviceError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Grace period for ffmpeg to flush the container after `q`
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the chunk channel between the reader task and the session
const SIGNAL_CAPACITY: usize = 64;

/// How long the single-frame device check may take
const DEVICE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

const DENIED_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "not authorized",
    "access denied",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "no such file or directory",
    "no such device",
    "could not find",
    "does not exist",
    "not found",
];

/// Capture backend that records through an `ffmpeg` subprocess
pub struct FfmpegCapture {
    ffmpeg: String,
    config: CaptureConfig,
}

impl FfmpegCapture {
    pub fn new(ffmpeg: impl Into<String>, config: CaptureConfig) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            config,
        }
    }

    /// Check a v4l2 device node for existence and permissions
    fn check_device_node(path: &Path) -> Result<(), DeviceError> {
        match std::fs::OpenOptions::new().read(true).open(path) {
            Ok(_) => Ok(()),
            Err(e) => Err(map_open_error(&e)),
        }
    }

    /// Grab one frame from the video device and discard it
    async fn check_device(&self) -> Result<(), DeviceError> {
        let args = build_check_args(&self.config);
        tracing::debug!("Checking camera: {:?}", args);

        let mut command = Command::new(&self.ffmpeg);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(DEVICE_CHECK_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DeviceError::NotReadable(format!(
                    "failed to run {}: {}",
                    self.ffmpeg, e
                )))
            }
            Err(_) => {
                return Err(DeviceError::NotReadable(
                    "camera did not deliver a frame in time".to_string(),
                ))
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!("Camera check failed ({}): {}", output.status, stderr.trim());
        Err(classify_device_failure(&stderr))
    }
}

fn map_open_error(e: &std::io::Error) -> DeviceError {
    match e.kind() {
        ErrorKind::NotFound => DeviceError::NotFound,
        ErrorKind::PermissionDenied => DeviceError::Denied,
        _ => DeviceError::NotReadable(e.to_string()),
    }
}

/// Map ffmpeg's complaint about a device onto the error taxonomy
fn classify_device_failure(stderr: &str) -> DeviceError {
    let lower = stderr.to_lowercase();
    if DENIED_MARKERS.iter().any(|m| lower.contains(m)) {
        DeviceError::Denied
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        DeviceError::NotFound
    } else {
        let summary = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("recorder exited unexpectedly");
        DeviceError::NotReadable(summary.to_string())
    }
}

#[async_trait]
impl CaptureBackend for FfmpegCapture {
    fn is_supported(&self) -> bool {
        cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows"))
            && !self.config.input_format.is_empty()
    }

    async fn open(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        if !self.is_supported() {
            return Err(DeviceError::Unsupported);
        }
        if !constraints.video {
            return Err(DeviceError::NotFound);
        }

        if self.config.input_format == "v4l2" {
            Self::check_device_node(Path::new(&self.config.video_device))?;
        }
        self.check_device().await?;

        tracing::info!(
            "Opening camera {} via {} (audio: {})",
            self.config.video_device,
            self.config.input_format,
            constraints.audio
        );

        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            config: self.config.clone(),
            constraints,
            closed: false,
        }))
    }
}

/// An opened device description; the device itself is held by the recorder
/// process while recording.
struct FfmpegSource {
    ffmpeg: String,
    config: CaptureConfig,
    constraints: MediaConstraints,
    closed: bool,
}

/// Build the ffmpeg argument list for the single-frame device check
fn build_check_args(config: &CaptureConfig) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        config.input_format.as_str(),
        "-i",
        config.video_device.as_str(),
        "-frames:v",
        "1",
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Build the ffmpeg argument list for a live WebM recording
fn build_capture_args(config: &CaptureConfig, constraints: MediaConstraints) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        config.input_format.clone(),
        "-i".to_string(),
        config.video_device.clone(),
    ];

    let separate_audio = constraints.audio
        && !config.audio_format.is_empty()
        && !config.audio_device.is_empty();
    if separate_audio {
        args.extend([
            "-f".to_string(),
            config.audio_format.clone(),
            "-i".to_string(),
            config.audio_device.clone(),
        ]);
    }

    args.extend([
        "-c:v".to_string(),
        "libvpx".to_string(),
        "-deadline".to_string(),
        "realtime".to_string(),
        "-b:v".to_string(),
        "1M".to_string(),
    ]);

    if constraints.audio {
        args.extend(["-c:a".to_string(), "libopus".to_string()]);
    } else {
        args.push("-an".to_string());
    }

    args.extend(["-f".to_string(), "webm".to_string(), "pipe:1".to_string()]);
    args
}

#[async_trait]
impl CaptureSource for FfmpegSource {
    fn label(&self) -> String {
        format!("{} ({})", self.config.video_device, self.config.input_format)
    }

    async fn start_recording(&mut self) -> Result<RecordingSink, DeviceError> {
        if self.closed {
            return Err(DeviceError::NotReadable("capture source is closed".to_string()));
        }

        let args = build_capture_args(&self.config, self.constraints);
        tracing::info!("Starting FFmpeg recorder: {:?}", args);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| map_open_error(&e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::NotReadable("failed to capture ffmpeg stdout".to_string()))?;
        let stdin = child.stdin.take();

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut collected = String::new();
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(target: "ffmpeg", "{}", line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
                collected
            })
        });

        let (feed, sink) = RecordingSink::channel(SIGNAL_CAPACITY);
        let recorder = Recorder {
            child,
            stdin,
            stdout,
            stderr_task,
        };
        tokio::spawn(pump_chunks(recorder, feed, self.config.chunk_size));
        Ok(sink)
    }

    fn close(&mut self) {
        // The recorder process stops when its sink is dropped.
        self.closed = true;
    }
}

/// A running recorder process and its pipes
struct Recorder {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
}

/// Read stdout into chunks until the recorder exits, then emit `Stopped`, or
/// `Failed` when it died without being asked to stop.
async fn pump_chunks(recorder: Recorder, feed: SinkFeed, chunk_size: usize) {
    let Recorder {
        mut child,
        mut stdin,
        mut stdout,
        stderr_task,
    } = recorder;
    let SinkFeed { signals, mut stop } = feed;
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut stopping = false;
    let mut consumer_gone = false;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut stop, if !stopping => {
                stopping = true;
                deadline = Some(Instant::now() + STOP_GRACE);
                tracing::debug!("Recorder stop requested");
                // ffmpeg finalizes the container when it reads `q`.
                if let Some(mut input) = stdin.take() {
                    if let Err(e) = input.write_all(b"q").await {
                        tracing::warn!("Failed to signal ffmpeg recorder: {}", e);
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                tracing::warn!("FFmpeg recorder ignored stop request, killing it");
                let _ = child.start_kill();
                break;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    if signals.send(RecorderSignal::Chunk(chunk)).await.is_err() {
                        consumer_gone = true;
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read recorder output: {}", e);
                    break;
                }
            }
        }
    }

    let mut crashed = false;
    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) if !status.success() && !stopping => {
            tracing::warn!("FFmpeg recorder exited unexpectedly: {}", status);
            crashed = true;
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("Failed to wait for recorder: {}", e),
        Err(_) => {
            tracing::warn!("FFmpeg recorder did not exit in time, killing it");
            let _ = child.kill().await;
        }
    }

    if consumer_gone {
        return;
    }

    let signal = if crashed {
        let stderr = match stderr_task {
            Some(task) => tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default(),
            None => String::new(),
        };
        RecorderSignal::Failed(classify_device_failure(&stderr))
    } else {
        RecorderSignal::Stopped
    };
    let _ = signals.send(signal).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_config() -> CaptureConfig {
        CaptureConfig {
            input_format: "v4l2".to_string(),
            video_device: "/dev/video0".to_string(),
            audio_format: "alsa".to_string(),
            audio_device: "default".to_string(),
            chunk_size: 1024,
        }
    }

    #[test]
    fn test_capture_args_with_separate_audio() {
        let args = build_capture_args(&linux_config(), MediaConstraints::default());
        let joined = args.join(" ");
        assert!(joined.contains("-f v4l2 -i /dev/video0"));
        assert!(joined.contains("-f alsa -i default"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.ends_with("-f webm pipe:1"));
    }

    #[test]
    fn test_capture_args_without_audio() {
        let constraints = MediaConstraints {
            video: true,
            audio: false,
        };
        let args = build_capture_args(&linux_config(), constraints);
        assert!(!args.contains(&"alsa".to_string()));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_open_error_mapping() {
        let not_found = std::io::Error::from(ErrorKind::NotFound);
        assert_eq!(map_open_error(&not_found), DeviceError::NotFound);

        let denied = std::io::Error::from(ErrorKind::PermissionDenied);
        assert_eq!(map_open_error(&denied), DeviceError::Denied);

        let busy = std::io::Error::new(ErrorKind::Other, "Device or resource busy");
        assert!(matches!(map_open_error(&busy), DeviceError::NotReadable(_)));
    }

    #[tokio::test]
    async fn test_missing_device_node_is_not_found() {
        let mut config = linux_config();
        config.video_device = "/nonexistent/video42".to_string();
        let backend = FfmpegCapture::new("ffmpeg", config);
        if !backend.is_supported() {
            return;
        }
        let result = backend.open(MediaConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::NotFound)));
    }

    #[test]
    fn test_classify_device_failure() {
        assert_eq!(
            classify_device_failure("[video4linux2] Cannot open video device: Permission denied\n"),
            DeviceError::Denied
        );
        assert_eq!(
            classify_device_failure("[avfoundation] Could not find video device with index 3\n"),
            DeviceError::NotFound
        );
        assert_eq!(
            classify_device_failure("ioctl(VIDIOC_STREAMON): Device or resource busy\n\n"),
            DeviceError::NotReadable("ioctl(VIDIOC_STREAMON): Device or resource busy".to_string())
        );
        assert_eq!(
            classify_device_failure(""),
            DeviceError::NotReadable("recorder exited unexpectedly".to_string())
        );
    }

    #[test]
    fn test_check_args_grab_one_frame() {
        let args = build_check_args(&linux_config());
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -f v4l2 -i /dev/video0 -frames:v 1 -f null -"
        );
    }

    #[cfg(unix)]
    async fn stub_ffmpeg(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        // Let children forked while the script was open for writing reach exec.
        tokio::time::sleep(Duration::from_millis(50)).await;
        path.to_string_lossy().into_owned()
    }

    fn avfoundation_config() -> CaptureConfig {
        CaptureConfig {
            input_format: "avfoundation".to_string(),
            video_device: "0".to_string(),
            audio_format: String::new(),
            audio_device: String::new(),
            chunk_size: 1024,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_reports_denied_camera() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = stub_ffmpeg(
            dir.path(),
            r#"echo "[avfoundation @ 0x1] Permission denied" >&2; exit 1"#,
        )
        .await;

        let backend = FfmpegCapture::new(ffmpeg, avfoundation_config());
        let result = backend.open(MediaConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::Denied)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_reports_missing_camera() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = stub_ffmpeg(
            dir.path(),
            r#"echo "Could not find video device with index 0" >&2; exit 1"#,
        )
        .await;

        let backend = FfmpegCapture::new(ffmpeg, avfoundation_config());
        let result = backend.open(MediaConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorder_crash_is_a_device_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = stub_ffmpeg(
            dir.path(),
            r#"case "$*" in
  *pipe:1*) printf 'webm'; echo "Device or resource busy" >&2; exit 1 ;;
esac
exit 0"#,
        )
        .await;

        let backend = FfmpegCapture::new(ffmpeg, avfoundation_config());
        let mut source = backend.open(MediaConstraints::default()).await.unwrap();
        let mut sink = source.start_recording().await.unwrap();

        let mut received = Vec::new();
        let terminal = loop {
            match sink.next_signal().await {
                RecorderSignal::Chunk(chunk) => received.extend_from_slice(&chunk),
                other => break other,
            }
        };
        assert_eq!(received, b"webm");
        assert_eq!(
            terminal,
            RecorderSignal::Failed(DeviceError::NotReadable(
                "Device or resource busy".to_string()
            ))
        );
        assert!(sink.is_finished());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_requested_stop_drains_recorder() {
        let dir = tempfile::tempdir().unwrap();
        // Exits non-zero after `q`, which must still count as a clean stop.
        let ffmpeg = stub_ffmpeg(
            dir.path(),
            r#"case "$*" in
  *pipe:1*) cat >/dev/null; printf 'tail'; exit 255 ;;
esac
exit 0"#,
        )
        .await;

        let backend = FfmpegCapture::new(ffmpeg, avfoundation_config());
        let mut source = backend.open(MediaConstraints::default()).await.unwrap();
        let sink = source.start_recording().await.unwrap();

        let chunks = sink.stop().await;
        assert_eq!(chunks.concat(), b"tail");
    }

    #[tokio::test]
    async fn test_empty_input_format_is_unsupported() {
        let mut config = linux_config();
        config.input_format.clear();
        let backend = FfmpegCapture::new("ffmpeg", config);
        assert!(!backend.is_supported());
        assert!(matches!(
            backend.open(MediaConstraints::default()).await,
            Err(DeviceError::Unsupported)
        ));
    }
}
