//! FFmpeg transcoder
//!
//! Runs `ffmpeg` as a subprocess inside a private temporary workspace.
//! Progress comes from `-progress pipe:1`, scaled against the input duration
//! reported by `ffprobe`.

use super::traits::{ProgressFn, Transcoder};
use super::types::TranscodeDirective;
use crate::utils::error::{CleanupWarning, InitError, TranscodeError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Stderr fragments that mean the input itself is unusable
const INVALID_INPUT_MARKERS: &[&str] = &[
    "Invalid data found when processing input",
    "EBML header parsing failed",
    "could not find codec parameters",
    "does not contain any stream",
    "No such file or directory",
];

/// Transcoder backed by the ffmpeg command-line tools
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
    workspace: RwLock<Option<TempDir>>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            workspace: RwLock::new(None),
        }
    }

    fn workspace_dir(&self) -> Result<PathBuf, TranscodeError> {
        self.workspace
            .read()
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| TranscodeError::EngineFault("engine not loaded".to_string()))
    }

    /// Resolve a workspace name to a path, rejecting anything that escapes it
    fn resolve(&self, name: &str) -> Result<PathBuf, TranscodeError> {
        let is_plain = !name.is_empty()
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain {
            return Err(TranscodeError::InvalidInput(format!(
                "invalid workspace name: {:?}",
                name
            )));
        }
        Ok(self.workspace_dir()?.join(name))
    }

    /// Probe media duration in seconds. `None` when unknown.
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            tracing::debug!(
                "ffprobe failed for {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Parse one `-progress` line into elapsed output time in seconds
fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is in microseconds as well, despite the name
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| ProgressLine::OutTime(us as f64 / 1_000_000.0)),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProgressLine {
    OutTime(f64),
    End,
}

/// Map a failed ffmpeg run onto the error taxonomy
fn classify_failure(stderr: &str) -> TranscodeError {
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    let summary = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
    if INVALID_INPUT_MARKERS.iter().any(|m| stderr.contains(m)) {
        TranscodeError::InvalidInput(summary)
    } else {
        TranscodeError::EngineFault(summary)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn load(&self) -> Result<(), InitError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| InitError::EngineMissing(format!("{}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            return Err(InitError::EngineMissing(format!(
                "{} -version exited with {}",
                self.ffmpeg, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        if let Some(first) = version.lines().next() {
            tracing::info!("Transcoder ready: {}", first);
        }

        let dir = tempfile::Builder::new()
            .prefix("camera-recorder-")
            .tempdir()?;
        tracing::debug!("Transcoder workspace: {:?}", dir.path());
        *self.workspace.write() = Some(dir);
        Ok(())
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<(), TranscodeError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, &data).await?;
        tracing::debug!("Staged {} ({} bytes)", name, data.len());
        Ok(())
    }

    async fn run(
        &self,
        directive: &TranscodeDirective,
        progress: ProgressFn<'_>,
    ) -> Result<(), TranscodeError> {
        let workspace = self.workspace_dir()?;
        let input = self.resolve(directive.input())?;
        let output = self.resolve(directive.output())?;

        // A stale output from an earlier cycle must not satisfy `get`.
        match tokio::fs::remove_file(&output).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let total_secs = match directive {
            TranscodeDirective::Convert { .. } => self.probe_duration(&input).await,
            TranscodeDirective::ExtractFrame { .. } => None,
        };

        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ];
        args.extend(directive.args());

        tracing::info!("Starting FFmpeg: {:?}", args);
        progress(0.0);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .current_dir(&workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::EngineFault(format!("Failed to start FFmpeg: {}", e)))?;

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

        if let Some(stdout) = child.stdout.take() {
            let mut reported = 0.0f32;
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let fraction = match parse_progress_line(&line) {
                    Some(ProgressLine::OutTime(secs)) => match total_secs {
                        Some(total) => (secs / total).min(1.0) as f32,
                        None => continue,
                    },
                    Some(ProgressLine::End) => 1.0,
                    None => continue,
                };
                if fraction > reported {
                    reported = fraction;
                    progress(fraction);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| TranscodeError::EngineFault(format!("Failed to wait for FFmpeg: {}", e)))?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            tracing::error!("FFmpeg exited with {}: {}", status, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        progress(1.0);
        tracing::info!("FFmpeg finished: {}", directive.output());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Bytes, TranscodeError> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) if data.is_empty() => Err(TranscodeError::MissingOutput(name.to_string())),
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TranscodeError::MissingOutput(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cleanup(&self, names: &[&str]) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        for name in names {
            let path = match self.resolve(name) {
                Ok(path) => path,
                Err(e) => {
                    warnings.push(CleanupWarning {
                        name: name.to_string(),
                        source: std::io::Error::new(ErrorKind::InvalidInput, e.to_string()),
                    });
                    continue;
                }
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warnings.push(CleanupWarning {
                    name: name.to_string(),
                    source: e,
                }),
            }
        }
        warnings
    }
}
