//! Transcode types
//!
//! Directives, progress reporting and results for the processing step.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Workspace name of the staged raw recording
pub const INPUT_NAME: &str = "input.webm";
/// Workspace name of the converted video
pub const VIDEO_NAME: &str = "output.mp4";
/// Workspace name of the extracted thumbnail
pub const THUMBNAIL_NAME: &str = "thumbnail.jpg";

/// One external transform step, expressed over workspace names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeDirective {
    /// Re-encode `input` into `output` with the given video codec
    Convert {
        input: String,
        output: String,
        video_codec: String,
    },
    /// Write the single frame at `offset` of `input` as an image
    ExtractFrame {
        input: String,
        output: String,
        offset: Duration,
    },
}

impl TranscodeDirective {
    pub fn convert(video_codec: &str) -> Self {
        TranscodeDirective::Convert {
            input: INPUT_NAME.to_string(),
            output: VIDEO_NAME.to_string(),
            video_codec: video_codec.to_string(),
        }
    }

    pub fn thumbnail(offset: Duration) -> Self {
        TranscodeDirective::ExtractFrame {
            input: VIDEO_NAME.to_string(),
            output: THUMBNAIL_NAME.to_string(),
            offset,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            TranscodeDirective::Convert { input, .. } => input,
            TranscodeDirective::ExtractFrame { input, .. } => input,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            TranscodeDirective::Convert { output, .. } => output,
            TranscodeDirective::ExtractFrame { output, .. } => output,
        }
    }

    /// FFmpeg arguments for this directive, relative to the workspace
    pub fn args(&self) -> Vec<String> {
        match self {
            TranscodeDirective::Convert {
                input,
                output,
                video_codec,
            } => vec![
                "-i".to_string(),
                input.clone(),
                "-c:v".to_string(),
                video_codec.clone(),
                output.clone(),
            ],
            TranscodeDirective::ExtractFrame {
                input,
                output,
                offset,
            } => vec![
                "-i".to_string(),
                input.clone(),
                "-ss".to_string(),
                format_timestamp(*offset),
                "-vframes".to_string(),
                "1".to_string(),
                output.clone(),
            ],
        }
    }
}

/// Format a duration as `HH:MM:SS.mmm`
pub fn format_timestamp(offset: Duration) -> String {
    let total_ms = offset.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Processing sub-steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TranscodeStep {
    WritingInput,
    Converting,
    ExtractingThumbnail,
    ReadingResults,
}

/// Update emitted while a clip is processed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineUpdate {
    /// A new sub-step started
    Step(TranscodeStep),
    /// Fractional completion of the running step, in [0, 1]
    Progress(f32),
}

/// Scale a fractional progress value to a 0-100 display percentage
pub fn progress_percent(fraction: f32) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Both outputs of a successful processing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedClip {
    pub video: Bytes,
    pub thumbnail: Bytes,
}

/// Settings for the processing pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub video_codec: String,
    pub thumbnail_offset: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            thumbnail_offset: Duration::from_secs(1),
        }
    }
}
