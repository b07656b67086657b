//! Session state
//!
//! Defines the session phase machine and the recording buffer that feeds it.

use crate::capture::{CaptureHandle, RecordingSink};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Current phase of the session, with the resources owned in that phase.
///
/// Capture resources only exist inside `CameraOn` and `Recording`, so leaving
/// either variant drops (and closes) them.
pub enum Phase {
    /// Transcoding engine is loading, or failed to load
    Initializing { failure: Option<String> },
    /// Idle hub; results of the last cycle may be present
    Ready,
    /// Camera open, previewing
    CameraOn { capture: CaptureHandle },
    /// Camera open and recorder accumulating chunks
    Recording {
        capture: CaptureHandle,
        sink: RecordingSink,
        buffer: RecordingBuffer,
    },
    /// Transcode in flight for the given cycle
    Processing { cycle: u64, reset_requested: bool },
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Initializing { failure: None } => PhaseKind::Initializing,
            Phase::Initializing { failure: Some(_) } => PhaseKind::InitFailed,
            Phase::Ready => PhaseKind::Ready,
            Phase::CameraOn { .. } => PhaseKind::CameraOn,
            Phase::Recording { .. } => PhaseKind::Recording,
            Phase::Processing { .. } => PhaseKind::Processing,
        }
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Recording { buffer, .. } => f
                .debug_struct("Recording")
                .field("chunks", &buffer.chunk_count())
                .field("bytes", &buffer.byte_len())
                .finish(),
            Phase::Processing {
                cycle,
                reset_requested,
            } => f
                .debug_struct("Processing")
                .field("cycle", cycle)
                .field("reset_requested", reset_requested)
                .finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

/// Payload-free view of [`Phase`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    Initializing,
    InitFailed,
    Ready,
    CameraOn,
    Recording,
    Processing,
}

impl PhaseKind {
    /// Stable phases accept user actions
    pub fn is_stable(&self) -> bool {
        matches!(self, PhaseKind::Ready | PhaseKind::CameraOn | PhaseKind::Recording)
    }

    /// Whether camera/recording controls are usable
    pub fn controls_enabled(&self) -> bool {
        self.is_stable()
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PhaseKind::Initializing => "initializing",
            PhaseKind::InitFailed => "initialization failed",
            PhaseKind::Ready => "ready",
            PhaseKind::CameraOn => "camera on",
            PhaseKind::Recording => "recording",
            PhaseKind::Processing => "processing",
        };
        f.write_str(text)
    }
}

/// Append-only chunk accumulator for one recording cycle
#[derive(Debug)]
pub struct RecordingBuffer {
    chunks: Vec<Bytes>,
    byte_len: usize,
    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            byte_len: 0,
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Append a chunk in arrival order. Empty chunks carry nothing and are skipped.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.byte_len += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            started_at: self.started_at,
            duration_ms: self.start_time.elapsed().as_secs_f64() * 1000.0,
            chunk_count: self.chunks.len(),
            byte_count: self.byte_len,
        }
    }

    /// Concatenate every chunk, in order, into the clip. Consumes the buffer.
    pub fn into_clip(self) -> RawClip {
        let stats = self.stats();
        let mut data = BytesMut::with_capacity(self.byte_len);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        RawClip {
            data: data.freeze(),
            stats,
        }
    }
}

impl Default for RecordingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable raw recording handed to the transcoder
#[derive(Debug, Clone)]
pub struct RawClip {
    pub data: Bytes,
    pub stats: RecordingStats,
}

impl RawClip {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Summary of a finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStats {
    /// Wall-clock start of the recording
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds
    pub duration_ms: f64,
    pub chunk_count: usize,
    pub byte_count: usize,
}
