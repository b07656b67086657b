//! Camera/microphone capture
//!
//! This module provides the capture adapter boundary and an FFmpeg-backed
//! implementation for the platform device APIs.

pub mod ffmpeg;
pub mod handle;
pub mod traits;

pub use ffmpeg::FfmpegCapture;
pub use handle::CaptureHandle;
pub use traits::{
    CaptureBackend, CaptureSource, MediaConstraints, RecorderSignal, RecordingSink, SinkFeed,
};
