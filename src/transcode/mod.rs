//! Clip transcoding
//!
//! This module converts a raw recording to MP4 and extracts a JPEG thumbnail
//! through an external engine driven as a subprocess.

pub mod ffmpeg;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use ffmpeg::FfmpegTranscoder;
pub use pipeline::process_clip;
pub use traits::{ProgressFn, Transcoder};
pub use types::{
    PipelineSettings, PipelineUpdate, ProcessedClip, TranscodeDirective, TranscodeStep,
};
