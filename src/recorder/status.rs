//! User-visible status text

use crate::transcode::TranscodeStep;
use crate::utils::error::{DeviceError, UploadError};
use std::fmt;

/// Every status line the session can show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Initializing,
    LoadingEngine,
    EngineLoaded,
    EngineLoadFailed,
    CameraUnsupported,
    CameraReady,
    CameraOff,
    CameraError(DeviceError),
    StartCameraFirst,
    CameraBusy,
    Recording,
    RecordingStopped,
    Step(TranscodeStep),
    ProcessingComplete,
    ProcessingFailed,
    ControlsDisabled,
    Resetting,
    ResetComplete,
    NothingToDownload,
    Saved(String),
    SaveFailed,
    NothingToUpload,
    Uploading,
    UploadSucceeded(String),
    UploadFailed(UploadError),
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Initializing => f.write_str("Initializing FFmpeg library..."),
            StatusMessage::LoadingEngine => {
                f.write_str("Loading FFmpeg core... (may take some time)")
            }
            StatusMessage::EngineLoaded => f.write_str("FFmpeg loaded. Please start the camera."),
            StatusMessage::EngineLoadFailed => f.write_str("Error: Could not load FFmpeg."),
            StatusMessage::CameraUnsupported => {
                f.write_str("Error: Camera feature is not supported on this platform.")
            }
            StatusMessage::CameraReady => f.write_str("Camera ready. Start recording."),
            StatusMessage::CameraOff => f.write_str("Camera is off. You can start it again."),
            StatusMessage::CameraError(e) => match e {
                DeviceError::Denied => f.write_str("Error: Camera permission denied."),
                DeviceError::NotFound => f.write_str("Error: No camera or microphone found."),
                DeviceError::NotReadable(_) => {
                    f.write_str("Error: Cannot use the camera due to a hardware issue.")
                }
                DeviceError::Unsupported => {
                    f.write_str("Error: Camera feature is not supported on this platform.")
                }
            },
            StatusMessage::StartCameraFirst => f.write_str("Error: You must start the camera first."),
            StatusMessage::CameraBusy => {
                f.write_str("Error: Stop recording before toggling the camera.")
            }
            StatusMessage::Recording => f.write_str("Recording..."),
            StatusMessage::RecordingStopped => f.write_str("Recording stopped. Processing video..."),
            StatusMessage::Step(step) => match step {
                TranscodeStep::WritingInput => f.write_str("Writing file..."),
                TranscodeStep::Converting => f.write_str("Converting to MP4..."),
                TranscodeStep::ExtractingThumbnail => f.write_str("Extracting thumbnail..."),
                TranscodeStep::ReadingResults => f.write_str("Reading results..."),
            },
            StatusMessage::ProcessingComplete => f.write_str("Processing complete!"),
            StatusMessage::ProcessingFailed => {
                f.write_str("Error: An issue occurred during video processing.")
            }
            StatusMessage::ControlsDisabled => f.write_str("Please wait for the current step to finish."),
            StatusMessage::Resetting => f.write_str("Resetting..."),
            StatusMessage::ResetComplete => f.write_str("Reset complete. Please start the camera."),
            StatusMessage::NothingToDownload => f.write_str("Error: No file to download."),
            StatusMessage::Saved(path) => write!(f, "Saved to {}", path),
            StatusMessage::SaveFailed => f.write_str("Error: Could not save the file."),
            StatusMessage::NothingToUpload => f.write_str("Error: No file to upload."),
            StatusMessage::Uploading => f.write_str("Uploading to server..."),
            StatusMessage::UploadSucceeded(url) => {
                write!(f, "Upload successful! File URL: {}", url)
            }
            StatusMessage::UploadFailed(e) => match e {
                UploadError::ServerError { status_text } => {
                    write!(f, "Error: Upload failed ({})", status_text)
                }
                UploadError::NetworkError(_) => f.write_str("Error: Network issue during upload."),
                UploadError::InvalidResponse(_) => f.write_str("Error: Upload failed"),
            },
        }
    }
}

impl StatusMessage {
    pub fn is_error(&self) -> bool {
        self.to_string().starts_with("Error:")
    }
}
