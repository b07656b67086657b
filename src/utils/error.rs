//! Error types and handling
//!
//! Error taxonomy shared by the session controller and its collaborators.
//! Collaborator errors never escape the controller; they are mapped onto a
//! status string and, for rejected requests, onto a [`SessionError`].

use crate::recorder::state::PhaseKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transcoding engine failed to start. Fatal for the session.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Transcoding engine unavailable: {0}")]
    EngineMissing(String),

    #[error("Failed to prepare engine workspace: {0}")]
    Workspace(#[from] std::io::Error),
}

/// Camera/microphone acquisition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Camera permission denied")]
    Denied,

    #[error("No camera or microphone found")]
    NotFound,

    #[error("Camera unusable due to a hardware issue: {0}")]
    NotReadable(String),

    #[error("Camera capture is not supported on this platform")]
    Unsupported,
}

/// Failures of a single transcode step
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Engine fault: {0}")]
    EngineFault(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output not produced: {0}")]
    MissingOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote upload failures. The artifact pair stays valid after any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error: {status_text}")]
    ServerError { status_text: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

/// Best-effort workspace cleanup failure. Logged, never surfaced.
#[derive(Error, Debug)]
#[error("Failed to remove workspace entry {name}: {source}")]
pub struct CleanupWarning {
    pub name: String,
    #[source]
    pub source: std::io::Error,
}

/// Local save failures
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Requests rejected by the session controller
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Controls are disabled while {0}")]
    ControlsDisabled(PhaseKind),

    #[error("You must start the camera first")]
    NoCaptureHandle,

    #[error("Camera cannot be toggled while recording")]
    CameraBusy,

    #[error("No processed artifacts available")]
    NoArtifacts,

    #[error("Cannot {event} while {phase}")]
    InvalidTransition { event: &'static str, phase: PhaseKind },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Session controller is no longer running")]
    Closed,
}

impl SessionError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::ControlsDisabled(_) => "CONTROLS_DISABLED",
            SessionError::NoCaptureHandle => "NO_CAPTURE_HANDLE",
            SessionError::CameraBusy => "CAMERA_BUSY",
            SessionError::NoArtifacts => "NO_ARTIFACTS",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::Device(DeviceError::Denied) => "DEVICE_DENIED",
            SessionError::Device(DeviceError::NotFound) => "DEVICE_NOT_FOUND",
            SessionError::Device(DeviceError::NotReadable(_)) => "DEVICE_NOT_READABLE",
            SessionError::Device(DeviceError::Unsupported) => "DEVICE_UNSUPPORTED",
            SessionError::Upload(UploadError::NetworkError(_)) => "UPLOAD_NETWORK_ERROR",
            SessionError::Upload(UploadError::ServerError { .. }) => "UPLOAD_SERVER_ERROR",
            SessionError::Upload(UploadError::InvalidResponse(_)) => "UPLOAD_INVALID_RESPONSE",
            SessionError::Delivery(_) => "DELIVERY_ERROR",
            SessionError::Closed => "SESSION_CLOSED",
        }
    }
}

/// Error response for the front-end
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<SessionError> for ErrorResponse {
    fn from(error: SessionError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;
