//! Shared utilities

pub mod error;
pub mod logging;

pub use error::{
    CleanupWarning, DeliveryError, DeviceError, ErrorResponse, InitError, SessionError,
    SessionResult, TranscodeError, UploadError,
};
