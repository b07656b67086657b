//! Recording session module
//!
//! This module implements the camera recording session:
//! - SessionController, the single writer of session state
//! - SessionHandle for issuing commands and observing snapshots
//! - Artifacts with revocable preview handles

pub mod artifact;
pub mod coordinator;
pub mod handle;
pub mod state;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{Artifact, ArtifactKind, ArtifactPair, ArtifactView, ResultsView};
pub use coordinator::{Collaborators, SessionController, SessionSettings};
pub use handle::{ResetOutcome, SessionEvent, SessionHandle, SessionSnapshot};
pub use state::{PhaseKind, RecordingStats};
pub use status::StatusMessage;
