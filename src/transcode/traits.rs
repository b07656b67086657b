//! Transcoder boundary
//!
//! A staged pipeline over a private workspace keyed by names: stage inputs,
//! run transforms, read outputs, clean up.

use super::types::TranscodeDirective;
use crate::utils::error::{CleanupWarning, InitError, TranscodeError};
use async_trait::async_trait;
use bytes::Bytes;

/// Progress callback for a single `run`, receiving completion in [0, 1]
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Bring the engine up. Called once before any other method.
    async fn load(&self) -> Result<(), InitError>;

    /// Stage an input under `name`
    async fn put(&self, name: &str, data: Bytes) -> Result<(), TranscodeError>;

    /// Apply one transform, reporting monotonic progress for this call
    async fn run(
        &self,
        directive: &TranscodeDirective,
        progress: ProgressFn<'_>,
    ) -> Result<(), TranscodeError>;

    /// Read an output. Fails if the preceding `run` did not produce it.
    async fn get(&self, name: &str) -> Result<Bytes, TranscodeError>;

    /// Best-effort removal of staged entries
    async fn cleanup(&self, names: &[&str]) -> Vec<CleanupWarning>;
}
