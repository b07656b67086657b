//! Artifact delivery
//!
//! Local save to the download directory and remote upload. Both take
//! artifacts from a complete pair; callers check presence first.

pub mod local;
pub mod upload;

pub use local::LocalSaver;
pub use upload::{HttpUploader, UploadReceipt};

use crate::recorder::artifact::{Artifact, ArtifactPair};
use crate::utils::error::{DeliveryError, UploadError};
use async_trait::async_trait;
use std::path::PathBuf;

/// Hands processed artifacts to the outside world
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Synchronous handoff to local storage
    fn save_locally(&self, artifact: &Artifact, filename: &str) -> Result<PathBuf, DeliveryError>;

    /// Upload both artifacts together
    async fn upload(&self, pair: &ArtifactPair) -> Result<UploadReceipt, UploadError>;
}

/// Download directory plus HTTP endpoint
pub struct StandardDelivery {
    saver: LocalSaver,
    uploader: HttpUploader,
}

impl StandardDelivery {
    pub fn new(saver: LocalSaver, uploader: HttpUploader) -> Self {
        Self { saver, uploader }
    }
}

#[async_trait]
impl Delivery for StandardDelivery {
    fn save_locally(&self, artifact: &Artifact, filename: &str) -> Result<PathBuf, DeliveryError> {
        self.saver.save(artifact, filename)
    }

    async fn upload(&self, pair: &ArtifactPair) -> Result<UploadReceipt, UploadError> {
        self.uploader.upload(pair).await
    }
}
