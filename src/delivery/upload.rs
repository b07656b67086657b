//! Remote upload over HTTP multipart

use crate::config::UploadConfig;
use crate::recorder::artifact::{Artifact, ArtifactPair};
use crate::utils::error::UploadError;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Successful upload response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub video_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Posts the artifact pair to a remote endpoint
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    video_field: String,
    thumbnail_field: String,
}

impl HttpUploader {
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UploadError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            video_field: config.video_field.clone(),
            thumbnail_field: config.thumbnail_field.clone(),
        })
    }

    fn part(artifact: &Artifact) -> Result<Part, UploadError> {
        Part::bytes(artifact.data().to_vec())
            .file_name(artifact.kind().default_filename())
            .mime_str(artifact.kind().mime_type())
            .map_err(|e| UploadError::NetworkError(format!("Invalid MIME type: {}", e)))
    }

    /// Submit both artifacts in a single multipart request
    pub async fn upload(&self, pair: &ArtifactPair) -> Result<UploadReceipt, UploadError> {
        let form = Form::new()
            .part(self.video_field.clone(), Self::part(&pair.video)?)
            .part(self.thumbnail_field.clone(), Self::part(&pair.thumbnail)?);

        tracing::info!(
            "Uploading {} + {} bytes to {}",
            pair.video.len(),
            pair.thumbnail.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status_text = status_text(&response);
            tracing::error!("Upload rejected: {} {}", status.as_u16(), status_text);
            return Err(UploadError::ServerError { status_text });
        }

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        tracing::info!("Upload accepted: {}", receipt.video_url);
        Ok(receipt)
    }
}

/// The reason phrase the server actually sent. Hyper only records it when it
/// differs from the standard one for the code.
fn status_text(response: &reqwest::Response) -> String {
    let status = response.status();
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).trim().to_string())
        .filter(|reason| !reason.is_empty())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| status.as_str().to_string())
}
