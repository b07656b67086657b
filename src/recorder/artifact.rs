//! Processed artifacts and their preview handles

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

/// Which processed output an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Video,
    Thumbnail,
}

impl ArtifactKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "video/mp4",
            ArtifactKind::Thumbnail => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "mp4",
            ArtifactKind::Thumbnail => "jpg",
        }
    }

    /// Filename used for downloads and uploads
    pub fn default_filename(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "recording.mp4",
            ArtifactKind::Thumbnail => "thumbnail.jpg",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Video => f.write_str("video"),
            ArtifactKind::Thumbnail => f.write_str("thumbnail"),
        }
    }
}

/// Transient, locally resolvable preview of an artifact.
///
/// Backed by a temporary file; the file is removed (the handle revoked) when
/// the handle is dropped.
pub struct DisplayHandle {
    id: Uuid,
    path: Option<TempPath>,
    url: String,
}

impl DisplayHandle {
    /// Write `data` to a fresh preview file in `dir`
    pub fn issue(dir: &Path, kind: ArtifactKind, data: &[u8]) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let mut file = tempfile::Builder::new()
            .prefix(&format!("preview-{}-", kind))
            .suffix(&format!(".{}", kind.extension()))
            .tempfile_in(dir)?;
        file.write_all(data)?;
        file.flush()?;
        let path = file.into_temp_path();
        let url = file_url(&path);
        tracing::debug!("Issued display handle {} for {}: {}", id, kind, url);
        Ok(Self {
            id,
            path: Some(path),
            url,
        })
    }

    /// `file://` URL of the preview
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match path.close() {
                Ok(()) => tracing::debug!("Revoked display handle {}", self.id),
                Err(e) => tracing::warn!("Failed to revoke display handle {}: {}", self.id, e),
            }
        }
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("id", &self.id)
            .field("url", &self.url)
            .finish()
    }
}

/// Percent-encode a path into a `file://` URL
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded: Vec<String> = raw
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let joined = encoded.join("/");
    if joined.starts_with('/') {
        format!("file://{}", joined)
    } else {
        format!("file:///{}", joined)
    }
}

/// An immutable processed output plus its preview handle
#[derive(Debug)]
pub struct Artifact {
    kind: ArtifactKind,
    data: Bytes,
    handle: DisplayHandle,
}

impl Artifact {
    pub fn publish(kind: ArtifactKind, data: Bytes, preview_dir: &Path) -> std::io::Result<Self> {
        let handle = DisplayHandle::issue(preview_dir, kind, &data)?;
        Ok(Self { kind, data, handle })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    pub fn view(&self) -> ArtifactView {
        ArtifactView {
            kind: self.kind,
            url: self.handle.url().to_string(),
            path: self.handle.path().map(Path::to_path_buf),
            size_bytes: self.data.len(),
            mime_type: self.kind.mime_type().to_string(),
        }
    }
}

/// The video and thumbnail of one processing cycle. Only exists whole.
#[derive(Debug)]
pub struct ArtifactPair {
    pub video: Artifact,
    pub thumbnail: Artifact,
}

impl ArtifactPair {
    /// Publish both outputs. If the second preview cannot be issued, the
    /// first is revoked before returning the error.
    pub fn publish(video: Bytes, thumbnail: Bytes, preview_dir: &Path) -> std::io::Result<Self> {
        let video = Artifact::publish(ArtifactKind::Video, video, preview_dir)?;
        let thumbnail = Artifact::publish(ArtifactKind::Thumbnail, thumbnail, preview_dir)?;
        Ok(Self { video, thumbnail })
    }

    pub fn get(&self, kind: ArtifactKind) -> &Artifact {
        match kind {
            ArtifactKind::Video => &self.video,
            ArtifactKind::Thumbnail => &self.thumbnail,
        }
    }

    pub fn view(&self) -> ResultsView {
        ResultsView {
            video: self.video.view(),
            thumbnail: self.thumbnail.view(),
        }
    }
}

/// Serializable description of an artifact for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactView {
    pub kind: ArtifactKind,
    pub url: String,
    pub path: Option<PathBuf>,
    pub size_bytes: usize,
    pub mime_type: String,
}

/// Serializable description of the artifact pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub video: ArtifactView,
    pub thumbnail: ArtifactView,
}
