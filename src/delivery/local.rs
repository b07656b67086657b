//! Local save into the download directory

use crate::recorder::artifact::Artifact;
use crate::utils::error::DeliveryError;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Give up on finding a free name after this many attempts
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes artifacts into a download directory, never overwriting existing files
#[derive(Debug, Clone)]
pub struct LocalSaver {
    download_dir: PathBuf,
}

impl LocalSaver {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }

    /// Save `artifact` as `filename`. Returns the path actually written.
    pub fn save(&self, artifact: &Artifact, filename: &str) -> Result<PathBuf, DeliveryError> {
        std::fs::create_dir_all(&self.download_dir)?;

        let filename = sanitize_filename(filename)
            .unwrap_or_else(|| artifact.kind().default_filename().to_string());

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.download_dir.join(numbered_name(&filename, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => {
                    write_or_discard(file, &candidate, |file| {
                        file.write_all(artifact.data())?;
                        file.sync_all()
                    })?;
                    tracing::info!(
                        "Saved {} ({} bytes) to {:?}",
                        artifact.kind(),
                        artifact.len(),
                        candidate
                    );
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(DeliveryError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free name for {} in {:?}", filename, self.download_dir),
        )))
    }
}

/// Fill a freshly created file; remove it again if filling fails
fn write_or_discard(
    mut file: File,
    path: &Path,
    write: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let result = write(&mut file);
    drop(file);
    if let Err(e) = &result {
        tracing::warn!("Writing {:?} failed: {}", path, e);
        if let Err(remove_err) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove partial file {:?}: {}", path, remove_err);
        }
    }
    result
}

/// Keep only the final path component
fn sanitize_filename(filename: &str) -> Option<String> {
    Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// `name.ext`, `name (1).ext`, `name (2).ext`, ...
fn numbered_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, attempt, ext),
        _ => format!("{} ({})", filename, attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::artifact::ArtifactKind;
    use bytes::Bytes;

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered_name("recording.mp4", 0), "recording.mp4");
        assert_eq!(numbered_name("recording.mp4", 2), "recording (2).mp4");
        assert_eq!(numbered_name("README", 1), "README (1)");
        assert_eq!(numbered_name(".hidden", 1), ".hidden (1)");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("  clip.mp4 ").as_deref(), Some("clip.mp4"));
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    #[test]
    fn test_save_never_overwrites() {
        let previews = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let saver = LocalSaver::new(downloads.path());

        let first =
            Artifact::publish(ArtifactKind::Video, Bytes::from_static(b"one"), previews.path())
                .unwrap();
        let second =
            Artifact::publish(ArtifactKind::Video, Bytes::from_static(b"two"), previews.path())
                .unwrap();

        let p1 = saver.save(&first, "recording.mp4").unwrap();
        let p2 = saver.save(&second, "recording.mp4").unwrap();

        assert_eq!(p1.file_name().unwrap(), "recording.mp4");
        assert_eq!(p2.file_name().unwrap(), "recording (1).mp4");
        assert_eq!(std::fs::read(&p1).unwrap(), b"one");
        assert_eq!(std::fs::read(&p2).unwrap(), b"two");
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let downloads = tempfile::tempdir().unwrap();
        let path = downloads.path().join("recording.mp4");
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();

        let err = write_or_discard(file, &path, |file| {
            file.write_all(b"half a clip")?;
            Err(std::io::Error::new(ErrorKind::Other, "No space left on device"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "No space left on device");
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_falls_back_to_default_name() {
        let previews = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let saver = LocalSaver::new(downloads.path().join("nested"));

        let thumb =
            Artifact::publish(ArtifactKind::Thumbnail, Bytes::from_static(b"jpg"), previews.path())
                .unwrap();
        let path = saver.save(&thumb, "").unwrap();
        assert_eq!(path.file_name().unwrap(), "thumbnail.jpg");
    }
}
