//! Recorder configuration
//!
//! Defaults, overlaid by an optional TOML file, overlaid by environment
//! variables.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Env var pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "CAMERA_RECORDER_CONFIG";
/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "camera-recorder.toml";

const FFMPEG_ENV: &str = "CAMERA_RECORDER_FFMPEG";
const UPLOAD_URL_ENV: &str = "CAMERA_RECORDER_UPLOAD_URL";
const DOWNLOAD_DIR_ENV: &str = "CAMERA_RECORDER_DOWNLOAD_DIR";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Full recorder configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub engine: EngineConfig,
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
    pub output: OutputConfig,
}

/// Transcoding engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg binary name or path
    pub ffmpeg: String,
    /// ffprobe binary name or path
    pub ffprobe: String,
    /// Video codec for the distributable MP4
    pub video_codec: String,
    /// Thumbnail frame position in milliseconds
    pub thumbnail_offset_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            thumbnail_offset_ms: 1000,
        }
    }
}

/// Camera/microphone capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// ffmpeg input format for video (v4l2, avfoundation, dshow)
    pub input_format: String,
    /// Video device
    pub video_device: String,
    /// ffmpeg input format for audio (empty when muxed with video)
    pub audio_format: String,
    /// Audio device (empty for none)
    pub audio_device: String,
    /// Maximum size of a single recorded chunk in bytes
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self {
                input_format: "avfoundation".to_string(),
                video_device: "0:0".to_string(),
                audio_format: String::new(),
                audio_device: String::new(),
                chunk_size: 64 * 1024,
            }
        }

        #[cfg(target_os = "windows")]
        {
            Self {
                input_format: "dshow".to_string(),
                video_device: "video=Integrated Camera".to_string(),
                audio_format: String::new(),
                audio_device: String::new(),
                chunk_size: 64 * 1024,
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self {
                input_format: "v4l2".to_string(),
                video_device: "/dev/video0".to_string(),
                audio_format: "alsa".to_string(),
                audio_device: "default".to_string(),
                chunk_size: 64 * 1024,
            }
        }
    }
}

/// Remote upload settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    pub video_field: String,
    pub thumbnail_field: String,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://your-server.com/api/upload".to_string(),
            video_field: "video".to_string(),
            thumbnail_field: "thumbnail".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where saved files and previews go
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Target of local saves
    pub download_dir: PathBuf,
    /// Directory for transient preview files
    pub preview_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
            preview_dir: env::temp_dir(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from the standard locations and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match discover_config_file() {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var(FFMPEG_ENV) {
            tracing::debug!("{} overrides ffmpeg binary", FFMPEG_ENV);
            self.engine.ffmpeg = v;
        }
        if let Ok(v) = env::var(UPLOAD_URL_ENV) {
            tracing::debug!("{} overrides upload endpoint", UPLOAD_URL_ENV);
            self.upload.endpoint = v;
        }
        if let Ok(v) = env::var(DOWNLOAD_DIR_ENV) {
            tracing::debug!("{} overrides download directory", DOWNLOAD_DIR_ENV);
            self.output.download_dir = PathBuf::from(v);
        }
    }
}

fn discover_config_file() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    local.exists().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.engine.video_codec, "libx264");
        assert_eq!(config.engine.thumbnail_offset_ms, 1000);
        assert_eq!(config.upload.video_field, "video");
        assert_eq!(config.upload.thumbnail_field, "thumbnail");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera-recorder.toml");
        std::fs::write(
            &path,
            "[upload]\nendpoint = \"http://localhost:9000/upload\"\n\n[engine]\nthumbnail_offset_ms = 2500\n",
        )
        .unwrap();

        let config = RecorderConfig::from_file(&path).unwrap();
        assert_eq!(config.upload.endpoint, "http://localhost:9000/upload");
        assert_eq!(config.upload.timeout_secs, 30);
        assert_eq!(config.engine.thumbnail_offset_ms, 2500);
        assert_eq!(config.engine.ffmpeg, "ffmpeg");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[engine\nffmpeg = 1").unwrap();

        match RecorderConfig::from_file(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = RecorderConfig::from_file(Path::new("/nonexistent/camera-recorder.toml"));
        assert!(matches!(err, Err(ConfigError::FileRead { .. })));
    }
}
