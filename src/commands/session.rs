//! Session commands
//!
//! Parses console lines into session requests and dispatches them onto a
//! [`SessionHandle`].

use crate::recorder::{ArtifactKind, ResetOutcome, SessionHandle};
use crate::utils::error::ErrorResponse;
use thiserror::Error;

/// A parsed console request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    StartCamera,
    StopCamera,
    StartRecording,
    StopRecording,
    Save {
        kind: ArtifactKind,
        filename: Option<String>,
    },
    Upload,
    Reset,
    Status,
    Help,
    Quit,
}

/// Console input that does not name a command
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

const SAVE_USAGE: &str = "save <video|thumbnail> [filename]";
const CAMERA_USAGE: &str = "camera [on|off]";

pub const HELP: &str = "\
Commands:
  camera [on|off]                  start or stop the camera
  record                           start recording
  stop                             stop recording and process the clip
  save <video|thumbnail> [name]    save a processed file to the download directory
  upload                           upload video and thumbnail
  reset                            discard everything and start over
  status                           print the session state as JSON
  quit                             shut down";

/// Parse one console line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "camera" => match words.next() {
            None | Some("on") => ConsoleCommand::StartCamera,
            Some("off") => ConsoleCommand::StopCamera,
            Some(_) => return Err(ParseError::Usage(CAMERA_USAGE)),
        },
        "record" => ConsoleCommand::StartRecording,
        "stop" => ConsoleCommand::StopRecording,
        "save" | "download" => {
            let kind = match words.next() {
                Some("video") => ArtifactKind::Video,
                Some("thumbnail") | Some("thumb") => ArtifactKind::Thumbnail,
                _ => return Err(ParseError::Usage(SAVE_USAGE)),
            };
            let rest: Vec<&str> = words.collect();
            let filename = (!rest.is_empty()).then(|| rest.join(" "));
            ConsoleCommand::Save { kind, filename }
        }
        "upload" => ConsoleCommand::Upload,
        "reset" => ConsoleCommand::Reset,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Run a command against the session and describe the outcome
pub async fn dispatch(
    session: &SessionHandle,
    command: &ConsoleCommand,
) -> Result<String, ErrorResponse> {
    match command {
        ConsoleCommand::StartCamera => session.start_camera().await?,
        ConsoleCommand::StopCamera => session.stop_camera().await?,
        ConsoleCommand::StartRecording => session.start_recording().await?,
        ConsoleCommand::StopRecording => session.stop_recording().await?,
        ConsoleCommand::Save { kind, filename } => {
            let path = session.save_locally(*kind, filename.clone()).await?;
            return Ok(format!("Saved {} to {}", kind, path.display()));
        }
        ConsoleCommand::Upload => {
            let receipt = session.upload().await?;
            return Ok(format!("Uploaded: {}", receipt.video_url));
        }
        ConsoleCommand::Reset => {
            return Ok(match session.reset().await? {
                ResetOutcome::Applied => "Reset complete".to_string(),
                ResetOutcome::Deferred => {
                    "Reset will apply when processing finishes".to_string()
                }
            });
        }
        ConsoleCommand::Status => {
            return serde_json::to_string_pretty(&session.snapshot()).map_err(|e| {
                ErrorResponse {
                    code: "SERIALIZATION_ERROR".to_string(),
                    message: e.to_string(),
                }
            });
        }
        ConsoleCommand::Help => return Ok(HELP.to_string()),
        ConsoleCommand::Quit => {
            session.shutdown().await?;
            return Ok("Bye".to_string());
        }
    }
    Ok(session.snapshot().status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::testing::{MockCapture, MockDelivery, MockTranscoder};
    use crate::recorder::{Collaborators, PhaseKind, SessionController, SessionSettings};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_parse_camera_variants() {
        assert_eq!(parse("camera").unwrap(), Some(ConsoleCommand::StartCamera));
        assert_eq!(parse("  CAMERA on ").unwrap(), Some(ConsoleCommand::StartCamera));
        assert_eq!(parse("camera off").unwrap(), Some(ConsoleCommand::StopCamera));
        assert_eq!(
            parse("camera sideways").unwrap_err(),
            ParseError::Usage(CAMERA_USAGE)
        );
    }

    #[test]
    fn test_parse_save_with_filename() {
        assert_eq!(
            parse("save video my clip.mp4").unwrap(),
            Some(ConsoleCommand::Save {
                kind: ArtifactKind::Video,
                filename: Some("my clip.mp4".to_string()),
            })
        );
        assert_eq!(
            parse("save thumbnail").unwrap(),
            Some(ConsoleCommand::Save {
                kind: ArtifactKind::Thumbnail,
                filename: None,
            })
        );
        assert_eq!(parse("save").unwrap_err(), ParseError::Usage(SAVE_USAGE));
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(
            parse("dance").unwrap_err(),
            ParseError::Unknown("dance".to_string())
        );
    }

    #[tokio::test]
    async fn test_dispatch_maps_rejections_to_codes() {
        let previews = tempfile::tempdir().unwrap();
        let session = SessionController::spawn(
            Collaborators {
                capture: Arc::new(MockCapture::granting()),
                transcoder: Arc::new(MockTranscoder::succeeding(b"V", b"T")),
                delivery: Arc::new(MockDelivery::accepting("unused")),
            },
            SessionSettings {
                preview_dir: previews.path().to_path_buf(),
                ..SessionSettings::default()
            },
        );
        session
            .wait_until(Duration::from_secs(5), |s| s.phase == PhaseKind::Ready)
            .await
            .unwrap();

        let err = dispatch(&session, &ConsoleCommand::Upload).await.unwrap_err();
        assert_eq!(err.code, "NO_ARTIFACTS");

        let err = dispatch(&session, &ConsoleCommand::StartRecording)
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_CAPTURE_HANDLE");

        let out = dispatch(&session, &ConsoleCommand::StartCamera).await.unwrap();
        assert_eq!(out, "Camera ready. Start recording.");

        let json = dispatch(&session, &ConsoleCommand::Status).await.unwrap();
        assert!(json.contains("\"phase\": \"cameraOn\""));
    }
}
