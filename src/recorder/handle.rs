//! Client side of the session controller
//!
//! Commands go in over an mpsc channel; state comes back as snapshots on a
//! watch channel and as discrete events on a broadcast channel.

use super::artifact::{ArtifactKind, ResultsView};
use super::state::{PhaseKind, RecordingStats};
use crate::delivery::UploadReceipt;
use crate::utils::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Reply channel for a command
pub type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// Requests handled by the controller, one at a time
#[derive(Debug)]
pub enum SessionCommand {
    StartCamera { reply: Reply<()> },
    StopCamera { reply: Reply<()> },
    StartRecording { reply: Reply<()> },
    StopRecording { reply: Reply<()> },
    SaveLocally {
        kind: ArtifactKind,
        filename: Option<String>,
        reply: Reply<PathBuf>,
    },
    Upload { reply: Reply<UploadReceipt> },
    Reset { reply: Reply<ResetOutcome> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// How a reset request was honored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResetOutcome {
    /// Session is back in Ready
    Applied,
    /// Processing is in flight; the reset applies when it finishes
    Deferred,
}

/// Everything a front-end needs to render the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: PhaseKind,
    /// 0-100, non-zero only while processing
    pub progress_percent: u8,
    pub status: String,
    pub status_is_error: bool,
    pub camera_control_enabled: bool,
    pub record_control_enabled: bool,
    pub delivery_enabled: bool,
    pub capture_open: bool,
    /// Bytes accumulated by the running recording
    pub recording_bytes: usize,
    pub last_recording: Option<RecordingStats>,
    pub results: Option<ResultsView>,
    pub reset_pending: bool,
}

impl SessionSnapshot {
    pub fn initial(status: String) -> Self {
        Self {
            phase: PhaseKind::Initializing,
            progress_percent: 0,
            status,
            status_is_error: false,
            camera_control_enabled: false,
            record_control_enabled: false,
            delivery_enabled: false,
            capture_open: false,
            recording_bytes: 0,
            last_recording: None,
            results: None,
            reset_pending: false,
        }
    }
}

/// Notable things that happened in the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged(PhaseKind),
    Progress(u8),
    Status(String),
    ResultsReady(ResultsView),
    Uploaded(UploadReceipt),
}

/// Cloneable handle for talking to a running controller
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        snapshots: watch::Receiver<SessionSnapshot>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            commands,
            snapshots,
            events,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn start_camera(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartCamera { reply }).await
    }

    pub async fn stop_camera(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StopCamera { reply }).await
    }

    pub async fn start_recording(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartRecording { reply })
            .await
    }

    pub async fn stop_recording(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StopRecording { reply })
            .await
    }

    /// Save one artifact to the download directory
    pub async fn save_locally(
        &self,
        kind: ArtifactKind,
        filename: Option<String>,
    ) -> SessionResult<PathBuf> {
        self.request(|reply| SessionCommand::SaveLocally {
            kind,
            filename,
            reply,
        })
        .await
    }

    pub async fn upload(&self) -> SessionResult<UploadReceipt> {
        self.request(|reply| SessionCommand::Upload { reply }).await
    }

    pub async fn reset(&self) -> SessionResult<ResetOutcome> {
        self.request(|reply| SessionCommand::Reset { reply }).await
    }

    /// Tear the session down: capture closed, previews revoked
    pub async fn shutdown(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Shutdown { reply: tx })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until a snapshot satisfies `predicate`, or `timeout` passes
    pub async fn wait_until(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        let mut rx = self.snapshots.clone();
        let found = match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            _ => None,
        };
        found
    }
}
