//! Capture trait definitions
//!
//! Platform-agnostic traits for camera/microphone sources and the push-based
//! recording sink they produce.

use crate::utils::error::DeviceError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Media kinds requested from the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Opens live camera/microphone sources
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Whether this platform can capture at all. Checked before any request.
    fn is_supported(&self) -> bool;

    /// Acquire a live source
    async fn open(&self, constraints: MediaConstraints)
        -> Result<Box<dyn CaptureSource>, DeviceError>;
}

/// An open camera/microphone source
#[async_trait]
pub trait CaptureSource: Send {
    /// Human-readable device description
    fn label(&self) -> String;

    /// Start encoding the live source into chunks
    async fn start_recording(&mut self) -> Result<RecordingSink, DeviceError>;

    /// Stop every underlying track. Must be idempotent.
    fn close(&mut self);
}

/// Signal pushed by a running recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderSignal {
    /// Next encoded chunk, in production order
    Chunk(Bytes),
    /// Terminal signal; no chunks follow
    Stopped,
    /// The device gave out before a stop was requested; no chunks follow
    Failed(DeviceError),
}

/// Producer half of a recording, held by the capture implementation
pub struct SinkFeed {
    pub signals: mpsc::Sender<RecorderSignal>,
    /// Resolves when the consumer asks to stop or drops the sink
    pub stop: oneshot::Receiver<()>,
}

/// Consumer half of a recording, owned by the session
pub struct RecordingSink {
    signals: mpsc::Receiver<RecorderSignal>,
    stop_tx: Option<oneshot::Sender<()>>,
    finished: bool,
}

impl RecordingSink {
    /// Create a connected feed/sink pair
    pub fn channel(capacity: usize) -> (SinkFeed, RecordingSink) {
        let (signal_tx, signal_rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        (
            SinkFeed {
                signals: signal_tx,
                stop: stop_rx,
            },
            RecordingSink {
                signals: signal_rx,
                stop_tx: Some(stop_tx),
                finished: false,
            },
        )
    }

    /// Wait for the next signal. A closed feed counts as `Stopped`, and
    /// every call after a terminal signal returns `Stopped`.
    pub async fn next_signal(&mut self) -> RecorderSignal {
        if self.finished {
            return RecorderSignal::Stopped;
        }
        match self.signals.recv().await {
            Some(RecorderSignal::Chunk(chunk)) => RecorderSignal::Chunk(chunk),
            Some(RecorderSignal::Failed(error)) => {
                self.finished = true;
                RecorderSignal::Failed(error)
            }
            Some(RecorderSignal::Stopped) | None => {
                self.finished = true;
                RecorderSignal::Stopped
            }
        }
    }

    /// Ask the recorder to stop. Idempotent.
    pub fn request_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Request termination and collect every chunk delivered before the
    /// terminal signal, in order.
    pub async fn stop(mut self) -> Vec<Bytes> {
        self.request_stop();
        let mut remaining = Vec::new();
        while let RecorderSignal::Chunk(chunk) = self.next_signal().await {
            remaining.push(chunk);
        }
        remaining
    }
}
