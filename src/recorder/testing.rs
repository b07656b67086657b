//! In-memory collaborators for controller and pipeline tests

use crate::capture::{
    CaptureBackend, CaptureSource, MediaConstraints, RecorderSignal, RecordingSink, SinkFeed,
};
use crate::delivery::{Delivery, UploadReceipt};
use crate::recorder::artifact::{Artifact, ArtifactKind, ArtifactPair};
use crate::transcode::types::{TranscodeDirective, INPUT_NAME};
use crate::transcode::{ProgressFn, Transcoder};
use crate::utils::error::{
    CleanupWarning, DeliveryError, DeviceError, InitError, TranscodeError, UploadError,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Shared bookkeeping between a [`MockCapture`] and the sources it opens
#[derive(Default)]
pub struct CaptureTally {
    opens: AtomicUsize,
    closes: AtomicUsize,
    recordings: AtomicUsize,
    feed: Mutex<Option<mpsc::Sender<RecorderSignal>>>,
}

impl CaptureTally {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn recordings(&self) -> usize {
        self.recordings.load(Ordering::SeqCst)
    }

    /// Push a chunk from the running recorder
    pub async fn push_chunk(&self, data: &'static [u8]) {
        let feed = self.feed.lock().clone();
        if let Some(feed) = feed {
            let _ = feed.send(RecorderSignal::Chunk(Bytes::from_static(data))).await;
        }
    }

    /// Terminate the running recorder without being asked
    pub async fn end_recording(&self) {
        let feed = self.feed.lock().take();
        if let Some(feed) = feed {
            let _ = feed.send(RecorderSignal::Stopped).await;
        }
    }

    /// Make the running recorder die with a device error
    pub async fn fail_recording(&self, error: DeviceError) {
        let feed = self.feed.lock().take();
        if let Some(feed) = feed {
            let _ = feed.send(RecorderSignal::Failed(error)).await;
        }
    }
}

/// Capture backend that grants, denies or does not exist
pub struct MockCapture {
    supported: bool,
    denial: Option<DeviceError>,
    tally: Arc<CaptureTally>,
}

impl MockCapture {
    pub fn granting() -> Self {
        Self {
            supported: true,
            denial: None,
            tally: Arc::new(CaptureTally::default()),
        }
    }

    pub fn denying(error: DeviceError) -> Self {
        Self {
            denial: Some(error),
            ..Self::granting()
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::granting()
        }
    }

    pub fn tally(&self) -> Arc<CaptureTally> {
        self.tally.clone()
    }
}

#[async_trait]
impl CaptureBackend for MockCapture {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn open(
        &self,
        _constraints: MediaConstraints,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        if let Some(error) = &self.denial {
            return Err(error.clone());
        }
        self.tally.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSource {
            tally: self.tally.clone(),
            closed: false,
        }))
    }
}

struct MockSource {
    tally: Arc<CaptureTally>,
    closed: bool,
}

#[async_trait]
impl CaptureSource for MockSource {
    fn label(&self) -> String {
        "mock camera".to_string()
    }

    async fn start_recording(&mut self) -> Result<RecordingSink, DeviceError> {
        let (feed, sink) = RecordingSink::channel(32);
        let SinkFeed { signals, stop } = feed;
        *self.tally.feed.lock() = Some(signals.clone());
        self.tally.recordings.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let _ = stop.await;
            let _ = signals.send(RecorderSignal::Stopped).await;
        });
        Ok(sink)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tally.feed.lock().take();
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Transcoder
// ---------------------------------------------------------------------------

/// Workspace-backed transcoder with scripted outputs
pub struct MockTranscoder {
    load_failure: Option<String>,
    video: Bytes,
    thumbnail: Option<Bytes>,
    convert_fails: bool,
    gate: Option<Arc<Notify>>,
    files: Mutex<HashMap<String, Bytes>>,
    staged: Mutex<Option<Bytes>>,
    runs: Mutex<Vec<TranscodeDirective>>,
    cleaned: AtomicBool,
}

impl MockTranscoder {
    pub fn succeeding(video: &'static [u8], thumbnail: &'static [u8]) -> Self {
        Self {
            load_failure: None,
            video: Bytes::from_static(video),
            thumbnail: Some(Bytes::from_static(thumbnail)),
            convert_fails: false,
            gate: None,
            files: Mutex::new(HashMap::new()),
            staged: Mutex::new(None),
            runs: Mutex::new(Vec::new()),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Conversion works but the clip is too short for a frame at the offset
    pub fn thumbnail_missing(video: &'static [u8]) -> Self {
        Self {
            thumbnail: None,
            ..Self::succeeding(video, b"")
        }
    }

    pub fn convert_failing() -> Self {
        Self {
            convert_fails: true,
            ..Self::succeeding(b"", b"")
        }
    }

    pub fn failing_load(reason: &str) -> Self {
        Self {
            load_failure: Some(reason.to_string()),
            ..Self::succeeding(b"", b"")
        }
    }

    /// Conversion blocks after reporting half progress until the gate is notified
    pub fn gated(video: &'static [u8], thumbnail: &'static [u8]) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transcoder = Self {
            gate: Some(gate.clone()),
            ..Self::succeeding(video, thumbnail)
        };
        (transcoder, gate)
    }

    pub fn staged_input(&self) -> Option<Bytes> {
        self.staged.lock().clone()
    }

    pub fn cleaned_up(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<TranscodeDirective> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn load(&self) -> Result<(), InitError> {
        match &self.load_failure {
            Some(reason) => Err(InitError::EngineMissing(reason.clone())),
            None => Ok(()),
        }
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<(), TranscodeError> {
        if name == INPUT_NAME {
            *self.staged.lock() = Some(data.clone());
        }
        self.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn run(
        &self,
        directive: &TranscodeDirective,
        progress: ProgressFn<'_>,
    ) -> Result<(), TranscodeError> {
        self.runs.lock().push(directive.clone());
        if !self.files.lock().contains_key(directive.input()) {
            return Err(TranscodeError::EngineFault(format!(
                "{}: No such file or directory",
                directive.input()
            )));
        }

        match directive {
            TranscodeDirective::Convert { output, .. } => {
                progress(0.5);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.convert_fails {
                    return Err(TranscodeError::InvalidInput(
                        "EBML header parsing failed".to_string(),
                    ));
                }
                self.files.lock().insert(output.clone(), self.video.clone());
            }
            TranscodeDirective::ExtractFrame { output, .. } => {
                if let Some(thumbnail) = &self.thumbnail {
                    self.files.lock().insert(output.clone(), thumbnail.clone());
                }
            }
        }
        progress(1.0);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Bytes, TranscodeError> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| TranscodeError::MissingOutput(name.to_string()))
    }

    async fn cleanup(&self, names: &[&str]) -> Vec<CleanupWarning> {
        let mut files = self.files.lock();
        for name in names {
            files.remove(*name);
        }
        self.cleaned.store(true, Ordering::SeqCst);
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Records every handoff; uploads answer with a configurable result
pub struct MockDelivery {
    upload_result: Mutex<Result<UploadReceipt, UploadError>>,
    uploads: AtomicUsize,
    saves: Mutex<Vec<(ArtifactKind, String, Bytes)>>,
    uploaded: Mutex<Vec<(Bytes, Bytes)>>,
}

impl MockDelivery {
    pub fn accepting(video_url: &str) -> Self {
        Self::with_upload_result(Ok(UploadReceipt {
            video_url: video_url.to_string(),
            thumbnail_url: None,
        }))
    }

    pub fn rejecting(error: UploadError) -> Self {
        Self::with_upload_result(Err(error))
    }

    fn with_upload_result(result: Result<UploadReceipt, UploadError>) -> Self {
        Self {
            upload_result: Mutex::new(result),
            uploads: AtomicUsize::new(0),
            saves: Mutex::new(Vec::new()),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Video and thumbnail bytes of every upload attempt
    pub fn uploaded(&self) -> Vec<(Bytes, Bytes)> {
        self.uploaded.lock().clone()
    }

    pub fn saves(&self) -> Vec<(ArtifactKind, String, Bytes)> {
        self.saves.lock().clone()
    }
}

#[async_trait]
impl Delivery for MockDelivery {
    fn save_locally(&self, artifact: &Artifact, filename: &str) -> Result<PathBuf, DeliveryError> {
        self.saves
            .lock()
            .push((artifact.kind(), filename.to_string(), artifact.data().clone()));
        Ok(PathBuf::from(filename))
    }

    async fn upload(&self, pair: &ArtifactPair) -> Result<UploadReceipt, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.uploaded
            .lock()
            .push((pair.video.data().clone(), pair.thumbnail.data().clone()));
        self.upload_result.lock().clone()
    }
}
