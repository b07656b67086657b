//! Session controller
//!
//! Single writer of session state. Owns the phase machine, the capture
//! handle, the recording buffer and the artifact pair; requests arrive over a
//! command channel and asynchronous completions (engine load, transcode
//! progress, recorder signals) are folded into the same loop, so every
//! transition is serialized.

use super::artifact::{ArtifactKind, ArtifactPair};
use super::handle::{
    Reply, ResetOutcome, SessionCommand, SessionEvent, SessionHandle, SessionSnapshot,
};
use super::state::{Phase, PhaseKind, RawClip, RecordingBuffer, RecordingStats};
use super::status::StatusMessage;
use crate::capture::{
    CaptureBackend, CaptureHandle, FfmpegCapture, MediaConstraints, RecorderSignal,
};
use crate::config::RecorderConfig;
use crate::delivery::{Delivery, HttpUploader, LocalSaver, StandardDelivery, UploadReceipt};
use crate::transcode::types::progress_percent;
use crate::transcode::{
    process_clip, FfmpegTranscoder, PipelineSettings, PipelineUpdate, ProcessedClip, Transcoder,
};
use crate::utils::error::{
    DeviceError, SessionError, SessionResult, TranscodeError, UploadError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

/// Pending command capacity
const COMMAND_BUFFER: usize = 32;
/// Event broadcast capacity
const EVENT_BUFFER: usize = 100;

/// External collaborators of a session
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn CaptureBackend>,
    pub transcoder: Arc<dyn Transcoder>,
    pub delivery: Arc<dyn Delivery>,
}

impl Collaborators {
    /// FFmpeg capture and transcoding, local save plus HTTP upload
    pub fn from_config(config: &RecorderConfig) -> Result<Self, UploadError> {
        let uploader = HttpUploader::new(&config.upload)?;
        let saver = LocalSaver::new(config.output.download_dir.clone());
        Ok(Self {
            capture: Arc::new(FfmpegCapture::new(
                config.engine.ffmpeg.clone(),
                config.capture.clone(),
            )),
            transcoder: Arc::new(FfmpegTranscoder::new(
                config.engine.ffmpeg.clone(),
                config.engine.ffprobe.clone(),
            )),
            delivery: Arc::new(StandardDelivery::new(saver, uploader)),
        })
    }
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub pipeline: PipelineSettings,
    pub constraints: MediaConstraints,
    /// Where preview files for display handles are written
    pub preview_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            pipeline: PipelineSettings {
                video_codec: config.engine.video_codec.clone(),
                thumbnail_offset: Duration::from_millis(config.engine.thumbnail_offset_ms),
            },
            constraints: MediaConstraints::default(),
            preview_dir: config.output.preview_dir.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            constraints: MediaConstraints::default(),
            preview_dir: std::env::temp_dir(),
        }
    }
}

/// Completions reported back to the controller by spawned work
enum Internal {
    EngineLoaded(Result<(), String>),
    Pipeline { cycle: u64, update: PipelineUpdate },
    Processed {
        cycle: u64,
        result: Result<ProcessedClip, TranscodeError>,
    },
}

/// Owns all session state; driven by [`SessionController::spawn`]
pub struct SessionController {
    phase: Phase,
    results: Option<ArtifactPair>,
    last_recording: Option<RecordingStats>,
    progress_percent: u8,
    status: StatusMessage,
    /// Incremented per processing run; stale completions are dropped
    cycle: u64,
    published_phase: PhaseKind,

    collaborators: Collaborators,
    settings: SessionSettings,

    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Start a session on the current runtime and return its handle.
    ///
    /// Engine loading begins immediately; controls stay disabled until it
    /// finishes.
    pub fn spawn(collaborators: Collaborators, settings: SessionSettings) -> SessionHandle {
        let (controller, handle) = Self::new(collaborators, settings);
        tokio::spawn(controller.run());
        handle
    }

    fn new(collaborators: Collaborators, settings: SessionSettings) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let status = StatusMessage::Initializing;
        let (snapshot_tx, snapshot_rx) =
            watch::channel(SessionSnapshot::initial(status.to_string()));
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let handle = SessionHandle::new(command_tx, snapshot_rx, event_tx.clone());
        let controller = Self {
            phase: Phase::Initializing { failure: None },
            results: None,
            last_recording: None,
            progress_percent: 0,
            status,
            cycle: 0,
            published_phase: PhaseKind::Initializing,
            collaborators,
            settings,
            commands,
            internal_tx,
            internal_rx,
            snapshot_tx,
            event_tx,
        };
        (controller, handle)
    }

    async fn run(mut self) {
        self.begin_engine_load();
        self.publish();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                signal = next_recorder_signal(&mut self.phase) => {
                    self.handle_recorder_signal(signal).await
                }
            }
            self.publish();
        }
        tracing::info!("Session controller stopped");
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartCamera { reply } => {
                let result = self.start_camera().await;
                self.respond(reply, result);
            }
            SessionCommand::StopCamera { reply } => {
                let result = self.stop_camera();
                self.respond(reply, result);
            }
            SessionCommand::StartRecording { reply } => {
                let result = self.start_recording().await;
                self.respond(reply, result);
            }
            SessionCommand::StopRecording { reply } => {
                let result = self.stop_recording().await;
                self.respond(reply, result);
            }
            SessionCommand::SaveLocally {
                kind,
                filename,
                reply,
            } => {
                let result = self.save_locally(kind, filename);
                self.respond(reply, result);
            }
            SessionCommand::Upload { reply } => {
                let result = self.upload().await;
                self.respond(reply, result);
            }
            SessionCommand::Reset { reply } => {
                let result = self.reset();
                self.respond(reply, result);
            }
            SessionCommand::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
        }
    }

    /// Publish the resulting state before the requester sees the reply
    fn respond<T>(&mut self, reply: Reply<T>, result: SessionResult<T>) {
        if let Err(e) = &result {
            tracing::warn!("Request rejected in {:?}: {}", self.phase, e);
        }
        self.publish();
        if reply.send(result).is_err() {
            tracing::debug!("Requester went away before the reply");
        }
    }

    fn ensure_controls_enabled(&mut self) -> SessionResult<()> {
        let kind = self.phase.kind();
        if kind.controls_enabled() {
            return Ok(());
        }
        // Load failures and pending resets keep their own status line.
        if kind != PhaseKind::InitFailed && !self.reset_pending() {
            self.set_status(StatusMessage::ControlsDisabled);
        }
        Err(SessionError::ControlsDisabled(kind))
    }

    async fn start_camera(&mut self) -> SessionResult<()> {
        self.ensure_controls_enabled()?;
        match self.phase.kind() {
            PhaseKind::Ready => {}
            PhaseKind::Recording => {
                self.set_status(StatusMessage::CameraBusy);
                return Err(SessionError::CameraBusy);
            }
            phase => {
                return Err(SessionError::InvalidTransition {
                    event: "start camera",
                    phase,
                })
            }
        }

        let backend = self.collaborators.capture.clone();
        if !backend.is_supported() {
            self.set_status(StatusMessage::CameraUnsupported);
            return Err(DeviceError::Unsupported.into());
        }

        tracing::info!("Requesting camera access");
        match backend.open(self.settings.constraints).await {
            Ok(source) => {
                self.phase = Phase::CameraOn {
                    capture: CaptureHandle::new(source),
                };
                self.set_status(StatusMessage::CameraReady);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Camera access failed: {}", e);
                self.set_status(StatusMessage::CameraError(e.clone()));
                Err(e.into())
            }
        }
    }

    fn stop_camera(&mut self) -> SessionResult<()> {
        self.ensure_controls_enabled()?;
        match self.phase.kind() {
            PhaseKind::CameraOn => {
                // Dropping the handle closes every track.
                self.phase = Phase::Ready;
                self.set_status(StatusMessage::CameraOff);
                Ok(())
            }
            PhaseKind::Recording => {
                self.set_status(StatusMessage::CameraBusy);
                Err(SessionError::CameraBusy)
            }
            phase => Err(SessionError::InvalidTransition {
                event: "stop camera",
                phase,
            }),
        }
    }

    async fn start_recording(&mut self) -> SessionResult<()> {
        self.ensure_controls_enabled()?;
        let phase = self.phase.kind();
        if phase == PhaseKind::Recording {
            return Err(SessionError::InvalidTransition {
                event: "start recording",
                phase,
            });
        }

        let mut capture = match std::mem::replace(&mut self.phase, Phase::Ready) {
            Phase::CameraOn { capture } if capture.is_open() => capture,
            other => {
                self.phase = other;
                self.set_status(StatusMessage::StartCameraFirst);
                return Err(SessionError::NoCaptureHandle);
            }
        };

        match capture.start_recording().await {
            Ok(sink) => {
                // A new cycle invalidates the previous results and their previews.
                self.results = None;
                self.last_recording = None;
                self.phase = Phase::Recording {
                    capture,
                    sink,
                    buffer: RecordingBuffer::new(),
                };
                self.set_status(StatusMessage::Recording);
                tracing::info!("Recording started");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Recorder failed to start: {}", e);
                self.phase = Phase::CameraOn { capture };
                self.set_status(StatusMessage::CameraError(e.clone()));
                Err(e.into())
            }
        }
    }

    async fn stop_recording(&mut self) -> SessionResult<()> {
        self.ensure_controls_enabled()?;
        let phase = self.phase.kind();
        if phase != PhaseKind::Recording {
            return Err(SessionError::InvalidTransition {
                event: "stop recording",
                phase,
            });
        }
        self.finish_recording().await;
        Ok(())
    }

    /// Drain the recorder, release the camera and hand the clip to processing
    async fn finish_recording(&mut self) {
        if !matches!(self.phase, Phase::Recording { .. }) {
            return;
        }
        let Phase::Recording {
            capture,
            sink,
            mut buffer,
        } = std::mem::replace(&mut self.phase, Phase::Ready)
        else {
            return;
        };

        for chunk in sink.stop().await {
            buffer.push(chunk);
        }
        drop(capture);

        let clip = buffer.into_clip();
        tracing::info!(
            "Recording stopped: {} chunks, {} bytes, {:.0}ms",
            clip.stats.chunk_count,
            clip.stats.byte_count,
            clip.stats.duration_ms
        );
        self.last_recording = Some(clip.stats.clone());
        self.begin_processing(clip);
    }

    fn save_locally(
        &mut self,
        kind: ArtifactKind,
        filename: Option<String>,
    ) -> SessionResult<PathBuf> {
        self.ensure_controls_enabled()?;
        let Some(pair) = &self.results else {
            self.set_status(StatusMessage::NothingToDownload);
            return Err(SessionError::NoArtifacts);
        };

        let artifact = pair.get(kind);
        let filename = filename.unwrap_or_else(|| kind.default_filename().to_string());
        match self.collaborators.delivery.save_locally(artifact, &filename) {
            Ok(path) => {
                self.set_status(StatusMessage::Saved(path.display().to_string()));
                Ok(path)
            }
            Err(e) => {
                tracing::error!("Saving {} failed: {}", kind, e);
                self.set_status(StatusMessage::SaveFailed);
                Err(e.into())
            }
        }
    }

    async fn upload(&mut self) -> SessionResult<UploadReceipt> {
        self.ensure_controls_enabled()?;
        if self.results.is_none() {
            self.set_status(StatusMessage::NothingToUpload);
            return Err(SessionError::NoArtifacts);
        }

        self.set_status(StatusMessage::Uploading);
        self.publish();

        let delivery = self.collaborators.delivery.clone();
        let Some(pair) = self.results.as_ref() else {
            return Err(SessionError::NoArtifacts);
        };
        let result = delivery.upload(pair).await;

        match result {
            Ok(receipt) => {
                self.set_status(StatusMessage::UploadSucceeded(receipt.video_url.clone()));
                self.emit(SessionEvent::Uploaded(receipt.clone()));
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!("Upload failed: {}", e);
                self.set_status(StatusMessage::UploadFailed(e.clone()));
                Err(e.into())
            }
        }
    }

    fn reset(&mut self) -> SessionResult<ResetOutcome> {
        if let Phase::Processing {
            reset_requested, ..
        } = &mut self.phase
        {
            *reset_requested = true;
            self.set_status(StatusMessage::Resetting);
            tracing::info!("Reset deferred until processing finishes");
            return Ok(ResetOutcome::Deferred);
        }
        self.ensure_controls_enabled()?;
        self.apply_reset();
        self.set_status(StatusMessage::ResetComplete);
        Ok(ResetOutcome::Applied)
    }

    /// Release every resource and return to Ready
    fn apply_reset(&mut self) {
        if let Phase::Recording { mut sink, .. } =
            std::mem::replace(&mut self.phase, Phase::Ready)
        {
            sink.request_stop();
        }
        self.results = None;
        self.last_recording = None;
        self.progress_percent = 0;
        tracing::info!("Session reset");
    }

    fn teardown(&mut self) {
        if let Phase::Recording { mut sink, .. } =
            std::mem::replace(&mut self.phase, Phase::Ready)
        {
            sink.request_stop();
        }
        self.results = None;
    }

    // ---------------------------------------------------------------------
    // Asynchronous completions
    // ---------------------------------------------------------------------

    fn begin_engine_load(&mut self) {
        self.set_status(StatusMessage::LoadingEngine);
        let transcoder = self.collaborators.transcoder.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transcoder.load().await.map_err(|e| e.to_string());
            let _ = tx.send(Internal::EngineLoaded(result));
        });
    }

    fn begin_processing(&mut self, clip: RawClip) {
        self.cycle += 1;
        let cycle = self.cycle;
        self.phase = Phase::Processing {
            cycle,
            reset_requested: false,
        };
        self.progress_percent = 0;
        self.set_status(StatusMessage::RecordingStopped);

        let transcoder = self.collaborators.transcoder.clone();
        let settings = self.settings.pipeline.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let updates = tx.clone();
            let result = process_clip(transcoder.as_ref(), &clip, &settings, move |update| {
                let _ = updates.send(Internal::Pipeline { cycle, update });
            })
            .await;
            let _ = tx.send(Internal::Processed { cycle, result });
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::EngineLoaded(result) => self.on_engine_loaded(result),
            Internal::Pipeline { cycle, update } => {
                if !self.is_current_cycle(cycle) {
                    return;
                }
                match update {
                    PipelineUpdate::Step(step) => {
                        tracing::debug!("Processing step: {:?}", step);
                        self.progress_percent = 0;
                        if !self.reset_pending() {
                            self.set_status(StatusMessage::Step(step));
                        }
                    }
                    PipelineUpdate::Progress(fraction) => {
                        self.progress_percent = progress_percent(fraction);
                        self.emit(SessionEvent::Progress(self.progress_percent));
                    }
                }
            }
            Internal::Processed { cycle, result } => {
                if self.is_current_cycle(cycle) {
                    self.on_processed(result);
                } else {
                    tracing::debug!("Dropping stale processing result for cycle {}", cycle);
                }
            }
        }
    }

    fn on_engine_loaded(&mut self, result: Result<(), String>) {
        if !matches!(self.phase, Phase::Initializing { failure: None }) {
            return;
        }
        match result {
            Ok(()) => {
                tracing::info!("Transcoding engine loaded");
                self.phase = Phase::Ready;
                self.set_status(StatusMessage::EngineLoaded);
            }
            Err(reason) => {
                tracing::error!("Transcoding engine failed to load: {}", reason);
                self.phase = Phase::Initializing {
                    failure: Some(reason),
                };
                self.set_status(StatusMessage::EngineLoadFailed);
            }
        }
    }

    fn on_processed(&mut self, result: Result<ProcessedClip, TranscodeError>) {
        let reset_requested = self.reset_pending();
        self.phase = Phase::Ready;
        self.progress_percent = 0;

        if reset_requested {
            if let Err(e) = &result {
                tracing::warn!("Processing failed during pending reset: {}", e);
            }
            self.apply_reset();
            self.set_status(StatusMessage::ResetComplete);
            return;
        }

        let published = result.and_then(|processed| {
            ArtifactPair::publish(processed.video, processed.thumbnail, &self.settings.preview_dir)
                .map_err(TranscodeError::from)
        });

        match published {
            Ok(pair) => {
                let view = pair.view();
                self.results = Some(pair);
                self.set_status(StatusMessage::ProcessingComplete);
                self.emit(SessionEvent::ResultsReady(view));
            }
            Err(e) => {
                tracing::error!("Processing failed: {}", e);
                self.results = None;
                self.set_status(StatusMessage::ProcessingFailed);
            }
        }
    }

    async fn handle_recorder_signal(&mut self, signal: RecorderSignal) {
        match signal {
            RecorderSignal::Chunk(chunk) => {
                if let Phase::Recording { buffer, .. } = &mut self.phase {
                    buffer.push(chunk);
                }
            }
            RecorderSignal::Stopped => {
                tracing::warn!("Recorder terminated on its own; finishing the recording");
                self.finish_recording().await;
            }
            RecorderSignal::Failed(error) => {
                tracing::error!("Recorder failed: {}", error);
                let has_data = matches!(
                    &self.phase,
                    Phase::Recording { buffer, .. } if !buffer.is_empty()
                );
                if has_data {
                    self.finish_recording().await;
                } else {
                    self.abandon_recording(error);
                }
            }
        }
    }

    /// Drop a recording whose device failed before delivering anything
    fn abandon_recording(&mut self, error: DeviceError) {
        if !matches!(self.phase, Phase::Recording { .. }) {
            return;
        }
        // Dropping the capture handle closes every track.
        self.phase = Phase::Ready;
        self.set_status(StatusMessage::CameraError(error));
    }

    fn is_current_cycle(&self, cycle: u64) -> bool {
        matches!(self.phase, Phase::Processing { cycle: current, .. } if current == cycle)
    }

    fn reset_pending(&self) -> bool {
        matches!(
            self.phase,
            Phase::Processing {
                reset_requested: true,
                ..
            }
        )
    }

    // ---------------------------------------------------------------------
    // Publication
    // ---------------------------------------------------------------------

    fn set_status(&mut self, status: StatusMessage) {
        let text = status.to_string();
        if status.is_error() {
            tracing::warn!("{}", text);
        } else {
            tracing::debug!("Status: {}", text);
        }
        self.status = status;
        self.emit(SessionEvent::Status(text));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn publish(&mut self) {
        let phase = self.phase.kind();
        if phase != self.published_phase {
            tracing::info!("Phase: {} -> {}", self.published_phase, phase);
            self.published_phase = phase;
            self.emit(SessionEvent::PhaseChanged(phase));
        }

        let controls = phase.controls_enabled();
        let (capture_open, recording_bytes) = match &self.phase {
            Phase::CameraOn { capture } => (capture.is_open(), 0),
            Phase::Recording {
                capture, buffer, ..
            } => (capture.is_open(), buffer.byte_len()),
            _ => (false, 0),
        };

        let snapshot = SessionSnapshot {
            phase,
            progress_percent: self.progress_percent,
            status: self.status.to_string(),
            status_is_error: self.status.is_error(),
            camera_control_enabled: controls && phase != PhaseKind::Recording,
            record_control_enabled: controls && phase != PhaseKind::Ready,
            delivery_enabled: controls && self.results.is_some(),
            capture_open,
            recording_bytes,
            last_recording: self.last_recording.clone(),
            results: self.results.as_ref().map(ArtifactPair::view),
            reset_pending: self.reset_pending(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Next recorder signal while recording; never resolves otherwise
async fn next_recorder_signal(phase: &mut Phase) -> RecorderSignal {
    match phase {
        Phase::Recording { sink, .. } => sink.next_signal().await,
        _ => std::future::pending().await,
    }
}
