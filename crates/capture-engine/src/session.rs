//! Recording session management.
//!
//! A session observes one render surface, feeds its frames to an encoder
//! and keeps the encoder's fragments in report order. Finalization waits
//! for the encoder to confirm completion before the fragments are
//! concatenated into the session's single artifact.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chromacast_common::clock::RecordingClock;
use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{
    ArtifactManifest, Dimensions, EncodedChunk, ExportArtifact, StopReason,
};
use chromacast_render_engine::{CaptureLease, FrameStream, RenderSurface};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::pipeline::{EncoderEvent, EncoderEvents, EncoderStats, FrameEncoder};

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Frames are being encoded.
    Recording,
    /// Capture ended; waiting for the encoder to drain.
    Finalizing,
    /// Artifact built (or encoding failed). Terminal.
    Stopped,
}

/// Ordered log of encoded fragments.
#[derive(Debug, Clone, Default)]
pub struct ChunkLog {
    inner: Arc<Mutex<Vec<EncodedChunk>>>,
}

impl ChunkLog {
    fn append(&self, data: Vec<u8>) -> u64 {
        let mut chunks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = chunks.len() as u64;
        chunks.push(EncodedChunk::new(sequence, data));
        sequence
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(EncodedChunk::len)
            .sum()
    }

    /// Copy of the fragments collected so far.
    pub fn snapshot(&self) -> Vec<EncodedChunk> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn to_artifact(&self, mime_type: &str, complete: bool) -> ExportArtifact {
        let chunks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ExportArtifact::from_chunks(&chunks, mime_type, complete)
    }
}

type StopSender = Arc<watch::Sender<Option<StopReason>>>;

/// Record the first stop reason; later ones are ignored.
fn signal_stop(tx: &watch::Sender<Option<StopReason>>, reason: StopReason) {
    tx.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        true
    });
}

/// Cloneable handle that asks a session to stop capturing.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: StopSender,
}

impl StopHandle {
    /// Ask the capture loop to stop. No effect once a stop reason is set.
    pub fn request_stop(&self) {
        signal_stop(&self.tx, StopReason::Requested);
    }
}

/// Summary of a finalized session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub stop_reason: StopReason,
    pub duration: Duration,
    pub frames_captured: u64,
    pub encoder_stats: EncoderStats,
}

struct CaptureReport {
    encoder: Box<dyn FrameEncoder>,
    reason: StopReason,
    frames: u64,
}

type Completion = oneshot::Receiver<Result<(), String>>;

/// Capture rate used unless overridden.
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

/// A single capture of one render surface.
pub struct RecordingSession {
    encoder: Option<Box<dyn FrameEncoder>>,
    encoder_name: String,
    mime_type: String,
    state: Arc<Mutex<SessionState>>,
    chunks: ChunkLog,
    stop_tx: StopSender,
    lease: Option<CaptureLease>,
    clock: Option<RecordingClock>,
    dims: Option<Dimensions>,
    capture_task: Option<JoinHandle<CaptureReport>>,
    completion: Option<Completion>,
    outcome: Option<SessionOutcome>,
    partial: Option<ExportArtifact>,
    frame_interval: Duration,
}

impl RecordingSession {
    /// Create an idle session around `encoder`, sampling at
    /// [`DEFAULT_CAPTURE_FPS`].
    pub fn new(encoder: Box<dyn FrameEncoder>) -> Self {
        let (stop_tx, _) = watch::channel(None);
        Self {
            encoder_name: encoder.name().to_string(),
            mime_type: encoder.mime_type().to_string(),
            encoder: Some(encoder),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            chunks: ChunkLog::default(),
            stop_tx: Arc::new(stop_tx),
            lease: None,
            clock: None,
            dims: None,
            capture_task: None,
            completion: None,
            outcome: None,
            partial: None,
            frame_interval: Duration::from_secs(1) / DEFAULT_CAPTURE_FPS,
        }
    }

    /// Sample the surface at most `fps` times per second (at least once).
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = Duration::from_secs(1) / fps.max(1);
        self
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// MIME type of the artifact this session produces.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Name of the encoder backend.
    pub fn encoder_name(&self) -> &str {
        &self.encoder_name
    }

    /// Handle that stops the capture from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Fragments collected so far, in report order.
    pub fn fragments(&self) -> Vec<EncodedChunk> {
        self.chunks.snapshot()
    }

    /// Shared fragment log, readable while recording.
    pub fn chunk_log(&self) -> &ChunkLog {
        &self.chunks
    }

    /// What was collected before an encoding failure.
    pub fn partial_artifact(&self) -> Option<&ExportArtifact> {
        self.partial.as_ref()
    }

    /// Summary of the finalized capture, if any.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Elapsed capture time, zero before start.
    pub fn elapsed(&self) -> Duration {
        self.clock
            .as_ref()
            .map(RecordingClock::elapsed)
            .unwrap_or_default()
    }

    /// Start capturing `surface` for at most `window`.
    ///
    /// Fails with `AlreadyRecording` unless the session is idle and the
    /// surface is free.
    pub fn start(&mut self, surface: &Arc<RenderSurface>, window: Duration) -> ChromacastResult<()> {
        if self.state() != SessionState::Idle {
            return Err(ChromacastError::AlreadyRecording);
        }
        let lease = surface
            .claim_capture()
            .ok_or(ChromacastError::AlreadyRecording)?;
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| ChromacastError::capture("Session has no encoder"))?;

        let dims = surface.dimensions();
        let (events, event_rx) = EncoderEvents::channel();
        if let Err(e) = encoder.begin(dims, events.clone()) {
            self.encoder = Some(encoder);
            return Err(e);
        }

        tracing::info!(
            encoder = %self.encoder_name,
            %dims,
            window_secs = window.as_secs_f64(),
            "Starting recording session"
        );

        let clock = RecordingClock::start();
        let (done_tx, done_rx) = oneshot::channel();
        set_state(&self.state, SessionState::Recording);

        tokio::spawn(collect_fragments(
            event_rx,
            self.chunks.clone(),
            Arc::clone(&self.stop_tx),
            Arc::clone(&self.state),
            done_tx,
        ));
        self.capture_task = Some(tokio::spawn(capture_frames(
            encoder,
            events,
            surface.subscribe(),
            self.stop_tx.subscribe(),
            window,
            self.frame_interval,
            clock.clone(),
            Arc::clone(&self.state),
        )));

        self.completion = Some(done_rx);
        self.lease = Some(lease);
        self.clock = Some(clock);
        self.dims = Some(dims);
        Ok(())
    }

    /// Stop now and finalize.
    ///
    /// In-flight fragments are drained before the artifact is built. A
    /// session whose encoder already failed is finalized as it stands.
    pub async fn stop(&mut self) -> ChromacastResult<ExportArtifact> {
        self.ensure_active()?;
        tracing::info!(elapsed_secs = self.elapsed().as_secs_f64(), "Stopping recording session");
        signal_stop(&self.stop_tx, StopReason::Requested);
        set_state(&self.state, SessionState::Finalizing);
        self.finalize().await
    }

    /// Wait for the window to elapse (or a [`StopHandle`] request), then
    /// finalize.
    pub async fn finish(&mut self) -> ChromacastResult<ExportArtifact> {
        self.ensure_active()?;
        self.finalize().await
    }

    /// Manifest describing `artifact`, available once finalized.
    pub fn manifest(&self, artifact: &ExportArtifact) -> Option<ArtifactManifest> {
        let outcome = self.outcome.as_ref()?;
        let clock = self.clock.as_ref()?;
        Some(ArtifactManifest {
            mime_type: artifact.mime_type().to_string(),
            byte_len: artifact.len(),
            fragment_count: artifact.fragment_count(),
            complete: artifact.is_complete(),
            started_at: clock.epoch_wall().to_string(),
            duration_secs: outcome.duration.as_secs_f64(),
            stop_reason: outcome.stop_reason,
            dimensions: self.dims?,
            encoder: self.encoder_name.clone(),
            reference: None,
        })
    }

    /// A started session stays finalizable until its artifact is built,
    /// even if an encoder failure already moved it to `Stopped`.
    fn ensure_active(&self) -> ChromacastResult<()> {
        if self.capture_task.is_some() {
            return Ok(());
        }
        Err(ChromacastError::capture(format!(
            "Session is not recording (state: {:?})",
            self.state()
        )))
    }

    async fn finalize(&mut self) -> ChromacastResult<ExportArtifact> {
        let task = self
            .capture_task
            .take()
            .ok_or_else(|| ChromacastError::capture("Session is not recording"))?;
        let completion = self
            .completion
            .take()
            .ok_or_else(|| ChromacastError::capture("Session has no completion channel"))?;

        let report = task
            .await
            .map_err(|e| ChromacastError::capture(format!("Capture task failed: {e}")))?;
        let drained = completion
            .await
            .unwrap_or_else(|_| Err("Fragment collector exited early".to_string()));

        let duration = self.elapsed();
        self.outcome = Some(SessionOutcome {
            stop_reason: report.reason,
            duration,
            frames_captured: report.frames,
            encoder_stats: report.encoder.stats(),
        });
        drop(report.encoder);
        self.lease = None;
        set_state(&self.state, SessionState::Stopped);

        match drained {
            Ok(()) => {
                let artifact = self.chunks.to_artifact(&self.mime_type, true);
                tracing::info!(
                    reason = ?report.reason,
                    frames = report.frames,
                    fragments = artifact.fragment_count(),
                    bytes = artifact.len(),
                    duration_secs = duration.as_secs_f64(),
                    "Recording session finalized"
                );
                Ok(artifact)
            }
            Err(message) => {
                let partial = self.chunks.to_artifact(&self.mime_type, false);
                tracing::error!(
                    error = %message,
                    fragments = partial.fragment_count(),
                    bytes = partial.len(),
                    "Encoding failed; keeping partial artifact"
                );
                self.partial = Some(partial);
                Err(ChromacastError::encoding(message))
            }
        }
    }
}

/// Move to `next` unless the session already reached `Stopped`.
fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
    if *current != SessionState::Stopped {
        *current = next;
    }
}

fn failure_message(err: ChromacastError) -> String {
    match err {
        ChromacastError::EncodingFailure { message } => message,
        other => other.to_string(),
    }
}

/// Append fragments in report order until the encoder confirms or fails.
///
/// A failure stops the session at once and ends the capture loop, whether
/// it came from a frame push or from the encoder's own threads.
async fn collect_fragments(
    mut rx: mpsc::UnboundedReceiver<EncoderEvent>,
    chunks: ChunkLog,
    stop_tx: StopSender,
    state: Arc<Mutex<SessionState>>,
    done: oneshot::Sender<Result<(), String>>,
) {
    let result = loop {
        match rx.recv().await {
            Some(EncoderEvent::Fragment(data)) => {
                let sequence = chunks.append(data);
                tracing::trace!(sequence, "Fragment collected");
            }
            Some(EncoderEvent::Completed) => break Ok(()),
            Some(EncoderEvent::Failed(message)) => break Err(message),
            None => break Err("Encoder closed without confirming completion".to_string()),
        }
    };
    if let Err(message) = &result {
        tracing::warn!(error = %message, "Encoder failed; stopping session");
        set_state(&state, SessionState::Stopped);
        signal_stop(&stop_tx, StopReason::EncoderFailed);
    }
    let _ = done.send(result);
}

/// Feed surface frames to the encoder until stopped, then flush it.
///
/// After each encoded frame the loop waits one frame interval before
/// taking the latest surface frame, so fast presenters are sampled rather
/// than encoded in full.
async fn capture_frames(
    mut encoder: Box<dyn FrameEncoder>,
    events: EncoderEvents,
    mut frames: FrameStream,
    mut stop_rx: watch::Receiver<Option<StopReason>>,
    window: Duration,
    frame_interval: Duration,
    clock: RecordingClock,
    state: Arc<Mutex<SessionState>>,
) -> CaptureReport {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    let mut pushed = 0u64;
    let mut ready_at = Instant::now();

    // A stop requested before the session started still counts.
    let mut reason = *stop_rx.borrow_and_update();
    let initial = frames.borrow_and_update().clone();
    if let (None, Some(frame)) = (reason, initial) {
        match encoder.push_frame(&frame, clock.elapsed()) {
            Ok(()) => {
                pushed += 1;
                ready_at = Instant::now() + frame_interval;
            }
            Err(e) => {
                events.failed(failure_message(e));
                reason = Some(StopReason::EncoderFailed);
            }
        }
    }

    let reason = match reason {
        Some(reason) => reason,
        None => loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    let reason = (*stop_rx.borrow_and_update()).unwrap_or(StopReason::Requested);
                    break reason;
                }
                _ = &mut deadline => break StopReason::WindowElapsed,
                changed = async {
                    tokio::time::sleep_until(ready_at).await;
                    frames.changed().await
                } => {
                    if changed.is_err() {
                        break StopReason::SurfaceClosed;
                    }
                    let frame = frames.borrow_and_update().clone();
                    let Some(frame) = frame else { continue };
                    if let Err(e) = encoder.push_frame(&frame, clock.elapsed()) {
                        events.failed(failure_message(e));
                        break StopReason::EncoderFailed;
                    }
                    pushed += 1;
                    ready_at = Instant::now() + frame_interval;
                }
            }
        },
    };

    if reason == StopReason::EncoderFailed {
        set_state(&state, SessionState::Stopped);
    } else {
        set_state(&state, SessionState::Finalizing);
        if let Err(e) = encoder.finish() {
            events.failed(failure_message(e));
        }
    }
    tracing::debug!(?reason, frames = pushed, "Capture loop ended");

    CaptureReport {
        encoder,
        reason,
        frames: pushed,
    }
}
