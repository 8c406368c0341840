//! The keying studio: owns the two sources and the render surface, and
//! turns a single trigger into one pump plus one recording session.

use std::sync::Arc;
use std::time::Duration;

use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_frame_source::FrameSource;
use chromacast_media_model::{ArtifactManifest, ExportArtifact};
use chromacast_render_engine::{FramePump, PumpHandle, PumpStats, RenderSurface};
use tokio::task::JoinHandle;

use crate::pipeline::FrameEncoder;
use crate::session::{RecordingSession, SessionState, StopHandle, DEFAULT_CAPTURE_FPS};

/// Builds a fresh encoder for each capture.
pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn FrameEncoder> + Send + Sync>;

/// Result of [`KeyingStudio::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new pump and session were started.
    Started,
    /// A capture is already live; nothing changed.
    AlreadyRunning,
}

/// Everything a finished capture produced.
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    pub artifact: ExportArtifact,
    pub manifest: ArtifactManifest,
    pub pump: PumpStats,
}

struct ActiveCapture {
    session: RecordingSession,
    pump: PumpHandle,
    pump_task: JoinHandle<PumpStats>,
}

pub struct KeyingStudio {
    foreground: Arc<dyn FrameSource>,
    background: Arc<dyn FrameSource>,
    surface: Arc<RenderSurface>,
    window: Duration,
    capture_fps: u32,
    encoder_factory: EncoderFactory,
    active: Option<ActiveCapture>,
    captures_completed: u64,
    last_partial: Option<ExportArtifact>,
}

impl KeyingStudio {
    /// The surface takes the foreground's dimensions.
    pub fn new(
        foreground: Arc<dyn FrameSource>,
        background: Arc<dyn FrameSource>,
        window: Duration,
        encoder_factory: EncoderFactory,
    ) -> Self {
        let dims = foreground.dimensions();
        if background.dimensions() != dims {
            tracing::warn!(
                foreground = %dims,
                background = %background.dimensions(),
                "Source dimensions differ; every tick will be skipped"
            );
        }

        Self {
            foreground,
            background,
            surface: RenderSurface::new(dims),
            window,
            capture_fps: DEFAULT_CAPTURE_FPS,
            encoder_factory,
            active: None,
            captures_completed: 0,
            last_partial: None,
        }
    }

    /// Rate at which each capture samples the surface (default
    /// [`DEFAULT_CAPTURE_FPS`]).
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.capture_fps = fps;
        self
    }

    /// The surface the pump renders into.
    pub fn surface(&self) -> &Arc<RenderSurface> {
        &self.surface
    }

    /// Capture window applied to every trigger.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a capture is live.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// State of the live session, if any.
    pub fn session_state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|active| active.session.state())
    }

    /// Stop handle for the live session, if any.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.active.as_ref().map(|active| active.session.stop_handle())
    }

    /// Number of captures that produced an artifact.
    pub fn captures_completed(&self) -> u64 {
        self.captures_completed
    }

    /// Partial artifact left by the last capture that failed to encode.
    pub fn take_partial(&mut self) -> Option<ExportArtifact> {
        self.last_partial.take()
    }

    /// Start compositing and recording.
    ///
    /// A trigger while a capture is live is ignored.
    pub fn trigger(&mut self) -> ChromacastResult<TriggerOutcome> {
        if let Some(active) = &self.active {
            tracing::warn!(state = ?active.session.state(), "Capture already running; trigger ignored");
            return Ok(TriggerOutcome::AlreadyRunning);
        }

        let mut session =
            RecordingSession::new((self.encoder_factory)()).with_frame_rate(self.capture_fps);
        match session.start(&self.surface, self.window) {
            Ok(()) => {}
            Err(ChromacastError::AlreadyRecording) => {
                tracing::warn!("Surface already captured elsewhere; trigger ignored");
                return Ok(TriggerOutcome::AlreadyRunning);
            }
            Err(e) => return Err(e),
        }

        let pump = FramePump::new(
            Arc::clone(&self.foreground),
            Arc::clone(&self.background),
            Arc::clone(&self.surface),
        );
        let handle = pump.handle();
        let pump_task = tokio::spawn(pump.run());

        self.active = Some(ActiveCapture {
            session,
            pump: handle,
            pump_task,
        });
        tracing::info!(window_secs = self.window.as_secs_f64(), "Capture triggered");
        Ok(TriggerOutcome::Started)
    }

    /// Stop the live capture now.
    pub async fn stop(&mut self) -> ChromacastResult<CaptureOutput> {
        self.complete(true).await
    }

    /// Wait for the live capture's window to elapse (or its stop handle).
    pub async fn finish(&mut self) -> ChromacastResult<CaptureOutput> {
        self.complete(false).await
    }

    async fn complete(&mut self, stop_now: bool) -> ChromacastResult<CaptureOutput> {
        let mut active = self
            .active
            .take()
            .ok_or_else(|| ChromacastError::capture("No capture running"))?;

        let result = if stop_now {
            active.session.stop().await
        } else {
            active.session.finish().await
        };

        // The session result is final here; a broken pump only costs its stats.
        active.pump.cancel();
        let pump = match active.pump_task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Frame pump task failed");
                PumpStats::default()
            }
        };

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => {
                self.last_partial = active.session.partial_artifact().cloned();
                return Err(e);
            }
        };
        let manifest = active
            .session
            .manifest(&artifact)
            .ok_or_else(|| ChromacastError::capture("Finalized session has no manifest"))?;

        self.captures_completed += 1;
        tracing::info!(
            bytes = artifact.len(),
            fragments = artifact.fragment_count(),
            rendered = pump.rendered,
            "Capture complete"
        );
        Ok(CaptureOutput {
            artifact,
            manifest,
            pump,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{parse_raw_stream, RawVideoEncoder};
    use chromacast_common::config::PlaybackConfig;
    use chromacast_frame_source::LiveFrameSource;
    use chromacast_media_model::{Dimensions, Frame, Rgba, StopReason};

    fn source(dims: Dimensions, color: Rgba) -> Arc<LiveFrameSource> {
        let source = LiveFrameSource::new(
            "studio-test",
            PlaybackConfig {
                width: dims.width,
                height: dims.height,
                ..PlaybackConfig::default()
            },
        );
        source.publish(Frame::filled(dims, color)).unwrap();
        source
    }

    fn raw_factory() -> EncoderFactory {
        Arc::new(|| Box::new(RawVideoEncoder::new(8)) as Box<dyn FrameEncoder>)
    }

    #[tokio::test]
    async fn test_double_trigger_yields_one_artifact() {
        let dims = Dimensions::new(2, 2);
        let fg = source(dims, Rgba::new(20, 175, 0, 90));
        let bg = source(dims, Rgba::opaque(200, 50, 10));
        let mut studio = KeyingStudio::new(fg, bg, Duration::from_millis(150), raw_factory());

        assert_eq!(studio.trigger().unwrap(), TriggerOutcome::Started);
        assert_eq!(studio.trigger().unwrap(), TriggerOutcome::AlreadyRunning);
        assert!(studio.surface().is_capturing());
        assert_eq!(studio.session_state(), Some(SessionState::Recording));

        let output = studio.finish().await.unwrap();
        assert!(output.artifact.is_complete());
        assert_eq!(output.manifest.stop_reason, StopReason::WindowElapsed);
        assert!(output.pump.rendered >= 1);

        let stream = parse_raw_stream(output.artifact.bytes()).unwrap();
        assert!(!stream.frames.is_empty());
        for (_, frame) in &stream.frames {
            assert!(frame.pixels().all(|px| px == Rgba::new(200, 50, 10, 90)));
        }

        assert!(studio.finish().await.is_err());
        assert_eq!(studio.captures_completed(), 1);
        assert!(!studio.is_running());
        assert!(!studio.surface().is_capturing());
    }

    #[tokio::test]
    async fn test_retrigger_after_stop_starts_fresh_session() {
        let dims = Dimensions::new(1, 1);
        let fg = source(dims, Rgba::opaque(90, 90, 90));
        let bg = source(dims, Rgba::opaque(1, 1, 1));
        let mut studio = KeyingStudio::new(fg, bg, Duration::from_secs(16), raw_factory());

        studio.trigger().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = studio.stop().await.unwrap();
        assert_eq!(first.manifest.stop_reason, StopReason::Requested);

        assert_eq!(studio.trigger().unwrap(), TriggerOutcome::Started);
        let second = studio.stop().await.unwrap();
        assert_eq!(studio.captures_completed(), 2);
        assert!(second.artifact.is_complete());
    }

    #[tokio::test]
    async fn test_foreground_end_stops_pump_not_session() {
        let dims = Dimensions::new(1, 1);
        let fg = source(dims, Rgba::opaque(3, 3, 3));
        let bg = source(dims, Rgba::opaque(4, 4, 4));
        let mut studio = KeyingStudio::new(fg.clone(), bg, Duration::from_millis(100), raw_factory());

        studio.trigger().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        fg.end();

        let output = studio.finish().await.unwrap();
        assert_eq!(output.manifest.stop_reason, StopReason::WindowElapsed);
        assert!(output.manifest.duration_secs >= 0.1);
    }

    /// A foreground whose decoder state is unreadable.
    struct BrokenSource {
        dims: Dimensions,
    }

    impl FrameSource for BrokenSource {
        fn current_frame(&self) -> Arc<Frame> {
            panic!("decoder state poisoned");
        }

        fn is_active(&self) -> bool {
            true
        }

        fn dimensions(&self) -> Dimensions {
            self.dims
        }
    }

    #[tokio::test]
    async fn test_pump_failure_keeps_finished_artifact() {
        let dims = Dimensions::new(1, 1);
        let mut studio = KeyingStudio::new(
            Arc::new(BrokenSource { dims }),
            source(dims, Rgba::opaque(0, 0, 0)),
            Duration::from_millis(50),
            raw_factory(),
        );

        studio.trigger().unwrap();
        let output = studio.finish().await.unwrap();
        assert!(output.artifact.is_complete());
        assert_eq!(output.manifest.stop_reason, StopReason::WindowElapsed);
        assert_eq!(output.pump, PumpStats::default());
        assert_eq!(studio.captures_completed(), 1);
        assert!(!studio.is_running());
    }

    #[tokio::test]
    async fn test_stop_handle_from_studio() {
        let dims = Dimensions::new(1, 1);
        let mut studio = KeyingStudio::new(
            source(dims, Rgba::opaque(0, 0, 0)),
            source(dims, Rgba::opaque(0, 0, 0)),
            Duration::from_secs(16),
            raw_factory(),
        );
        assert!(studio.stop_handle().is_none());

        studio.trigger().unwrap();
        let handle = studio.stop_handle().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.request_stop();
        });

        let output = studio.finish().await.unwrap();
        assert_eq!(output.manifest.stop_reason, StopReason::Requested);
    }
}
