//! The frame pump: a cooperative, self-rescheduling compositing loop.
//!
//! Each tick samples both sources, composites, and presents the result.
//! Between ticks the loop yields back to the runtime so capture timers and
//! encoder tasks can run. There is no frame clock; the pump runs as fast
//! as the scheduler lets it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chromacast_frame_source::FrameSource;
use chromacast_media_model::ChromaKeyRule;

use crate::compositor::composite;
use crate::surface::RenderSurface;

/// Result of a single pump tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A composite frame was presented.
    Rendered,
    /// The tick failed locally and was dropped.
    Skipped,
    /// The foreground stopped or the pump was cancelled; nothing rendered.
    Finished,
}

/// Counters reported when the pump exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub ticks: u64,
    pub rendered: u64,
    pub skipped: u64,
}

/// Cloneable cancellation handle for a running pump.
#[derive(Debug, Clone)]
pub struct PumpHandle {
    stop_flag: Arc<AtomicBool>,
}

impl PumpHandle {
    /// Ask the pump to stop at its next tick.
    pub fn cancel(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}

/// Drives compositing from two sources onto a surface.
pub struct FramePump {
    foreground: Arc<dyn FrameSource>,
    background: Arc<dyn FrameSource>,
    surface: Arc<RenderSurface>,
    rule: ChromaKeyRule,
    stop_flag: Arc<AtomicBool>,
    stats: PumpStats,
}

impl FramePump {
    pub fn new(
        foreground: Arc<dyn FrameSource>,
        background: Arc<dyn FrameSource>,
        surface: Arc<RenderSurface>,
    ) -> Self {
        Self {
            foreground,
            background,
            surface,
            rule: ChromaKeyRule::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            stats: PumpStats::default(),
        }
    }

    /// Handle for cancelling the pump from elsewhere.
    pub fn handle(&self) -> PumpHandle {
        PumpHandle {
            stop_flag: Arc::clone(&self.stop_flag),
        }
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Run one iteration.
    ///
    /// Only the foreground's activity decides whether the pump keeps going;
    /// a stalled or ended background keeps contributing its last frame.
    pub fn tick(&mut self) -> TickOutcome {
        if self.stop_flag.load(Ordering::SeqCst) || !self.foreground.is_active() {
            return TickOutcome::Finished;
        }

        self.stats.ticks += 1;
        let fg = self.foreground.current_frame();
        let bg = self.background.current_frame();

        let presented = composite(&fg, &bg, &self.rule).and_then(|frame| self.surface.present(frame));
        match presented {
            Ok(()) => {
                self.stats.rendered += 1;
                TickOutcome::Rendered
            }
            Err(e) => {
                self.stats.skipped += 1;
                if self.stats.skipped == 1 {
                    tracing::warn!(error = %e, "Skipping pump tick");
                } else {
                    tracing::debug!(error = %e, skipped = self.stats.skipped, "Skipping pump tick");
                }
                TickOutcome::Skipped
            }
        }
    }

    /// Tick until the foreground goes inactive or the pump is cancelled,
    /// yielding to the runtime after every tick.
    ///
    /// The loop is unclocked: while the foreground stays active it keeps
    /// re-compositing the latest frames even when neither source has
    /// decoded anything new, so it occupies one worker thread fully.
    pub async fn run(mut self) -> PumpStats {
        tracing::info!(surface = %self.surface.dimensions(), "Frame pump started");

        while self.tick() != TickOutcome::Finished {
            tokio::task::yield_now().await;
        }

        tracing::info!(
            ticks = self.stats.ticks,
            rendered = self.stats.rendered,
            skipped = self.stats.skipped,
            "Frame pump stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromacast_common::config::PlaybackConfig;
    use chromacast_frame_source::LiveFrameSource;
    use chromacast_media_model::{Dimensions, Frame, Rgba};

    fn source(dims: Dimensions, color: Option<Rgba>) -> Arc<LiveFrameSource> {
        let source = LiveFrameSource::new(
            "test",
            PlaybackConfig {
                width: dims.width,
                height: dims.height,
                ..PlaybackConfig::default()
            },
        );
        if let Some(color) = color {
            source.publish(Frame::filled(dims, color)).unwrap();
        }
        source
    }

    #[test]
    fn test_tick_presents_composite() {
        let dims = Dimensions::new(2, 1);
        let fg = source(dims, Some(Rgba::new(20, 175, 0, 77)));
        let bg = source(dims, Some(Rgba::opaque(200, 50, 10)));
        let surface = RenderSurface::new(dims);
        let mut pump = FramePump::new(fg, bg, Arc::clone(&surface));

        assert_eq!(pump.tick(), TickOutcome::Rendered);
        let frame = surface.latest_frame().unwrap();
        assert_eq!(frame.pixel(1, 0), Some(Rgba::new(200, 50, 10, 77)));
    }

    #[test]
    fn test_tick_before_decode_uses_blank_frames() {
        let dims = Dimensions::new(2, 2);
        let surface = RenderSurface::new(dims);
        let mut pump = FramePump::new(source(dims, None), source(dims, None), Arc::clone(&surface));

        assert_eq!(pump.tick(), TickOutcome::Rendered);
        assert!(surface.latest_frame().unwrap().is_blank());
    }

    #[test]
    fn test_mismatched_tick_is_skipped_and_pump_continues() {
        let fg = source(Dimensions::new(4, 4), Some(Rgba::opaque(1, 1, 1)));
        let bg = source(Dimensions::new(2, 2), Some(Rgba::opaque(2, 2, 2)));
        let surface = RenderSurface::new(Dimensions::new(4, 4));
        let mut pump = FramePump::new(fg.clone(), bg, Arc::clone(&surface));

        assert_eq!(pump.tick(), TickOutcome::Skipped);
        assert_eq!(pump.tick(), TickOutcome::Skipped);
        assert!(surface.latest_frame().is_none());
        assert_eq!(pump.stats().skipped, 2);

        fg.end();
        assert_eq!(pump.tick(), TickOutcome::Finished);
    }

    #[test]
    fn test_background_end_does_not_stop_pump() {
        let dims = Dimensions::new(1, 1);
        let fg = source(dims, Some(Rgba::opaque(0, 0, 0)));
        let bg = source(dims, Some(Rgba::opaque(9, 9, 9)));
        let surface = RenderSurface::new(dims);
        let mut pump = FramePump::new(fg.clone(), bg.clone(), surface);

        bg.end();
        assert_eq!(pump.tick(), TickOutcome::Rendered);
        fg.pause();
        assert_eq!(pump.tick(), TickOutcome::Finished);
    }

    #[test]
    fn test_cancel_is_checked_at_tick_entry() {
        let dims = Dimensions::new(1, 1);
        let surface = RenderSurface::new(dims);
        let mut pump = FramePump::new(
            source(dims, Some(Rgba::opaque(0, 0, 0))),
            source(dims, None),
            Arc::clone(&surface),
        );
        let handle = pump.handle();

        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(pump.tick(), TickOutcome::Finished);
        assert_eq!(surface.frames_presented(), 0);
    }

    #[tokio::test]
    async fn test_run_exits_when_foreground_ends() {
        let dims = Dimensions::new(2, 2);
        let fg = source(dims, Some(Rgba::opaque(0, 175, 0)));
        let bg = source(dims, Some(Rgba::opaque(1, 2, 3)));
        let surface = RenderSurface::new(dims);
        let pump = FramePump::new(fg.clone(), bg, Arc::clone(&surface));

        let task = tokio::spawn(pump.run());
        while surface.frames_presented() < 5 {
            tokio::task::yield_now().await;
        }
        fg.end();

        let stats = task.await.unwrap();
        assert!(stats.rendered >= 5);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.ticks, stats.rendered);
    }
}
