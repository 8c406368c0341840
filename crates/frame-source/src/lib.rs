//! Chromacast Frame Sources
//!
//! A frame source wraps one playable timeline and exposes the most recently
//! decoded frame on demand. Decoding runs on its own playback task, driven
//! by a pluggable decoder backend:
//!
//! - **Image sequence:** a directory of still frames (the CLI default)
//! - **Solid color:** synthetic timelines for checks and tests
//! - **Stub:** pre-built frames for tests
//!
//! Readers never wait on the decoder. Before the first decode a source
//! returns a zeroed frame of its configured size.

pub mod backends;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chromacast_common::config::{PlaybackConfig, SourceEntry};
use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{Dimensions, Frame};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backends::FrameDecoder;

/// Read side of a playable timeline.
pub trait FrameSource: Send + Sync {
    /// The most recently decoded frame, or a zeroed frame before the first
    /// decode.
    fn current_frame(&self) -> Arc<Frame>;

    /// Whether the timeline is still advancing (not paused, not ended).
    fn is_active(&self) -> bool;

    /// Size of every frame this source hands out.
    fn dimensions(&self) -> Dimensions;
}

/// Playback state of a live source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    Ended,
}

/// A frame source fed by a playback task.
pub struct LiveFrameSource {
    name: String,
    config: PlaybackConfig,
    sentinel: Arc<Frame>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    state: watch::Sender<PlaybackState>,
    frames_decoded: AtomicU64,
}

impl LiveFrameSource {
    /// Create a source. Playback starts immediately when `autoplay` is set.
    pub fn new(name: impl Into<String>, config: PlaybackConfig) -> Arc<Self> {
        let dims = Dimensions::new(config.width, config.height);
        let initial = if config.autoplay {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        let (frames, _) = watch::channel(None);
        let (state, _) = watch::channel(initial);

        Arc::new(Self {
            name: name.into(),
            config,
            sentinel: Arc::new(Frame::blank(dims)),
            frames,
            state,
            frames_decoded: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Replace the current frame. Rejects frames of the wrong size.
    pub fn publish(&self, frame: Frame) -> ChromacastResult<()> {
        let dims = self.dimensions();
        if frame.dimensions() != dims {
            return Err(ChromacastError::dimension_mismatch(
                dims.as_tuple(),
                frame.dimensions().as_tuple(),
            ));
        }
        self.frames.send_replace(Some(Arc::new(frame)));
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn play(&self) {
        self.transition(PlaybackState::Playing);
    }

    pub fn pause(&self) {
        self.transition(PlaybackState::Paused);
    }

    /// Mark the timeline finished. Ended is terminal.
    pub fn end(&self) {
        self.state.send_replace(PlaybackState::Ended);
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Watch playback state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    /// Whether at least one frame has been decoded.
    pub fn is_ready(&self) -> bool {
        self.frames.borrow().is_some()
    }

    /// Number of frames published so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    fn transition(&self, next: PlaybackState) {
        self.state.send_if_modified(|state| {
            if *state == PlaybackState::Ended || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

impl FrameSource for LiveFrameSource {
    fn current_frame(&self) -> Arc<Frame> {
        match self.frames.borrow().as_ref() {
            Some(frame) => Arc::clone(frame),
            None => Arc::clone(&self.sentinel),
        }
    }

    fn is_active(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.config.width, self.config.height)
    }
}

/// Drive `decoder` into `source` at the configured frame rate.
///
/// The task ends when the source is ended, or when the timeline runs out
/// and looping is off. Returns the number of frames published.
pub fn spawn_playback(
    source: Arc<LiveFrameSource>,
    mut decoder: Box<dyn FrameDecoder>,
) -> JoinHandle<ChromacastResult<u64>> {
    tokio::spawn(async move {
        let mut state_rx = source.subscribe_state();
        let mut ticker = tokio::time::interval(source.config().frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            source = %source.name(),
            backend = %decoder.name(),
            looping = source.config().loop_playback,
            muted = source.config().muted,
            "Playback started"
        );

        let mut published = 0u64;
        let mut since_rewind = 0u64;

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                PlaybackState::Ended => break,
                PlaybackState::Paused => {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                PlaybackState::Playing => {}
            }

            ticker.tick().await;

            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = source.publish(frame) {
                        tracing::warn!(source = %source.name(), error = %e, "Decoded frame rejected");
                        source.end();
                        break;
                    }
                    published += 1;
                    since_rewind += 1;
                }
                Ok(None) if source.config().loop_playback && since_rewind > 0 => {
                    if let Err(e) = decoder.rewind() {
                        tracing::warn!(source = %source.name(), error = %e, "Rewind failed; ending timeline");
                        source.end();
                        break;
                    }
                    tracing::debug!(source = %source.name(), "Timeline looped");
                    since_rewind = 0;
                }
                Ok(None) => {
                    tracing::info!(source = %source.name(), "Timeline ended");
                    source.end();
                    break;
                }
                Err(e) => {
                    tracing::warn!(source = %source.name(), error = %e, "Decoder error; ending timeline");
                    source.end();
                    break;
                }
            }
        }

        tracing::info!(source = %source.name(), frames = published, "Playback stopped");
        Ok(published)
    })
}

/// Open a configured timeline and start playing it.
pub fn open_source(
    name: &str,
    entry: &SourceEntry,
) -> ChromacastResult<(Arc<LiveFrameSource>, JoinHandle<ChromacastResult<u64>>)> {
    let decoder = backends::open_decoder(entry)?;
    let source = LiveFrameSource::new(name, entry.playback);
    let task = spawn_playback(Arc::clone(&source), decoder);
    Ok((source, task))
}
