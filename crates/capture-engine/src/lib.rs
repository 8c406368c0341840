//! Chromacast Capture Engine
//!
//! Records the composite render surface into a single export artifact.
//! A [`KeyingStudio`] owns the sources and the surface; each trigger starts
//! one frame pump and one [`RecordingSession`], which feeds surface frames
//! to a [`FrameEncoder`] and collects its fragments in order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                KeyingStudio                  │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────────┐ │
//! │  │ FrameSrc │ │ FrameSrc │ │  FramePump   │ │
//! │  │   (fg)   │ │   (bg)   │ │ → Surface    │ │
//! │  └─────┬────┘ └─────┬────┘ └──────┬───────┘ │
//! │        └──────┬─────┘             │          │
//! │               ▼                   ▼          │
//! │  ┌─────────────────────────────────────────┐ │
//! │  │ RecordingSession → FrameEncoder         │ │
//! │  │   fragments → ChunkLog → ExportArtifact │ │
//! │  └─────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────┘
//! ```

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod pipeline;
pub mod session;
pub mod studio;

use chromacast_common::config::{CaptureDefaults, EncoderKind, PlaybackConfig};
use chromacast_common::error::ChromacastResult;

pub use pipeline::*;
pub use session::*;
pub use studio::*;

/// Encoder kinds compiled into this build.
pub fn available_encoders() -> Vec<EncoderKind> {
    #[cfg_attr(not(feature = "gstreamer"), allow(unused_mut))]
    let mut kinds = vec![EncoderKind::Raw];
    #[cfg(feature = "gstreamer")]
    {
        if gst::GstWebmEncoder::is_available() {
            kinds.push(EncoderKind::Gstreamer);
        }
    }
    kinds
}

/// Build an encoder factory for the configured encoder kind.
pub fn encoder_factory(
    kind: EncoderKind,
    capture: &CaptureDefaults,
    playback: &PlaybackConfig,
) -> ChromacastResult<EncoderFactory> {
    match kind {
        EncoderKind::Raw => {
            let frames_per_fragment = capture.frames_per_fragment;
            Ok(std::sync::Arc::new(move || {
                Box::new(RawVideoEncoder::new(frames_per_fragment)) as Box<dyn FrameEncoder>
            }))
        }
        #[cfg(feature = "gstreamer")]
        EncoderKind::Gstreamer => {
            let (frame_rate, bitrate_kbps) = (playback.frame_rate, capture.bitrate_kbps);
            Ok(std::sync::Arc::new(move || {
                Box::new(gst::GstWebmEncoder::new(frame_rate, bitrate_kbps)) as Box<dyn FrameEncoder>
            }))
        }
        #[cfg(not(feature = "gstreamer"))]
        EncoderKind::Gstreamer => {
            let _ = playback;
            Err(chromacast_common::error::ChromacastError::config(
                "GStreamer encoder requested but chromacast was built without the `gstreamer` feature",
            ))
        }
    }
}
