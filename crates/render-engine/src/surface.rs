//! Render surface: the presented composite and the origin of the capture
//! stream.
//!
//! The surface keeps only the latest presented frame. Capture readers
//! subscribe to it and see every frame that was current when they were
//! scheduled, the same way a canvas capture stream samples its canvas.
//! At most one capture may be attached at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{Dimensions, Frame};
use tokio::sync::watch;

/// Receiver side of a surface's pixel stream.
pub type FrameStream = watch::Receiver<Option<Arc<Frame>>>;

/// A fixed-size pixel buffer that receives composite frames.
pub struct RenderSurface {
    dims: Dimensions,
    latest: watch::Sender<Option<Arc<Frame>>>,
    frames_presented: AtomicU64,
    capture_claimed: AtomicBool,
}

impl RenderSurface {
    pub fn new(dims: Dimensions) -> Arc<Self> {
        let (latest, _) = watch::channel(None);
        Arc::new(Self {
            dims,
            latest,
            frames_presented: AtomicU64::new(0),
            capture_claimed: AtomicBool::new(false),
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Replace the surface contents.
    pub fn present(&self, frame: Frame) -> ChromacastResult<()> {
        if frame.dimensions() != self.dims {
            return Err(ChromacastError::dimension_mismatch(
                self.dims.as_tuple(),
                frame.dimensions().as_tuple(),
            ));
        }
        self.latest.send_replace(Some(Arc::new(frame)));
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The most recently presented frame, if any.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.latest.borrow().clone()
    }

    /// Subscribe to the pixel stream.
    pub fn subscribe(&self) -> FrameStream {
        self.latest.subscribe()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    /// Reserve the surface for one capture. Returns `None` while another
    /// capture holds it.
    pub fn claim_capture(self: &Arc<Self>) -> Option<CaptureLease> {
        self.capture_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CaptureLease {
                surface: Arc::clone(self),
            })
    }

    /// Whether a capture currently holds the surface.
    pub fn is_capturing(&self) -> bool {
        self.capture_claimed.load(Ordering::Acquire)
    }
}

/// Exclusive capture claim on a surface; released on drop.
pub struct CaptureLease {
    surface: Arc<RenderSurface>,
}

impl CaptureLease {
    pub fn surface(&self) -> &Arc<RenderSurface> {
        &self.surface
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        self.surface.capture_claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromacast_media_model::Rgba;

    #[test]
    fn test_present_updates_latest_and_stream() {
        let dims = Dimensions::new(2, 2);
        let surface = RenderSurface::new(dims);
        let mut stream = surface.subscribe();
        assert!(surface.latest_frame().is_none());

        surface.present(Frame::filled(dims, Rgba::opaque(5, 5, 5))).unwrap();

        assert!(stream.has_changed().unwrap());
        let seen = stream.borrow_and_update().clone().unwrap();
        assert_eq!(seen.pixel(0, 0), Some(Rgba::opaque(5, 5, 5)));
        assert_eq!(surface.frames_presented(), 1);
    }

    #[test]
    fn test_present_rejects_wrong_size() {
        let surface = RenderSurface::new(Dimensions::new(2, 2));
        let err = surface.present(Frame::blank(Dimensions::new(1, 1))).unwrap_err();
        assert!(err.is_tick_local());
        assert_eq!(surface.frames_presented(), 0);
    }

    #[test]
    fn test_single_capture_lease() {
        let surface = RenderSurface::new(Dimensions::new(1, 1));
        let lease = surface.claim_capture().expect("first claim");
        assert!(surface.is_capturing());
        assert!(surface.claim_capture().is_none());

        drop(lease);
        assert!(!surface.is_capturing());
        assert!(surface.claim_capture().is_some());
    }
}
