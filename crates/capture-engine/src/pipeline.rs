//! Encoder pipelines for surface capture.
//!
//! An encoder consumes surface frames and reports its output through an
//! [`EncoderEvents`] handle: zero or more fragments, then exactly one of
//! `completed` or `failed`. Reports may come from any thread; they are
//! funnelled through one ordered channel so the session sees fragments in
//! emission order.

use std::time::Duration;

use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{Dimensions, Frame};
use tokio::sync::mpsc;

/// MIME type of the raw container.
pub const RAW_MIME_TYPE: &str = "video/x-chromacast-raw";

const RAW_MAGIC: &[u8; 4] = b"CKRV";
const RAW_VERSION: u8 = 1;
const RAW_HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// One report from an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    Fragment(Vec<u8>),
    Completed,
    Failed(String),
}

/// Sending side of an encoder's report channel.
#[derive(Debug, Clone)]
pub struct EncoderEvents {
    tx: mpsc::UnboundedSender<EncoderEvent>,
}

impl EncoderEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EncoderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report one encoded fragment.
    pub fn fragment(&self, data: Vec<u8>) {
        self.send(EncoderEvent::Fragment(data));
    }

    /// Confirm that no further fragments will follow.
    pub fn completed(&self) {
        self.send(EncoderEvent::Completed);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.send(EncoderEvent::Failed(message.into()));
    }

    fn send(&self, event: EncoderEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Encoder report dropped; session already finalized");
        }
    }
}

/// Trait for a capture encoder.
///
/// Implementations wrap an in-process muxer or a GStreamer pipeline.
pub trait FrameEncoder: Send {
    /// Encoder name for logging and manifests.
    fn name(&self) -> &str;

    /// MIME type of the concatenated output.
    fn mime_type(&self) -> &str;

    /// Prepare for frames of `dims`. Output is reported through `events`.
    fn begin(&mut self, dims: Dimensions, events: EncoderEvents) -> ChromacastResult<()>;

    /// Encode one frame presented `pts` after capture start.
    fn push_frame(&mut self, frame: &Frame, pts: Duration) -> ChromacastResult<()>;

    /// Flush buffered output. Completion is confirmed through the events
    /// handle, possibly after this returns.
    fn finish(&mut self) -> ChromacastResult<()>;

    /// Runtime statistics.
    fn stats(&self) -> EncoderStats;
}

/// Runtime statistics from an encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// Frames accepted.
    pub frames_encoded: u64,

    /// Fragments reported.
    pub fragments_emitted: u64,

    /// Bytes reported across all fragments.
    pub bytes_emitted: u64,
}

/// Uncompressed in-process container.
///
/// Layout: a header fragment (`CKRV`, version, width, height as LE u32),
/// then frame records of `pts_us: u64 LE` followed by the RGBA payload.
/// Records are batched `frames_per_fragment` at a time.
pub struct RawVideoEncoder {
    frames_per_fragment: u32,
    dims: Option<Dimensions>,
    events: Option<EncoderEvents>,
    pending: Vec<u8>,
    pending_frames: u32,
    stats: EncoderStats,
}

impl RawVideoEncoder {
    pub fn new(frames_per_fragment: u32) -> Self {
        Self {
            frames_per_fragment: frames_per_fragment.max(1),
            dims: None,
            events: None,
            pending: Vec::new(),
            pending_frames: 0,
            stats: EncoderStats::default(),
        }
    }

    fn emit(&mut self, data: Vec<u8>) {
        self.stats.fragments_emitted += 1;
        self.stats.bytes_emitted += data.len() as u64;
        if let Some(events) = &self.events {
            events.fragment(data);
        }
    }

    fn flush_pending(&mut self) {
        if self.pending_frames == 0 {
            return;
        }
        let data = std::mem::take(&mut self.pending);
        self.pending_frames = 0;
        self.emit(data);
    }
}

impl FrameEncoder for RawVideoEncoder {
    fn name(&self) -> &str {
        "raw"
    }

    fn mime_type(&self) -> &str {
        RAW_MIME_TYPE
    }

    fn begin(&mut self, dims: Dimensions, events: EncoderEvents) -> ChromacastResult<()> {
        if self.events.is_some() {
            return Err(ChromacastError::capture("Raw encoder already started"));
        }

        let mut header = Vec::with_capacity(RAW_HEADER_LEN);
        header.extend_from_slice(RAW_MAGIC);
        header.push(RAW_VERSION);
        header.extend_from_slice(&dims.width.to_le_bytes());
        header.extend_from_slice(&dims.height.to_le_bytes());

        self.dims = Some(dims);
        self.events = Some(events);
        self.emit(header);
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame, pts: Duration) -> ChromacastResult<()> {
        let dims = self
            .dims
            .ok_or_else(|| ChromacastError::capture("Raw encoder not started"))?;
        if frame.dimensions() != dims {
            return Err(ChromacastError::dimension_mismatch(
                dims.as_tuple(),
                frame.dimensions().as_tuple(),
            ));
        }

        self.pending
            .extend_from_slice(&(pts.as_micros() as u64).to_le_bytes());
        self.pending.extend_from_slice(frame.as_bytes());
        self.pending_frames += 1;
        self.stats.frames_encoded += 1;

        if self.pending_frames >= self.frames_per_fragment {
            self.flush_pending();
        }
        Ok(())
    }

    fn finish(&mut self) -> ChromacastResult<()> {
        self.flush_pending();
        let events = self
            .events
            .take()
            .ok_or_else(|| ChromacastError::capture("Raw encoder not started"))?;
        events.completed();
        Ok(())
    }

    fn stats(&self) -> EncoderStats {
        self.stats
    }
}

/// Decoded contents of a raw container.
#[derive(Debug, Clone)]
pub struct RawStream {
    pub dimensions: Dimensions,
    pub frames: Vec<(Duration, Frame)>,
}

/// Parse a raw container back into timestamped frames.
pub fn parse_raw_stream(bytes: &[u8]) -> ChromacastResult<RawStream> {
    if bytes.len() < RAW_HEADER_LEN || &bytes[..4] != RAW_MAGIC {
        return Err(ChromacastError::export("Not a raw chromacast stream"));
    }
    if bytes[4] != RAW_VERSION {
        return Err(ChromacastError::export(format!(
            "Unsupported raw stream version {}",
            bytes[4]
        )));
    }

    let width = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let height = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
    let dimensions = Dimensions::new(width, height);
    let record_len = 8 + dimensions.byte_len();

    let body = &bytes[RAW_HEADER_LEN..];
    if body.len() % record_len != 0 {
        return Err(ChromacastError::export(format!(
            "Truncated raw stream: {} trailing bytes",
            body.len() % record_len
        )));
    }

    let mut frames = Vec::with_capacity(body.len() / record_len);
    for record in body.chunks_exact(record_len) {
        let mut pts = [0u8; 8];
        pts.copy_from_slice(&record[..8]);
        let frame = Frame::from_rgba(dimensions, record[8..].to_vec())?;
        frames.push((Duration::from_micros(u64::from_le_bytes(pts)), frame));
    }

    Ok(RawStream { dimensions, frames })
}
