//! VP8/WebM encoder built on a GStreamer appsrc/appsink pipeline.
//!
//! ```text
//! appsrc (RGBA) ! videoconvert ! vp8enc ! webmmux ! appsink
//! ```
//!
//! Every appsink sample becomes one fragment. Completion is confirmed by
//! the EOS message on the pipeline bus, watched from a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{Dimensions, Frame};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks, AppSrc};

use crate::pipeline::{EncoderEvents, EncoderStats, FrameEncoder};

pub const WEBM_MIME_TYPE: &str = "video/webm";

struct Running {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    shutdown: Arc<AtomicBool>,
    bus_watch: Option<JoinHandle<()>>,
}

pub struct GstWebmEncoder {
    frame_rate: u32,
    bitrate_kbps: u32,
    running: Option<Running>,
    stats: EncoderStats,
}

impl GstWebmEncoder {
    pub fn new(frame_rate: u32, bitrate_kbps: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            bitrate_kbps: bitrate_kbps.max(1),
            running: None,
            stats: EncoderStats::default(),
        }
    }

    /// Whether the GStreamer elements this encoder needs are installed.
    pub fn is_available() -> bool {
        if init_gstreamer().is_err() {
            return false;
        }
        ["appsrc", "videoconvert", "vp8enc", "webmmux", "appsink"]
            .iter()
            .all(|name| gst::ElementFactory::find(name).is_some())
    }

    fn launch_description(&self, dims: Dimensions) -> String {
        format!(
            "appsrc name=src is-live=true format=time \
                 caps=\"video/x-raw,format=RGBA,width={w},height={h},framerate={fps}/1\" \
             ! videoconvert \
             ! vp8enc deadline=1 target-bitrate={bitrate} \
             ! webmmux streamable=true \
             ! appsink name=sink sync=false emit-signals=false",
            w = dims.width,
            h = dims.height,
            fps = self.frame_rate,
            bitrate = u64::from(self.bitrate_kbps) * 1000,
        )
    }
}

impl FrameEncoder for GstWebmEncoder {
    fn name(&self) -> &str {
        "gstreamer-webm"
    }

    fn mime_type(&self) -> &str {
        WEBM_MIME_TYPE
    }

    fn begin(&mut self, dims: Dimensions, events: EncoderEvents) -> ChromacastResult<()> {
        if self.running.is_some() {
            return Err(ChromacastError::capture("WebM encoder already started"));
        }
        init_gstreamer()?;

        let desc = self.launch_description(dims);
        tracing::debug!(pipeline = %desc, "Building WebM encoder pipeline");

        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| ChromacastError::capture(format!("Failed to build pipeline: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| ChromacastError::capture("Launch string did not produce a pipeline"))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| ChromacastError::capture("Pipeline has no appsrc named 'src'"))?
            .dynamic_cast::<AppSrc>()
            .map_err(|_| ChromacastError::capture("Element 'src' is not an appsrc"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| ChromacastError::capture("Pipeline has no appsink named 'sink'"))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| ChromacastError::capture("Element 'sink' is not an appsink"))?;

        let sample_events = events.clone();
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    sample_events.fragment(map.as_slice().to_vec());
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| ChromacastError::capture("Pipeline has no bus"))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(ChromacastError::capture(format!(
                "Failed to start WebM pipeline: {e:?}"
            )));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let bus_watch = match spawn_bus_watch(bus, events, Arc::clone(&shutdown)) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = pipeline.set_state(gst::State::Null);
                return Err(e);
            }
        };

        self.running = Some(Running {
            pipeline,
            appsrc,
            shutdown,
            bus_watch: Some(bus_watch),
        });
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame, pts: Duration) -> ChromacastResult<()> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| ChromacastError::capture("WebM encoder not started"))?;

        let mut buffer = gst::Buffer::from_mut_slice(frame.as_bytes().to_vec());
        buffer
            .make_mut()
            .set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));

        running
            .appsrc
            .push_buffer(buffer)
            .map_err(|e| ChromacastError::encoding(format!("appsrc rejected frame: {e:?}")))?;
        self.stats.frames_encoded += 1;
        Ok(())
    }

    fn finish(&mut self) -> ChromacastResult<()> {
        let running = self
            .running
            .as_mut()
            .ok_or_else(|| ChromacastError::capture("WebM encoder not started"))?;

        // EOS flushes vp8enc and webmmux; the bus thread reports completion.
        running
            .appsrc
            .end_of_stream()
            .map_err(|e| ChromacastError::encoding(format!("Failed to send EOS: {e:?}")))?;
        Ok(())
    }

    fn stats(&self) -> EncoderStats {
        self.stats
    }
}

impl Drop for GstWebmEncoder {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.shutdown.store(true, Ordering::SeqCst);
            if let Err(e) = running.pipeline.set_state(gst::State::Null) {
                tracing::warn!(error = ?e, "Failed to shut down WebM pipeline");
            }
            if let Some(handle) = running.bus_watch.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Start the bus thread. It exits on EOS, on error, or once `shutdown`
/// is set.
fn spawn_bus_watch(
    bus: gst::Bus,
    events: EncoderEvents,
    shutdown: Arc<AtomicBool>,
) -> ChromacastResult<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("chromacast-gst-bus".to_string())
        .spawn(move || watch_bus(bus, events, shutdown))?;
    Ok(handle)
}

/// Forward the terminal bus message to the session.
fn watch_bus(bus: gst::Bus, events: EncoderEvents, shutdown: Arc<AtomicBool>) {
    let poll = gst::ClockTime::from_mseconds(100);
    while !shutdown.load(Ordering::SeqCst) {
        let Some(msg) = bus.timed_pop(poll) else {
            continue;
        };
        match msg.view() {
            gst::MessageView::Eos(_) => {
                tracing::debug!("EOS received; WebM pipeline drained");
                events.completed();
                return;
            }
            gst::MessageView::Error(e) => {
                tracing::warn!(error = %e.error(), "WebM pipeline error");
                events.failed(e.error().to_string());
                return;
            }
            _ => {}
        }
    }
}

fn init_gstreamer() -> ChromacastResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(ChromacastError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}
