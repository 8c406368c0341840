//! Composite two timelines and record the surface.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chromacast_capture_engine::{encoder_factory, KeyingStudio};
use chromacast_common::config::{AppConfig, EncoderKind};
use chromacast_frame_source::open_source;
use chromacast_media_model::ExportArtifact;
use chromacast_render_engine::{ExportPipeline, FileDropUploader};

/// Command-line overrides for the configured defaults.
pub struct RecordArgs {
    pub foreground: Option<PathBuf>,
    pub background: Option<PathBuf>,
    pub window_secs: Option<u64>,
    pub output: Option<PathBuf>,
    pub encoder: Option<EncoderKind>,
    pub transport_text: bool,
}

pub async fn run(mut config: AppConfig, args: RecordArgs) -> anyhow::Result<()> {
    if let Some(path) = args.foreground {
        config.sources.foreground.uri = path;
    }
    if let Some(path) = args.background {
        config.sources.background.uri = path;
    }
    if let Some(secs) = args.window_secs {
        config.capture.window_secs = secs;
    }
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    if let Some(kind) = args.encoder {
        config.capture.encoder = kind;
    }

    println!("Starting keyed capture");
    println!("  Foreground: {}", config.sources.foreground.uri.display());
    println!("  Background: {}", config.sources.background.uri.display());
    println!("  Window: {}s", config.capture.window_secs);
    println!("  Encoder: {:?}", config.capture.encoder);
    println!("  Output: {}", config.output_dir.display());
    println!();

    let factory = encoder_factory(
        config.capture.encoder,
        &config.capture,
        &config.sources.foreground.playback,
    )?;
    let (fg, fg_task) = open_source("foreground", &config.sources.foreground)?;
    let (bg, bg_task) = open_source("background", &config.sources.background)?;

    let mut studio = KeyingStudio::new(fg.clone(), bg.clone(), config.capture.window(), factory)
        .with_frame_rate(config.sources.foreground.playback.frame_rate);
    studio.trigger()?;
    let stop = studio
        .stop_handle()
        .context("Capture did not start")?;

    println!("Recording... press Ctrl+C to stop early");
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.request_stop();
        }
    });

    let result = studio.finish().await;
    ctrl_c.abort();

    fg.end();
    bg.end();
    for (name, task) in [("foreground", fg_task), ("background", bg_task)] {
        match task.await {
            Ok(Ok(frames)) => tracing::debug!(source = name, frames, "Playback task joined"),
            Ok(Err(e)) => tracing::warn!(source = name, error = %e, "Playback task failed"),
            Err(e) => tracing::warn!(source = name, error = %e, "Playback task panicked"),
        }
    }

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            if let Some(partial) = studio.take_partial() {
                let path = write_artifact(&config.output_dir, "artifact.partial", &partial)?;
                println!("Partial recording saved to: {}", path.display());
            }
            return Err(e.into());
        }
    };

    let artifact_path = write_artifact(&config.output_dir, "artifact", &output.artifact)?;
    let mut manifest = output.manifest;

    if args.transport_text {
        let uploader = FileDropUploader::new(config.output_dir.join("artifact.dataurl"));
        let mut pipeline = ExportPipeline::new(Box::new(uploader));
        let (_, receipt) = pipeline.publish(output.artifact).await?;
        manifest.reference = Some(receipt.reference);
    }

    let manifest_path = config.output_dir.join("artifact.json");
    std::fs::write(&manifest_path, manifest.to_json()?)?;

    println!();
    println!("Recording saved to: {}", artifact_path.display());
    println!("  Bytes: {}", manifest.byte_len);
    println!("  Fragments: {}", manifest.fragment_count);
    println!("  Duration: {:.2}s ({:?})", manifest.duration_secs, manifest.stop_reason);
    println!("  Frames rendered: {}", output.pump.rendered);
    if let Some(reference) = &manifest.reference {
        println!("  Transport text: {reference}");
    }
    println!("  Manifest: {}", manifest_path.display());

    Ok(())
}

fn write_artifact(dir: &Path, stem: &str, artifact: &ExportArtifact) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("{stem}.{}", artifact.file_extension()));
    std::fs::write(&path, artifact.bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
