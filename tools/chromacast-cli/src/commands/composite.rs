//! One-shot composite of two still images.

use std::path::PathBuf;

use anyhow::Context;
use chromacast_frame_source::backends::decode_image_file;
use chromacast_media_model::{ChromaKeyRule, Dimensions};
use chromacast_render_engine::{composite, key_coverage};

pub fn run(foreground: PathBuf, background: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let (width, height) = image::image_dimensions(&foreground)
        .with_context(|| format!("Failed to read {}", foreground.display()))?;
    let dims = Dimensions::new(width, height);

    let fg = decode_image_file(&foreground, dims)?;
    let bg = decode_image_file(&background, dims)?;
    let rule = ChromaKeyRule::new();

    let keyed = key_coverage(&fg, &rule);
    let out = composite(&fg, &bg, &rule)?;

    let buffer = image::RgbaImage::from_raw(width, height, out.into_bytes())
        .context("Composite buffer does not match its dimensions")?;
    buffer
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let percent = keyed as f64 / dims.pixel_count().max(1) as f64 * 100.0;
    println!("Composite written to: {}", output.display());
    println!("  Size: {dims}");
    println!("  Keyed pixels: {keyed} ({percent:.1}%)");

    Ok(())
}
