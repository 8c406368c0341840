//! Write the default configuration file.

use std::path::PathBuf;

use chromacast_common::config::{config_file_path, AppConfig};

pub fn run(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let target = path.clone().unwrap_or_else(config_file_path);
    if target.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            target.display()
        );
    }

    let config = AppConfig::default();
    let path = match path {
        Some(path) => {
            config.save_to(&path)?;
            path
        }
        None => config.save()?,
    };

    println!("Config written to: {}", path.display());
    println!("  Foreground: {}", config.sources.foreground.uri.display());
    println!("  Background: {}", config.sources.background.uri.display());
    println!("  Window: {}s", config.capture.window_secs);
    println!("  Output: {}", config.output_dir.display());

    Ok(())
}
