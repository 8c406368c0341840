//! Chromacast CLI: chroma-key compositing and capture from the command line.
//!
//! Usage:
//!   chromacast composite <FG> <BG> -o <OUT>   Key one still over another
//!   chromacast record [OPTIONS]               Composite two timelines and record
//!   chromacast check                          Run a synthetic pipeline self-test
//!   chromacast init-config                    Write the default config file

use std::path::PathBuf;

use chromacast_common::config::{AppConfig, EncoderKind};
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "chromacast",
    about = "Chroma-key two video timelines and record the composite",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the XDG config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite a foreground still over a background still
    Composite {
        /// Foreground image (keyed pixels are replaced)
        foreground: PathBuf,

        /// Background image (resized to the foreground's size)
        background: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Composite two timelines and record the result
    Record {
        /// Foreground frame directory
        #[arg(long)]
        foreground: Option<PathBuf>,

        /// Background frame directory
        #[arg(long)]
        background: Option<PathBuf>,

        /// Capture window in seconds
        #[arg(long)]
        window_secs: Option<u64>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture encoder
        #[arg(long, value_enum)]
        encoder: Option<EncoderArg>,

        /// Also write the base64 transport text next to the artifact
        #[arg(long)]
        transport_text: bool,
    },

    /// Run a short synthetic pipeline and report capabilities
    Check,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncoderArg {
    Raw,
    Gstreamer,
}

impl From<EncoderArg> for EncoderKind {
    fn from(arg: EncoderArg) -> Self {
        match arg {
            EncoderArg::Raw => EncoderKind::Raw,
            EncoderArg::Gstreamer => EncoderKind::Gstreamer,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    chromacast_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Composite {
            foreground,
            background,
            output,
        } => commands::composite::run(foreground, background, output),
        Commands::Record {
            foreground,
            background,
            window_secs,
            output,
            encoder,
            transport_text,
        } => {
            commands::record::run(
                config,
                commands::record::RecordArgs {
                    foreground,
                    background,
                    window_secs,
                    output,
                    encoder: encoder.map(EncoderKind::from),
                    transport_text,
                },
            )
            .await
        }
        Commands::Check => commands::check::run().await,
        Commands::InitConfig { force } => commands::init_config::run(cli.config, force),
    }
}
