//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where finished artifacts are written.
    pub output_dir: PathBuf,

    /// Foreground and background timelines.
    pub sources: SourcesConfig,

    /// Default capture settings.
    pub capture: CaptureDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// The two timelines that feed the compositor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub foreground: SourceEntry,
    pub background: SourceEntry,
}

/// One addressable timeline and how it plays back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Path of the timeline (a directory of still frames).
    pub uri: PathBuf,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Playback policy for a single timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Rewind to the first frame when the timeline ends.
    #[serde(rename = "loop")]
    pub loop_playback: bool,

    /// Carried for parity with media players; there is no audio path.
    pub muted: bool,

    /// Start advancing as soon as the source is created.
    pub autoplay: bool,

    /// Decoded frame width in pixels.
    pub width: u32,

    /// Decoded frame height in pixels.
    pub height: u32,

    /// Rate at which the timeline advances (frames per second).
    pub frame_rate: u32,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Capture window before the session stops on its own.
    pub window_secs: u64,

    /// Encoder used for the capture stream.
    pub encoder: EncoderKind,

    /// Frames bundled into one fragment by the raw encoder.
    pub frames_per_fragment: u32,

    /// Target bitrate for compressed encoders.
    pub bitrate_kbps: u32,
}

/// Available capture encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Uncompressed in-process container.
    Raw,
    /// VP8/WebM through GStreamer (requires the `gstreamer` feature).
    Gstreamer,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "chromacast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            sources: SourcesConfig::default(),
            capture: CaptureDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            foreground: SourceEntry {
                uri: PathBuf::from("videos/foreground"),
                playback: PlaybackConfig {
                    loop_playback: true,
                    ..PlaybackConfig::default()
                },
            },
            background: SourceEntry {
                uri: PathBuf::from("videos/background"),
                playback: PlaybackConfig::default(),
            },
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            loop_playback: false,
            muted: true,
            autoplay: true,
            width: 800,
            height: 450,
            frame_rate: 30,
        }
    }
}

impl PlaybackConfig {
    /// Interval between decoded frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            window_secs: 16,
            encoder: EncoderKind::Raw,
            frames_per_fragment: 30,
            bitrate_kbps: 2500,
        }
    }
}

impl CaptureDefaults {
    /// Capture window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("chromacast").join("config.json")
}

/// Default output directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("chromacast").join("captures")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_canvas() {
        let config = AppConfig::default();
        assert_eq!(config.sources.foreground.playback.width, 800);
        assert_eq!(config.sources.foreground.playback.height, 450);
        assert!(config.sources.foreground.playback.loop_playback);
        assert!(!config.sources.background.playback.loop_playback);
        assert_eq!(config.capture.window(), Duration::from_secs(16));
        assert_eq!(config.capture.encoder, EncoderKind::Raw);
    }

    #[test]
    fn test_playback_uses_loop_key_on_disk() {
        let json = serde_json::to_value(PlaybackConfig::default()).unwrap();
        assert_eq!(json["loop"], serde_json::Value::Bool(false));
        assert!(json.get("loop_playback").is_none());
    }

    #[test]
    fn test_missing_playback_falls_back_to_default() {
        let entry: SourceEntry = serde_json::from_str(r#"{"uri":"clips/fg"}"#).unwrap();
        assert_eq!(entry.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip_through_path() {
        let dir = std::env::temp_dir().join("chromacast_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.capture.window_secs = 5;
        config.capture.encoder = EncoderKind::Gstreamer;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.capture.window_secs, 5);
        assert_eq!(loaded.capture.encoder, EncoderKind::Gstreamer);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_frame_interval_guards_zero_rate() {
        let playback = PlaybackConfig {
            frame_rate: 0,
            ..PlaybackConfig::default()
        };
        assert_eq!(playback.frame_interval(), Duration::from_secs(1));
    }
}
