//! Capture clock.
//!
//! Every capture is anchored to a monotonic epoch taken when the session
//! starts. Frame timestamps handed to encoders are offsets from that epoch.
//! The epoch is a tokio instant so paused-time tests see exact offsets.

use std::time::Duration;

use tokio::time::Instant;

/// Monotonic clock anchored at capture start.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl RecordingClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Offset of now from the epoch.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_runtime_time() {
        let clock = RecordingClock::start();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn test_epoch_wall_is_rfc3339() {
        let clock = RecordingClock::start();
        assert!(chrono::DateTime::parse_from_rfc3339(clock.epoch_wall()).is_ok());
    }
}
