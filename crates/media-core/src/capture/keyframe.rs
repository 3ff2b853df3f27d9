use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rtpbridge_rtp_core::{PictureLossIndication, RtpSsrc};

use crate::track::ControlSender;

/// Default interval between keyframe requests
pub const DEFAULT_KEYFRAME_INTERVAL: Duration = Duration::from_secs(3);

/// Keyframe requests sent and failed over a timer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyframeStats {
    pub sent: u64,
    pub failed: u64,
}

/// Periodically asks the remote encoder of one track for a keyframe
///
/// The first request goes out one interval after start. Send failures are
/// logged and the timer keeps going; it stops only when cancelled.
pub struct KeyframeTimer {
    media_ssrc: RtpSsrc,
    interval: Duration,
    control: Arc<dyn ControlSender>,
}

impl KeyframeTimer {
    pub fn new(media_ssrc: RtpSsrc, interval: Duration, control: Arc<dyn ControlSender>) -> Self {
        Self {
            media_ssrc,
            interval: interval.max(Duration::from_millis(1)),
            control,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<KeyframeStats> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) -> KeyframeStats {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = KeyframeStats::default();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let pli = PictureLossIndication::new(self.media_ssrc);
                    match self.control.send_pli(pli).await {
                        Ok(()) => {
                            stats.sent += 1;
                            debug!("Sent PLI for ssrc={}", self.media_ssrc);
                        }
                        Err(e) => {
                            stats.failed += 1;
                            warn!("Failed to send PLI for ssrc={}: {}", self.media_ssrc, e);
                        }
                    }
                }
            }
        }

        debug!(
            "Keyframe timer for ssrc={} stopped ({} sent, {} failed)",
            self.media_ssrc, stats.sent, stats.failed
        );
        stats
    }
}
