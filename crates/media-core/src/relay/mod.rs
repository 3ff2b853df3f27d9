//! Relay from a raw RTP source to an outbound track
//!
//! The relay reads datagrams from the media source, feeds them to a
//! [`SampleBuilder`], and every Nth packet tries to pop a sample and write it
//! to the outbound [`SampleSink`].

mod decimation;
mod source;

pub use decimation::Decimator;
pub use source::{DatagramSource, PacketSource, SourceEvent};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rtpbridge_rtp_core::time::clock_rates::VIDEO_90KHZ;
use rtpbridge_rtp_core::{Depacketizer, RtpPacket, DEFAULT_MTU};

use crate::error::{Error, Result};
use crate::sample::{SampleBuilder, SampleBuilderStats};
use crate::track::SampleSink;
use crate::DEFAULT_FRAME_DURATION;

/// Smallest datagram that can hold an RTP header
const MIN_MTU: usize = 12;

/// First pause after a skipped read failure; doubles per consecutive failure
const READ_ERROR_BACKOFF_MIN: Duration = Duration::from_millis(10);
const READ_ERROR_BACKOFF_MAX: Duration = Duration::from_secs(1);

fn read_error_backoff(consecutive: u32) -> Duration {
    let shift = consecutive.saturating_sub(1).min(16);
    READ_ERROR_BACKOFF_MIN
        .saturating_mul(1 << shift)
        .min(READ_ERROR_BACKOFF_MAX)
}

/// What the relay does when reading the media source fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Stop the relay and fail the session
    #[default]
    Terminate,
    /// Log the failure and keep reading, backing off while failures repeat
    Skip,
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the media source sends to
    pub listen: SocketAddr,
    /// Largest datagram read from the source
    pub mtu: usize,
    /// Pop a sample every `decimation` packets
    pub decimation: u32,
    /// Sample builder window, in packets
    pub window_capacity: usize,
    pub on_read_error: ReadErrorPolicy,
    /// RTP clock rate of the relayed codec
    pub clock_rate: u32,
    /// Duration given to the first sample
    pub default_frame_duration: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 1234)),
            mtu: DEFAULT_MTU,
            decimation: 3,
            window_capacity: 50,
            on_read_error: ReadErrorPolicy::Terminate,
            clock_rate: VIDEO_90KHZ,
            default_frame_duration: DEFAULT_FRAME_DURATION,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decimation == 0 {
            return Err(Error::Config("relay decimation must be at least 1".to_string()));
        }
        if self.window_capacity == 0 {
            return Err(Error::Config("relay window capacity must be at least 1".to_string()));
        }
        if self.mtu < MIN_MTU {
            return Err(Error::Config(format!(
                "relay mtu {} is smaller than an RTP header ({} bytes)",
                self.mtu, MIN_MTU
            )));
        }
        if self.clock_rate == 0 {
            return Err(Error::Config("relay clock rate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Counters reported when the relay stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Datagrams that parsed as RTP
    pub packets_received: u64,
    /// Datagrams dropped because they did not parse
    pub packets_malformed: u64,
    /// Source read failures, including the one that stopped the relay
    pub read_errors: u64,
    pub pop_attempts: u64,
    pub samples_written: u64,
    pub sample_write_failures: u64,
    pub builder: SampleBuilderStats,
}

/// Drives packet source → sample builder → outbound track
pub struct RelayLoop<D, S> {
    config: RelayConfig,
    source: PacketSource<S>,
    builder: SampleBuilder<D>,
    decimator: Decimator,
    sink: Arc<dyn SampleSink>,
    stats: RelayStats,
}

impl<D: Depacketizer> RelayLoop<D, UdpSocket> {
    /// Bind a UDP listener on `config.listen` and build a relay reading from it
    pub async fn bind(
        config: RelayConfig,
        depacketizer: D,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(config.listen).await.map_err(Error::Transport)?;
        info!("Relay listening for RTP on {}", socket.local_addr().map_err(Error::Transport)?);
        Self::new(config, socket, depacketizer, sink)
    }
}

impl<D: Depacketizer, S: DatagramSource> RelayLoop<D, S> {
    pub fn new(
        config: RelayConfig,
        source: S,
        depacketizer: D,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self> {
        config.validate()?;

        let builder = SampleBuilder::new(depacketizer, config.window_capacity)
            .with_clock_rate(config.clock_rate)
            .with_default_frame_duration(config.default_frame_duration);

        Ok(Self {
            source: PacketSource::new(source, config.mtu),
            decimator: Decimator::new(config.decimation)?,
            builder,
            sink,
            config,
            stats: RelayStats::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.source.local_addr().map_err(Error::Transport)
    }

    /// Relay until end-of-stream or cancellation.
    ///
    /// Returns an error only when a read fails under [`ReadErrorPolicy::Terminate`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RelayStats> {
        debug!(
            "Relay started: mtu={} decimation={} window={}",
            self.source.mtu(),
            self.decimator.factor(),
            self.config.window_capacity
        );

        let mut consecutive_errors: u32 = 0;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Relay cancelled");
                    break;
                }
                event = self.source.next_event() => event,
            };

            match event {
                Ok(SourceEvent::Packet(packet)) => {
                    self.stats.packets_received += 1;
                    self.relay_packet(packet).await;
                }
                Ok(SourceEvent::Malformed(e)) => {
                    self.stats.packets_malformed += 1;
                    debug!("Dropping malformed datagram: {}", e);
                }
                Ok(SourceEvent::EndOfStream) => {
                    info!("Media source reached end of stream");
                    break;
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    consecutive_errors += 1;
                    match self.config.on_read_error {
                        ReadErrorPolicy::Terminate => {
                            error!("Relay read failed: {}", e);
                            return Err(e);
                        }
                        ReadErrorPolicy::Skip => {
                            let backoff = read_error_backoff(consecutive_errors);
                            warn!(
                                "Relay read failed ({} in a row), retrying in {:?}: {}",
                                consecutive_errors, backoff, e
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    info!("Relay cancelled");
                                    break;
                                }
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                    continue;
                }
            }
            consecutive_errors = 0;
        }

        self.stats.builder = self.builder.stats();
        info!(
            "Relay stopped: {} packets, {} samples written, {} malformed",
            self.stats.packets_received, self.stats.samples_written, self.stats.packets_malformed
        );
        Ok(self.stats)
    }

    async fn relay_packet(&mut self, packet: RtpPacket) {
        self.builder.push(packet);

        if !self.decimator.tick() {
            return;
        }

        self.stats.pop_attempts += 1;
        let Some(sample) = self.builder.pop() else {
            return;
        };

        match self.sink.write_sample(sample).await {
            Ok(()) => self.stats.samples_written += 1,
            Err(e) => {
                self.stats.sample_write_failures += 1;
                warn!("Failed to write sample to outbound track: {}", e);
            }
        }
    }
}
