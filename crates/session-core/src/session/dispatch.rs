//! Inbound track dispatch
//!
//! Every recognized track gets a keyframe timer. The first VP8 track is
//! captured to an IVF file and its capture loop raises the readiness signal.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rtpbridge_media_core::{CaptureLoop, IvfWriter, KeyframeTimer, ReadySignal};

use crate::config::CaptureConfig;
use crate::coordinator::SessionId;
use crate::engine::InboundTrack;
use crate::events::SessionEvent;

pub(crate) struct TrackDispatcher {
    pub session_id: SessionId,
    pub capture: CaptureConfig,
    pub events: broadcast::Sender<SessionEvent>,
}

impl TrackDispatcher {
    pub fn capture_path(&self, ssrc: u32) -> PathBuf {
        self.capture.output_dir.join(format!("{}_{}.ivf", self.session_id, ssrc))
    }

    /// Consume inbound tracks until the session is cancelled or the engine
    /// stops delivering them, then wait for the spawned per-track tasks.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<InboundTrack>,
        ready: ReadySignal,
        cancel: CancellationToken,
    ) {
        let mut ready = Some(ready);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let track = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                track = inbound.recv() => match track {
                    Some(track) => track,
                    None => {
                        debug!("Engine stopped delivering inbound tracks");
                        break;
                    }
                },
            };

            info!(
                "Inbound track ssrc={} codec={} pt={}",
                track.ssrc, track.mime_type, track.payload_type
            );

            let track_cancel = cancel.child_token();
            let timer = KeyframeTimer::new(track.ssrc, self.capture.keyframe_interval, Arc::clone(&track.control));
            let timer_handle = timer.spawn(track_cancel.clone());
            tasks.push(tokio::spawn(async move {
                if let Ok(stats) = timer_handle.await {
                    debug!("Keyframe timer stopped: sent={} failed={}", stats.sent, stats.failed);
                }
            }));

            if !track.is_vp8() {
                debug!("Not capturing {} track ssrc={}", track.mime_type, track.ssrc);
                continue;
            }
            let Some(signal) = ready.take() else {
                debug!("Already capturing a track, ignoring ssrc={}", track.ssrc);
                continue;
            };

            let path = self.capture_path(track.ssrc);
            let writer = match IvfWriter::create(&path) {
                Ok(writer) => writer,
                Err(e) => {
                    error!("Failed to open capture file {}: {}", path.display(), e);
                    cancel.cancel();
                    break;
                }
            };

            let _ = self.events.send(SessionEvent::CaptureStarted {
                session_id: self.session_id,
                ssrc: track.ssrc,
                path: path.clone(),
            });

            let reader = track.reader;
            let session_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let capture = CaptureLoop::new(reader, writer);
                match capture.run(signal, session_cancel.clone()).await {
                    Ok(stats) => info!(
                        "Capture to {} finished: {} packets ({:?})",
                        path.display(),
                        stats.packets_written,
                        stats.ended_by
                    ),
                    Err(e) => {
                        error!("Capture to {} failed: {}", path.display(), e);
                        session_cancel.cancel();
                    }
                }
                track_cancel.cancel();
            }));
        }

        if ready.is_some() {
            warn!("No VP8 inbound track was captured");
        }
        drop(ready);

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Track task ended abnormally: {}", e);
            }
        }
    }
}
