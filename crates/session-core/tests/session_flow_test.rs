//! End-to-end session flow against a fake media engine

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use rtpbridge_media_core::{ControlSender, PacketReader, Sample, SampleSink};
use rtpbridge_rtp_core::{PictureLossIndication, RtpPacket};
use rtpbridge_session_core::{
    decode_description, encode_description, InboundTrack, MediaEngine, NegotiatedSession,
    PeerSession, SdpType, SessionConfig, SessionCoordinator, SessionDescription, SessionError,
    SessionEvent, SessionId,
};

const TRACK_SSRC: u32 = 0x1234_5678;

/// VP8 payload descriptor (S=1, PID=0) followed by a 160x120 keyframe header
const VP8_KEYFRAME: [u8; 11] = [0x10, 0x50, 0x01, 0x00, 0x9d, 0x01, 0x2a, 0xa0, 0x00, 0x78, 0x00];

/// Reads from a channel and records when the first read was attempted
struct ChannelReader {
    packets: mpsc::Receiver<RtpPacket>,
    first_read: Arc<Mutex<Option<Instant>>>,
}

#[async_trait]
impl PacketReader for ChannelReader {
    async fn read_packet(&mut self) -> rtpbridge_media_core::Result<Option<RtpPacket>> {
        self.first_read.lock().unwrap().get_or_insert_with(Instant::now);
        Ok(self.packets.recv().await)
    }
}

#[derive(Default)]
struct CountingControl(AtomicUsize);

#[async_trait]
impl ControlSender for CountingControl {
    async fn send_pli(&self, _pli: PictureLossIndication) -> rtpbridge_media_core::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<Sample>>);

#[async_trait]
impl SampleSink for RecordingSink {
    async fn write_sample(&self, sample: Sample) -> rtpbridge_media_core::Result<()> {
        self.0.lock().unwrap().push(sample);
        Ok(())
    }
}

#[derive(Default)]
struct FakePeer(AtomicBool);

#[async_trait]
impl PeerSession for FakePeer {
    async fn close(&self) -> rtpbridge_session_core::Result<()> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers every offer; optionally announces one VP8 inbound track,
/// immediately or after `track_delay`
#[derive(Default)]
struct FakeEngine {
    no_tracks: bool,
    track_delay: Option<Duration>,
    first_read: Arc<Mutex<Option<Instant>>>,
    sink: Arc<RecordingSink>,
    control: Arc<CountingControl>,
    peers: Mutex<Vec<Arc<FakePeer>>>,
    track_feeds: Mutex<Vec<mpsc::Sender<InboundTrack>>>,
    packet_feeds: Mutex<Vec<mpsc::Sender<RtpPacket>>>,
}

impl FakeEngine {
    fn without_tracks() -> Self {
        Self { no_tracks: true, ..Default::default() }
    }

    fn with_track_delay(delay: Duration) -> Self {
        Self { track_delay: Some(delay), ..Default::default() }
    }

    fn first_read(&self) -> Option<Instant> {
        *self.first_read.lock().unwrap()
    }

    fn packet_feed(&self, index: usize) -> mpsc::Sender<RtpPacket> {
        self.packet_feeds.lock().unwrap()[index].clone()
    }

    fn peer_closed(&self, index: usize) -> bool {
        self.peers.lock().unwrap()[index].0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn negotiate(&self, offer: SessionDescription) -> rtpbridge_session_core::Result<NegotiatedSession> {
        if offer.sdp.contains("fail") {
            return Err(SessionError::negotiation("no common codec"));
        }

        let (track_tx, track_rx) = mpsc::channel(4);
        if !self.no_tracks {
            let (packet_tx, packet_rx) = mpsc::channel(16);
            let track = InboundTrack {
                ssrc: TRACK_SSRC,
                mime_type: "video/VP8".to_string(),
                payload_type: 96,
                reader: Box::new(ChannelReader {
                    packets: packet_rx,
                    first_read: self.first_read.clone(),
                }),
                control: self.control.clone(),
            };
            match self.track_delay {
                Some(delay) => {
                    let late_tx = track_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = late_tx.send(track).await;
                    });
                }
                None => track_tx.send(track).await.unwrap(),
            }
            self.packet_feeds.lock().unwrap().push(packet_tx);
        }
        self.track_feeds.lock().unwrap().push(track_tx);

        let peer = Arc::new(FakePeer::default());
        self.peers.lock().unwrap().push(peer.clone());

        Ok(NegotiatedSession {
            answer: SessionDescription::answer("v=0\r\ns=answer\r\n"),
            outbound: self.sink.clone(),
            inbound: track_rx,
            peer,
        })
    }
}

fn test_config(output_dir: &std::path::Path) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.relay.listen = "127.0.0.1:0".parse().unwrap();
    config.relay.decimation = 1;
    config.capture.output_dir = output_dir.to_path_buf();
    config
}

fn encoded_offer(sdp: &str) -> String {
    encode_description(&SessionDescription::offer(sdp)).unwrap()
}

fn vp8_packet(seq: u16, ts: u32) -> RtpPacket {
    let mut packet = RtpPacket::new_with_payload(96, seq, ts, 0xcafe, Bytes::from_static(&VP8_KEYFRAME));
    packet.header.marker = true;
    packet
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no session event within 5s")
        .unwrap()
}

async fn wait_for_terminal(events: &mut broadcast::Receiver<SessionEvent>, id: SessionId) -> SessionEvent {
    loop {
        let event = next_event(events).await;
        if event.session_id() == id && event.is_terminal() {
            return event;
        }
    }
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).try_init();
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::default());
    let coordinator = SessionCoordinator::new(test_config(dir.path()), engine.clone()).unwrap();
    let mut events = coordinator.subscribe();

    let accepted = coordinator.submit_offer(encoded_offer("v=0\r\ns=offer\r\n")).await.unwrap();

    // The answer is base64 of a JSON session description
    let json = STANDARD.decode(&accepted.answer).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["type"], "answer");
    let answer = decode_description(&accepted.answer).unwrap();
    assert_eq!(answer.sdp_type, SdpType::Answer);

    // Capture attaches before the relay listener exists
    let mut order = Vec::new();
    let relay_addr: SocketAddr = loop {
        match next_event(&mut events).await {
            SessionEvent::Negotiated { .. } => order.push("negotiated"),
            SessionEvent::CaptureStarted { ssrc, path, .. } => {
                assert_eq!(ssrc, TRACK_SSRC);
                assert!(path.ends_with(format!("{}_{}.ivf", accepted.session_id, TRACK_SSRC)));
                order.push("capture");
            }
            SessionEvent::RelayListening { addr, .. } => {
                order.push("relay");
                break addr;
            }
            other => panic!("unexpected event {:?}", other),
        }
    };
    assert_eq!(order, vec!["negotiated", "capture", "relay"]);

    let info = coordinator.session(accepted.session_id).await.unwrap();
    assert_eq!(info.relay_addr, Some(relay_addr));

    // Inbound packets land in the capture file
    engine.packet_feed(0).send(vp8_packet(1, 0)).await.unwrap();

    // Outbound samples reach the negotiated track
    let source = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..5u16 {
        let datagram = vp8_packet(100 + i, 3000 * i as u32).serialize().unwrap();
        source.send_to(&datagram, relay_addr).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.sink.0.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no sample relayed");

    coordinator.terminate(accepted.session_id).await.unwrap();
    let terminal = wait_for_terminal(&mut events, accepted.session_id).await;
    match terminal {
        SessionEvent::Terminated { stats: Some(stats), .. } => assert!(stats.packets_received >= 1),
        other => panic!("expected termination with relay stats, got {:?}", other),
    }

    assert!(engine.peer_closed(0));
    assert!(coordinator.list_sessions().await.is_empty());

    let capture = dir.path().join(format!("{}_{}.ivf", accepted.session_id, TRACK_SSRC));
    let bytes = std::fs::read(capture).unwrap();
    assert_eq!(&bytes[0..4], b"DKIF");
    assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 1);
}

#[tokio::test]
async fn test_malformed_offer_fails_only_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::default());
    let coordinator = SessionCoordinator::new(test_config(dir.path()), engine.clone()).unwrap();
    let mut events = coordinator.subscribe();

    let err = coordinator.submit_offer("%%% not base64 %%%").await.unwrap_err();
    assert!(matches!(err, SessionError::MalformedOffer(_)));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Failed { .. }));

    // An answer is not an acceptable offer
    let not_an_offer = encode_description(&SessionDescription::answer("v=0")).unwrap();
    let err = coordinator.submit_offer(not_an_offer).await.unwrap_err();
    assert!(matches!(err, SessionError::MalformedOffer(_)));

    // The coordinator keeps serving
    let accepted = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();
    assert_eq!(coordinator.list_sessions().await.len(), 1);
    coordinator.terminate(accepted.session_id).await.unwrap();
    wait_for_terminal(&mut events, accepted.session_id).await;
}

#[tokio::test]
async fn test_negotiation_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = SessionCoordinator::new(test_config(dir.path()), Arc::new(FakeEngine::default())).unwrap();

    let err = coordinator.submit_offer(encoded_offer("please fail")).await.unwrap_err();
    assert!(matches!(err, SessionError::Negotiation(_)));
}

#[tokio::test]
async fn test_second_offer_waits_for_a_free_slot() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::default());
    let coordinator = SessionCoordinator::new(test_config(dir.path()), engine.clone()).unwrap();
    let mut events = coordinator.subscribe();

    let first = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_millis(200),
        coordinator.submit_offer(encoded_offer("v=0")),
    )
    .await;
    assert!(blocked.is_err(), "second offer was serviced while the only slot was busy");

    coordinator.terminate(first.session_id).await.unwrap();
    wait_for_terminal(&mut events, first.session_id).await;

    let second = tokio::time::timeout(Duration::from_secs(5), coordinator.submit_offer(encoded_offer("v=0")))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(second.session_id, first.session_id);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_sessions_get_distinct_relay_ports() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.relay.listen = "127.0.0.1:41000".parse().unwrap();
    config.max_sessions = 2;
    let coordinator = SessionCoordinator::new(config, Arc::new(FakeEngine::default())).unwrap();

    let a = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();
    let b = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();
    let mut ports = vec![a.relay_port, b.relay_port];
    ports.sort();
    assert_eq!(ports, vec![41000, 41001]);

    coordinator.shutdown().await;
    assert!(coordinator.list_sessions().await.is_empty());
}

#[tokio::test]
async fn test_readiness_timeout_fails_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.capture.readiness_timeout = Some(Duration::from_millis(100));
    let coordinator = SessionCoordinator::new(config, Arc::new(FakeEngine::without_tracks())).unwrap();
    let mut events = coordinator.subscribe();

    let accepted = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();
    match wait_for_terminal(&mut events, accepted.session_id).await {
        SessionEvent::Failed { error, .. } => assert!(error.contains("capture did not start")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_relay_waits_for_late_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.relay.listen = "127.0.0.1:41200".parse().unwrap();
    let engine = Arc::new(FakeEngine::with_track_delay(Duration::from_millis(300)));
    let coordinator = SessionCoordinator::new(config, engine.clone()).unwrap();
    let mut events = coordinator.subscribe();

    let submitted = Instant::now();
    let accepted = coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();
    assert!(matches!(next_event(&mut events).await, SessionEvent::Negotiated { .. }));

    // No inbound track yet: nothing may announce or bind the relay port
    let early = tokio::time::timeout(Duration::from_millis(150), events.recv()).await;
    assert!(early.is_err(), "event before the inbound track arrived: {:?}", early);
    assert!(engine.first_read().is_none());
    drop(std::net::UdpSocket::bind("127.0.0.1:41200").expect("relay port bound before capture started"));

    let mut capture_started = false;
    loop {
        match next_event(&mut events).await {
            SessionEvent::CaptureStarted { .. } => capture_started = true,
            SessionEvent::RelayListening { addr, .. } => {
                assert!(capture_started);
                assert_eq!(addr.port(), 41200);
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    let listening_seen = Instant::now();

    let first_read = engine.first_read().expect("relay listening before the capture loop started");
    assert!(first_read <= listening_seen);
    assert!(first_read.duration_since(submitted) >= Duration::from_millis(300));

    coordinator.terminate(accepted.session_id).await.unwrap();
    wait_for_terminal(&mut events, accepted.session_id).await;
}

#[tokio::test]
async fn test_shutdown_rejects_new_offers() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = SessionCoordinator::new(test_config(dir.path()), Arc::new(FakeEngine::default())).unwrap();
    coordinator.submit_offer(encoded_offer("v=0")).await.unwrap();

    coordinator.shutdown().await;
    assert_eq!(coordinator.active_sessions(), 0);
    assert_eq!(
        coordinator.submit_offer(encoded_offer("v=0")).await.unwrap_err(),
        SessionError::ShuttingDown
    );
}

#[tokio::test]
async fn test_terminate_unknown_session() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = SessionCoordinator::new(test_config(dir.path()), Arc::new(FakeEngine::default())).unwrap();
    let err = coordinator.terminate(SessionId::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound(_)));
}
