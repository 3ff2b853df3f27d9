//! Capture loop tests with scripted inbound tracks

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use rtpbridge_media_core::capture::CaptureEnd;
use rtpbridge_media_core::container::ivf::{IVF_FILE_HEADER_SIZE, IVF_FRAME_HEADER_SIZE};
use rtpbridge_media_core::{
    readiness_barrier, CaptureLoop, ContainerWriter, Error, IvfWriter, PacketReader, Result,
};
use rtpbridge_rtp_core::RtpPacket;

/// Replays a list of read results; idles forever once exhausted if `hang` is set
struct ScriptedReader {
    script: VecDeque<Result<Option<RtpPacket>>>,
    hang: bool,
}

impl ScriptedReader {
    fn new(script: Vec<Result<Option<RtpPacket>>>) -> Self {
        Self { script: script.into(), hang: false }
    }

    fn hanging(script: Vec<Result<Option<RtpPacket>>>) -> Self {
        Self { script: script.into(), hang: true }
    }
}

#[async_trait]
impl PacketReader for ScriptedReader {
    async fn read_packet(&mut self) -> Result<Option<RtpPacket>> {
        match self.script.pop_front() {
            Some(result) => result,
            None if self.hang => std::future::pending().await,
            None => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingWriter {
    sequence: Arc<Mutex<Vec<u16>>>,
    closed: Arc<Mutex<u32>>,
    fail_at: Option<u16>,
}

impl ContainerWriter for RecordingWriter {
    fn append_packet(&mut self, packet: &RtpPacket) -> Result<()> {
        if Some(packet.sequence_number()) == self.fail_at {
            return Err(Error::Container("disk full".to_string()));
        }
        self.sequence.lock().unwrap().push(packet.sequence_number());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock().unwrap() += 1;
        Ok(())
    }
}

fn packet(seq: u16) -> Result<Option<RtpPacket>> {
    Ok(Some(RtpPacket::new_with_payload(96, seq, 0, 0xcafe, Bytes::from_static(&[0x10, 0x00]))))
}

#[tokio::test]
async fn test_packets_appended_in_arrival_order() {
    let writer = RecordingWriter::default();
    let reader = ScriptedReader::new(vec![packet(3), packet(1), packet(2)]);
    let (ready, wait) = readiness_barrier();

    let stats = CaptureLoop::new(reader, writer.clone())
        .run(ready, CancellationToken::new())
        .await
        .unwrap();

    assert!(wait.wait().await.is_ok());
    assert_eq!(stats.packets_written, 3);
    assert_eq!(stats.ended_by, CaptureEnd::TrackEnded);
    assert_eq!(*writer.sequence.lock().unwrap(), vec![3, 1, 2]);
    assert_eq!(*writer.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_read_failure_closes_writer() {
    let writer = RecordingWriter::default();
    let reader = ScriptedReader::new(vec![
        packet(1),
        Err(Error::TrackRead("srtp failure".to_string())),
        packet(2),
    ]);
    let (ready, _wait) = readiness_barrier();

    let result = CaptureLoop::new(reader, writer.clone())
        .run(ready, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::TrackRead(_))));
    assert_eq!(*writer.sequence.lock().unwrap(), vec![1]);
    assert_eq!(*writer.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_container_failure_is_terminal() {
    let writer = RecordingWriter { fail_at: Some(2), ..Default::default() };
    let reader = ScriptedReader::new(vec![packet(1), packet(2), packet(3)]);
    let (ready, _wait) = readiness_barrier();

    let result = CaptureLoop::new(reader, writer.clone())
        .run(ready, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Container(_))));
    assert_eq!(*writer.sequence.lock().unwrap(), vec![1]);
    assert_eq!(*writer.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_ready_before_first_packet_and_cancellable() {
    let writer = RecordingWriter::default();
    let reader = ScriptedReader::hanging(vec![]);
    let (ready, wait) = readiness_barrier();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(CaptureLoop::new(reader, writer.clone()).run(ready, cancel.clone()));

    // No packet ever arrives, yet readiness is raised
    tokio::time::timeout(Duration::from_secs(5), wait.wait())
        .await
        .expect("capture never signalled readiness")
        .unwrap();

    cancel.cancel();
    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.ended_by, CaptureEnd::Cancelled);
    assert_eq!(stats.packets_written, 0);
    assert_eq!(*writer.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_capture_to_ivf_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbound.ivf");

    // Keyframe: P bit clear, start code, 160x120
    let keyframe = [0x10, 0x50, 0x01, 0x00, 0x9d, 0x01, 0x2a, 0xa0, 0x00, 0x78, 0x00, 0x01];
    let mut first = RtpPacket::new_with_payload(96, 10, 90_000, 1, Bytes::copy_from_slice(&keyframe));
    first.header.marker = true;
    let mut second = RtpPacket::new_with_payload(96, 11, 93_000, 1, Bytes::from_static(&[0x10, 0x51, 0x02]));
    second.header.marker = true;

    let reader = ScriptedReader::new(vec![Ok(Some(first)), Ok(Some(second))]);
    let writer = IvfWriter::create(&path).unwrap();
    let (ready, _wait) = readiness_barrier();

    let stats = CaptureLoop::new(reader, writer)
        .run(ready, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.packets_written, 2);

    let bytes = std::fs::read(&path).unwrap();
    let expected = IVF_FILE_HEADER_SIZE + 2 * IVF_FRAME_HEADER_SIZE + (keyframe.len() - 1) + 2;
    assert_eq!(bytes.len(), expected);
    assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 2);
    assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 160);
    assert_eq!(u16::from_le_bytes([bytes[14], bytes[15]]), 120);
}
