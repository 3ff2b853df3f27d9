//! Datagram reading and RTP classification for the relay input

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::trace;

use rtpbridge_rtp_core::RtpPacket;

use crate::error::{Error, Result};

/// A socket-like source of whole datagrams
#[async_trait]
pub trait DatagramSource: Send + Sync {
    /// Receive one datagram into `buf`, returning its length.
    ///
    /// `io::ErrorKind::UnexpectedEof` signals that no more datagrams will arrive.
    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Local address the source is bound to, if any
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, peer) = self.recv_from(buf).await?;
        trace!("Received {} byte datagram from {}", len, peer);
        Ok(len)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Outcome of one read from a [`PacketSource`]
#[derive(Debug)]
pub enum SourceEvent {
    /// A datagram that parsed as RTP
    Packet(RtpPacket),
    /// A datagram that did not parse; it is dropped
    Malformed(rtpbridge_rtp_core::Error),
    /// The source is exhausted
    EndOfStream,
}

/// Reads datagrams of at most `mtu` bytes and parses them into RTP packets
pub struct PacketSource<S> {
    source: S,
    buf: Vec<u8>,
}

impl<S: DatagramSource> PacketSource<S> {
    pub fn new(source: S, mtu: usize) -> Self {
        Self { source, buf: vec![0u8; mtu] }
    }

    /// Read and classify the next datagram.
    ///
    /// Read failures other than end-of-stream are returned as `Error::Transport`.
    pub async fn next_event(&mut self) -> Result<SourceEvent> {
        let len = match self.source.recv_datagram(&mut self.buf).await {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(SourceEvent::EndOfStream);
            }
            Err(e) => return Err(Error::Transport(e)),
        };

        let datagram = Bytes::copy_from_slice(&self.buf[..len]);
        match RtpPacket::parse_bytes(datagram) {
            Ok(packet) => Ok(SourceEvent::Packet(packet)),
            Err(e) => Ok(SourceEvent::Malformed(e)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.source.local_addr()
    }

    pub fn mtu(&self) -> usize {
        self.buf.len()
    }
}
