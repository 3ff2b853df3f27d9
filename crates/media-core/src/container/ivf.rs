//! IVF container writer for VP8 RTP streams
//!
//! Layout: a 32-byte file header followed by frames, each prefixed with a
//! 12-byte header (frame size, presentation timestamp). All fields are
//! little-endian.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::BytesMut;
use tracing::{debug, info, trace};

use rtpbridge_rtp_core::payload::vp8::is_keyframe;
use rtpbridge_rtp_core::time::clock_rates::VIDEO_90KHZ;
use rtpbridge_rtp_core::{RtpPacket, Vp8Depacketizer};

use crate::error::{Error, Result};
use crate::track::ContainerWriter;

pub const IVF_FILE_HEADER_SIZE: usize = 32;
pub const IVF_FRAME_HEADER_SIZE: usize = 12;

const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
const VP8_FOURCC: &[u8; 4] = b"VP80";
const FRAME_COUNT_OFFSET: u64 = 24;
const DIMENSIONS_OFFSET: u64 = 12;

const DEFAULT_WIDTH: u16 = 640;
const DEFAULT_HEIGHT: u16 = 480;

/// Start code following the frame tag of a VP8 keyframe
const VP8_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Writes VP8 frames reassembled from RTP packets into an IVF file
pub struct IvfWriter<W: Write + Seek> {
    writer: W,
    depacketizer: Vp8Depacketizer,
    frame: BytesMut,
    in_frame: bool,
    seen_keyframe: bool,
    first_timestamp: Option<u32>,
    dimensions: Option<(u16, u16)>,
    frames_written: u32,
    closed: bool,
}

impl IvfWriter<BufWriter<File>> {
    /// Create (or truncate) an IVF file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| Error::Container(format!("failed to create {}: {}", path.display(), e)))?;
        info!("Writing IVF capture to {}", path.display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> IvfWriter<W> {
    /// Wrap a writer and emit the file header
    pub fn new(mut writer: W) -> Result<Self> {
        let mut header = [0u8; IVF_FILE_HEADER_SIZE];
        header[0..4].copy_from_slice(IVF_SIGNATURE);
        header[4..6].copy_from_slice(&0u16.to_le_bytes()); // version
        header[6..8].copy_from_slice(&(IVF_FILE_HEADER_SIZE as u16).to_le_bytes());
        header[8..12].copy_from_slice(VP8_FOURCC);
        header[12..14].copy_from_slice(&DEFAULT_WIDTH.to_le_bytes());
        header[14..16].copy_from_slice(&DEFAULT_HEIGHT.to_le_bytes());
        header[16..20].copy_from_slice(&VIDEO_90KHZ.to_le_bytes()); // timebase denominator
        header[20..24].copy_from_slice(&1u32.to_le_bytes()); // timebase numerator
        // frame count at 24..28 is patched on close

        writer.write_all(&header).map_err(container_error)?;

        Ok(Self {
            writer,
            depacketizer: Vp8Depacketizer::new(),
            frame: BytesMut::new(),
            in_frame: false,
            seen_keyframe: false,
            first_timestamp: None,
            dimensions: None,
            frames_written: 0,
            closed: false,
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Close (if still open) and return the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.writer)
    }

    fn write_frame(&mut self, timestamp: u32) -> Result<()> {
        if self.dimensions.is_none() && is_keyframe(&self.frame) {
            self.dimensions = keyframe_dimensions(&self.frame);
        }

        let first = *self.first_timestamp.get_or_insert(timestamp);
        let pts = timestamp.wrapping_sub(first) as u64;

        let mut header = [0u8; IVF_FRAME_HEADER_SIZE];
        header[0..4].copy_from_slice(&(self.frame.len() as u32).to_le_bytes());
        header[4..12].copy_from_slice(&pts.to_le_bytes());

        self.writer.write_all(&header).map_err(container_error)?;
        self.writer.write_all(&self.frame).map_err(container_error)?;
        self.frames_written += 1;

        trace!("Wrote IVF frame {} ({} bytes, pts {})", self.frames_written, self.frame.len(), pts);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.frame.is_empty() {
            debug!("Discarding incomplete frame of {} bytes at close", self.frame.len());
            self.frame.clear();
        }

        let writer = &mut self.writer;
        let end = writer.stream_position().map_err(container_error)?;

        if let Some((width, height)) = self.dimensions {
            writer.seek(SeekFrom::Start(DIMENSIONS_OFFSET)).map_err(container_error)?;
            writer.write_all(&width.to_le_bytes()).map_err(container_error)?;
            writer.write_all(&height.to_le_bytes()).map_err(container_error)?;
        }

        writer.seek(SeekFrom::Start(FRAME_COUNT_OFFSET)).map_err(container_error)?;
        writer.write_all(&self.frames_written.to_le_bytes()).map_err(container_error)?;
        writer.seek(SeekFrom::Start(end)).map_err(container_error)?;
        writer.flush().map_err(container_error)?;

        info!("Closed IVF capture after {} frames", self.frames_written);
        Ok(())
    }
}

impl<W: Write + Seek + Send> ContainerWriter for IvfWriter<W> {
    fn append_packet(&mut self, packet: &RtpPacket) -> Result<()> {
        if self.closed {
            return Err(Error::Container("write after close".to_string()));
        }
        if packet.payload.is_empty() {
            return Ok(());
        }

        let (descriptor, data) = match self.depacketizer.depacketize_with_descriptor(&packet.payload) {
            Ok(parts) => parts,
            Err(e) => {
                debug!("Skipping VP8 packet seq={}: {}", packet.sequence_number(), e);
                return Ok(());
            }
        };

        if descriptor.is_frame_start() {
            if !self.frame.is_empty() {
                debug!("Dropping {} byte frame that never saw its marker", self.frame.len());
                self.frame.clear();
            }

            if !self.seen_keyframe {
                if !is_keyframe(&data) {
                    trace!("Waiting for a keyframe, skipping seq={}", packet.sequence_number());
                    self.in_frame = false;
                    return Ok(());
                }
                self.seen_keyframe = true;
            }

            self.in_frame = true;
        } else if !self.in_frame {
            return Ok(());
        }

        self.frame.extend_from_slice(&data);

        if packet.marker() {
            self.write_frame(packet.timestamp())?;
            self.frame.clear();
            self.in_frame = false;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.finish()
    }
}

/// Width and height from an uncompressed VP8 keyframe header
fn keyframe_dimensions(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < 10 || frame[3..6] != VP8_START_CODE {
        return None;
    }
    let width = u16::from_le_bytes([frame[6], frame[7]]) & 0x3fff;
    let height = u16::from_le_bytes([frame[8], frame[9]]) & 0x3fff;
    Some((width, height))
}

fn container_error(err: std::io::Error) -> Error {
    Error::Container(err.to_string())
}
