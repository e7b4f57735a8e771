//! Capture file reader.
//!
//! Supports legacy PCAP and PCAPNG, yielding frames with microsecond
//! timestamps. End of file is `Ok(None)`, so the capture loop treats both
//! formats identically through one `next_frame` contract.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};

use crate::error::{CaptureError, Error};

/// Buffer size for reading capture files (64KB).
const BUFFER_SIZE: usize = 65536;

/// A raw frame from the capture file.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame number (1-indexed, capture order).
    pub frame_number: u64,

    /// Capture timestamp, microseconds since epoch.
    pub timestamp_us: i64,

    /// Captured length (may be less than the wire length).
    pub captured_length: u32,

    /// Raw frame bytes, starting at the link layer.
    pub data: Vec<u8>,
}

/// Reader over a PCAP or PCAPNG capture file.
pub struct CaptureFile {
    inner: ReaderInner,
    frame_number: u64,
    link_type: u16,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<File>>),
    Ng(PcapNGReader<BufReader<File>>),
}

impl CaptureFile {
    /// Open a capture file, picking the format from its magic number.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|_| CaptureError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| CaptureError::InvalidFormat {
                reason: "file too short to read magic number".to_string(),
            })?;

        // Reset by reopening; the pcap readers expect the magic in-stream.
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let inner = match &magic {
            // Legacy PCAP, little/big endian, micro/nanosecond variants.
            [0xd4, 0xc3, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0xc3, 0xd4]
            | [0x4d, 0x3c, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0x3c, 0x4d] => {
                let r = LegacyPcapReader::new(BUFFER_SIZE, reader).map_err(|e| {
                    CaptureError::InvalidFormat {
                        reason: format!("failed to parse pcap header: {e}"),
                    }
                })?;
                ReaderInner::Legacy(r)
            }
            [0x0a, 0x0d, 0x0d, 0x0a] => {
                let r = PcapNGReader::new(BUFFER_SIZE, reader).map_err(|e| {
                    CaptureError::InvalidFormat {
                        reason: format!("failed to parse pcapng header: {e}"),
                    }
                })?;
                ReaderInner::Ng(r)
            }
            _ => {
                return Err(CaptureError::InvalidFormat {
                    reason: format!("unknown magic number: {magic:02x?}"),
                }
                .into())
            }
        };

        Ok(Self {
            inner,
            frame_number: 0,
            link_type: 1, // Ethernet until a header block says otherwise
        })
    }

    /// Link type of the capture (e.g., 1 = Ethernet).
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Read the next frame. Returns `Ok(None)` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, Error> {
        match self.inner {
            ReaderInner::Legacy(_) => self.next_legacy(),
            ReaderInner::Ng(_) => self.next_ng(),
        }
    }

    fn next_legacy(&mut self) -> Result<Option<RawFrame>, Error> {
        let reader = match &mut self.inner {
            ReaderInner::Legacy(r) => r,
            _ => unreachable!(),
        };
        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::Legacy(packet) => {
                            self.frame_number += 1;
                            let timestamp_us =
                                (packet.ts_sec as i64) * 1_000_000 + (packet.ts_usec as i64);
                            let frame = RawFrame {
                                frame_number: self.frame_number,
                                timestamp_us,
                                captured_length: packet.caplen,
                                data: packet.data.to_vec(),
                            };
                            reader.consume(offset);
                            return Ok(Some(frame));
                        }
                        PcapBlockOwned::LegacyHeader(header) => {
                            self.link_type = header.network.0 as u16;
                            reader.consume(offset);
                        }
                        _ => reader.consume(offset),
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete) => {
                    reader.refill().map_err(|e| CaptureError::InvalidFormat {
                        reason: format!("refill error: {e}"),
                    })?;
                }
                Err(e) => {
                    return Err(CaptureError::InvalidFormat {
                        reason: format!("parse error: {e}"),
                    }
                    .into())
                }
            }
        }
    }

    fn next_ng(&mut self) -> Result<Option<RawFrame>, Error> {
        let reader = match &mut self.inner {
            ReaderInner::Ng(r) => r,
            _ => unreachable!(),
        };
        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    use pcap_parser::pcapng::Block;

                    match block {
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            self.link_type = idb.linktype.0 as u16;
                            reader.consume(offset);
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            self.frame_number += 1;
                            // Interface time units default to microseconds.
                            let timestamp_us = ((epb.ts_high as i64) << 32) | (epb.ts_low as i64);
                            let frame = RawFrame {
                                frame_number: self.frame_number,
                                timestamp_us,
                                captured_length: epb.caplen,
                                data: epb.data.to_vec(),
                            };
                            reader.consume(offset);
                            return Ok(Some(frame));
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            self.frame_number += 1;
                            let frame = RawFrame {
                                frame_number: self.frame_number,
                                timestamp_us: 0, // no timestamp in simple packets
                                captured_length: spb.data.len() as u32,
                                data: spb.data.to_vec(),
                            };
                            reader.consume(offset);
                            return Ok(Some(frame));
                        }
                        _ => reader.consume(offset),
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete) => {
                    reader.refill().map_err(|e| CaptureError::InvalidFormat {
                        reason: format!("refill error: {e}"),
                    })?;
                }
                Err(e) => {
                    return Err(CaptureError::InvalidFormat {
                        reason: format!("parse error: {e}"),
                    }
                    .into())
                }
            }
        }
    }
}

/// Iterator adapter for CaptureFile.
impl Iterator for CaptureFile {
    type Item = Result<RawFrame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Legacy PCAP bytes with the given Ethernet frames.
    pub(crate) fn legacy_pcap(frames: &[(i64, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // magic, little endian
        data.extend_from_slice(&[0x02, 0x00]); // version major
        data.extend_from_slice(&[0x04, 0x00]); // version minor
        data.extend_from_slice(&[0x00; 4]); // thiszone
        data.extend_from_slice(&[0x00; 4]); // sigfigs
        data.extend_from_slice(&0xffff_u32.to_le_bytes()); // snaplen
        data.extend_from_slice(&1u32.to_le_bytes()); // network: Ethernet

        for (ts_us, frame) in frames {
            data.extend_from_slice(&((ts_us / 1_000_000) as u32).to_le_bytes());
            data.extend_from_slice(&((ts_us % 1_000_000) as u32).to_le_bytes());
            data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            data.extend_from_slice(frame);
        }
        data
    }

    // Test 1: read back frames with timestamps
    #[test]
    fn test_read_legacy() {
        let frame_a = [0xaau8; 20];
        let frame_b = [0xbbu8; 30];
        let bytes = legacy_pcap(&[(1_000_500, &frame_a), (2_000_750, &frame_b)]);

        let temp = NamedTempFile::with_suffix(".pcap").unwrap();
        std::fs::File::create(temp.path())
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let mut reader = CaptureFile::open(temp.path()).unwrap();
        let a = reader.next_frame().unwrap().unwrap();
        assert_eq!(a.frame_number, 1);
        assert_eq!(a.timestamp_us, 1_000_500);
        assert_eq!(a.data, frame_a);
        assert_eq!(a.captured_length, 20);

        let b = reader.next_frame().unwrap().unwrap();
        assert_eq!(b.frame_number, 2);
        assert_eq!(b.timestamp_us, 2_000_750);

        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.link_type(), 1);
    }

    // Test 2: unknown magic is rejected
    #[test]
    fn test_bad_magic() {
        let temp = NamedTempFile::with_suffix(".pcap").unwrap();
        std::fs::File::create(temp.path())
            .unwrap()
            .write_all(b"not a capture file")
            .unwrap();

        assert!(matches!(
            CaptureFile::open(temp.path()),
            Err(Error::Capture(CaptureError::InvalidFormat { .. }))
        ));
    }

    // Test 3: missing file
    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CaptureFile::open("/nonexistent/capture.pcap"),
            Err(Error::Capture(CaptureError::FileNotFound { .. }))
        ));
    }
}
