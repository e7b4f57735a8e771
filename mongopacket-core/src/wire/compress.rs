//! OP_COMPRESSED envelope handling.
//!
//! The envelope is 9 bytes - inner opcode, uncompressed size, compressor
//! id - followed by the compressed body. Decompression rewrites the
//! header: `compressed_length` records the original on-wire length,
//! `message_length` becomes `16 +` the decompressed body length, and
//! `opcode` becomes the inner opcode.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{DecodeError, Result};

use super::cursor::Cursor;
use super::header::{Header, OpCode, HEADER_LEN, MAX_MESSAGE_SIZE};

/// Compressor ids defined by the protocol.
pub const COMPRESSOR_NOOP: u8 = 0;
pub const COMPRESSOR_SNAPPY: u8 = 1;
pub const COMPRESSOR_ZLIB: u8 = 2;
pub const COMPRESSOR_ZSTD: u8 = 3;

/// Size of the envelope that follows the standard header.
const ENVELOPE_LEN: usize = 9;

/// Unwrap an OP_COMPRESSED message, returning the decompressed body.
///
/// The cursor must sit just past the 16-byte header. On success the header
/// has been rewritten as described in the module docs, and the returned
/// buffer holds the inner message body (everything that would follow the
/// inner message's header).
pub fn decompress(cur: &mut Cursor<'_>, header: &mut Header) -> Result<Vec<u8>> {
    let original_opcode = cur.read_i32("compression envelope opcode")?;
    let uncompressed_size = cur.read_i32("compression envelope size")?;
    let compressor_id = cur.read_u8("compression envelope compressor id")?;

    if uncompressed_size < 0 || uncompressed_size > MAX_MESSAGE_SIZE {
        return Err(DecodeError::Decompress {
            codec: "envelope",
            reason: format!("uncompressed size {uncompressed_size} out of range"),
        });
    }

    let compressed_len = (header.message_length as usize)
        .saturating_sub(HEADER_LEN + ENVELOPE_LEN)
        .min(cur.remaining());
    let data = cur.take(compressed_len, "compressed body")?;

    let body = match compressor_id {
        COMPRESSOR_NOOP => data.to_vec(),
        COMPRESSOR_SNAPPY => {
            let out = snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| DecodeError::Decompress {
                    codec: "snappy",
                    reason: e.to_string(),
                })?;
            if out.len() != uncompressed_size as usize {
                return Err(DecodeError::Decompress {
                    codec: "snappy",
                    reason: format!(
                        "decompressed {} bytes, envelope promised {}",
                        out.len(),
                        uncompressed_size
                    ),
                });
            }
            out
        }
        COMPRESSOR_ZLIB => {
            let mut out = vec![0u8; uncompressed_size as usize];
            ZlibDecoder::new(data)
                .read_exact(&mut out)
                .map_err(|e| DecodeError::Decompress {
                    codec: "zlib",
                    reason: e.to_string(),
                })?;
            out
        }
        COMPRESSOR_ZSTD => {
            let mut out = vec![0u8; uncompressed_size as usize];
            let mut dec = zstd::stream::read::Decoder::new(data).map_err(|e| {
                DecodeError::Decompress {
                    codec: "zstd",
                    reason: e.to_string(),
                }
            })?;
            dec.read_exact(&mut out).map_err(|e| DecodeError::Decompress {
                codec: "zstd",
                reason: e.to_string(),
            })?;
            out
        }
        id => return Err(DecodeError::UnknownCompressor { id }),
    };

    header.compressed_length = header.message_length;
    header.message_length = (HEADER_LEN + body.len()) as i32;
    header.opcode = OpCode::from_i32(original_opcode);
    Ok(body)
}
