//! Message header and opcode definitions.

use std::fmt;

use serde::Serialize;

use super::cursor::Cursor;
use crate::error::Result;

/// Exact size of the standard message header, in bytes.
pub const HEADER_LEN: usize = 16;

/// Maximum size of a single message, including the header.
pub const MAX_MESSAGE_SIZE: i32 = 48 * 1024 * 1024;

/// Operation code at header offset 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Reply to a client request. `response_to` is set.
    Reply,
    /// Update a document (unacknowledged).
    Update,
    /// Insert new documents (unacknowledged).
    Insert,
    /// Query a collection.
    Query,
    /// Pull more data from a cursor.
    GetMore,
    /// Delete documents (unacknowledged).
    Delete,
    /// Client is finished with the given cursors.
    KillCursors,
    /// Compressed envelope around another message.
    Compressed,
    /// Extensible message format introduced in MongoDB 3.6.
    Msg,
    /// Anything outside the closed set. The body is discarded without
    /// erroring the stream.
    Unknown(i32),
}

impl OpCode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => OpCode::Reply,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            2012 => OpCode::Compressed,
            2013 => OpCode::Msg,
            other => OpCode::Unknown(other),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Compressed => 2012,
            OpCode::Msg => 2013,
            OpCode::Unknown(other) => *other,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Reply => write!(f, "OP_REPLY"),
            OpCode::Update => write!(f, "OP_UPDATE"),
            OpCode::Insert => write!(f, "OP_INSERT"),
            OpCode::Query => write!(f, "OP_QUERY"),
            OpCode::GetMore => write!(f, "OP_GET_MORE"),
            OpCode::Delete => write!(f, "OP_DELETE"),
            OpCode::KillCursors => write!(f, "OP_KILL_CURSORS"),
            OpCode::Compressed => write!(f, "OP_COMPRESSED"),
            OpCode::Msg => write!(f, "OP_MSG"),
            OpCode::Unknown(other) => write!(f, "Unknown: {other}"),
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Standard 16-byte header carried by every message.
///
/// The wire documentation declares `request_id` and `response_to` signed,
/// but observed traces contain values above 2^31, so both are treated as
/// unsigned here.
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    /// Total message size, including this header. After transparent
    /// decompression this is rewritten to `16 +` the decompressed body
    /// length so downstream size arithmetic stays uniform.
    pub message_length: i32,

    /// Client or database generated identifier for this message.
    pub request_id: u32,

    /// For server replies, the `request_id` being answered.
    pub response_to: u32,

    /// Type of message. Rewritten to the inner opcode when the message
    /// arrived in an OP_COMPRESSED envelope.
    pub opcode: OpCode,

    /// The message arrived wrapped in an OP_COMPRESSED envelope.
    pub compressed: bool,

    /// Original on-wire length of the compressed message, or -1 when the
    /// message was not compressed.
    pub compressed_length: i32,
}

impl Header {
    /// Decode the 16-byte header at the cursor's position.
    pub fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        let message_length = cur.read_i32("header message_length")?;
        let request_id = cur.read_u32("header request_id")?;
        let response_to = cur.read_u32("header response_to")?;
        let opcode = OpCode::from_i32(cur.read_i32("header opcode")?);
        Ok(Header {
            message_length,
            request_id,
            response_to,
            opcode,
            compressed: opcode == OpCode::Compressed,
            compressed_length: -1,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header{{len={} opcode={} request_id={} response_to={} compressed={} clen={}}}",
            self.message_length,
            self.opcode,
            self.request_id,
            self.response_to,
            self.compressed,
            self.compressed_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(len: i32, request_id: u32, response_to: u32, opcode: i32) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&request_id.to_le_bytes());
        out.extend_from_slice(&response_to.to_le_bytes());
        out.extend_from_slice(&opcode.to_le_bytes());
        out
    }

    // Test 1: basic header decode
    #[test]
    fn test_header_read() {
        let raw = raw_header(61, 7, 0, 2004);
        let h = Header::read(&mut Cursor::new(&raw)).unwrap();
        assert_eq!(h.message_length, 61);
        assert_eq!(h.request_id, 7);
        assert_eq!(h.response_to, 0);
        assert_eq!(h.opcode, OpCode::Query);
        assert!(!h.compressed);
        assert_eq!(h.compressed_length, -1);
    }

    // Test 2: request ids above 2^31 survive as unsigned
    #[test]
    fn test_header_unsigned_request_id() {
        let raw = raw_header(16, 0x9000_0001, 0xffff_ffff, 1);
        let h = Header::read(&mut Cursor::new(&raw)).unwrap();
        assert_eq!(h.request_id, 0x9000_0001);
        assert_eq!(h.response_to, u32::MAX);
    }

    // Test 3: compressed flag follows the opcode
    #[test]
    fn test_header_compressed_flag() {
        let raw = raw_header(100, 1, 0, 2012);
        let h = Header::read(&mut Cursor::new(&raw)).unwrap();
        assert!(h.compressed);
        assert_eq!(h.opcode, OpCode::Compressed);
    }

    // Test 4: opcode strings as stored in the opcode column
    #[test]
    fn test_opcode_strings() {
        assert_eq!(OpCode::Reply.to_string(), "OP_REPLY");
        assert_eq!(OpCode::Msg.to_string(), "OP_MSG");
        assert_eq!(OpCode::KillCursors.to_string(), "OP_KILL_CURSORS");
        assert_eq!(OpCode::Unknown(9999).to_string(), "Unknown: 9999");
    }

    // Test 5: opcode i32 round trip
    #[test]
    fn test_opcode_roundtrip() {
        for code in [1, 2001, 2002, 2004, 2005, 2006, 2007, 2012, 2013, 42] {
            assert_eq!(OpCode::from_i32(code).as_i32(), code);
        }
    }
}
