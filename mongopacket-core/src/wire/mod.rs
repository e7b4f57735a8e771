//! MongoDB wire-protocol decoding.
//!
//! The entry point is [`decode_message`], which takes one correctly-sized
//! message slice (as established by the framer's length-prefix check) and
//! returns a typed [`Operation`]. Compressed messages are transparently
//! unwrapped first; all integer framing fields are little-endian.

mod compress;
mod cursor;
mod header;
mod operation;

pub use compress::{
    COMPRESSOR_NOOP, COMPRESSOR_SNAPPY, COMPRESSOR_ZLIB, COMPRESSOR_ZSTD,
};
pub use cursor::Cursor;
pub use header::{Header, OpCode, HEADER_LEN, MAX_MESSAGE_SIZE};
pub use operation::{
    Delete, GetMore, Insert, KillCursors, Msg, MsgSection, Operation, Query, Reply, Update,
    MSG_FLAG_CHECKSUM_PRESENT, MSG_FLAG_EXHAUST_ALLOWED, MSG_FLAG_MORE_TO_COME,
};

/// Maximum size of a single BSON document.
pub const MAX_DOCUMENT_SIZE: i32 = 16 * 1024 * 1024;

use crate::error::{DecodeError, Result};

/// Decode one framed message into a typed operation.
///
/// `data` must be exactly the `message_length` bytes the length prefix
/// promised. An opcode outside the closed set yields
/// [`DecodeError::UnsupportedOpcode`]; callers consume the message and
/// move on without treating it as stream corruption.
pub fn decode_message(data: &[u8]) -> Result<Operation> {
    let mut cur = Cursor::new(data);
    let mut header = Header::read(&mut cur)?;

    // Unwrap the compression envelope and continue on the decompressed
    // buffer as if the inner opcode had been read directly.
    let body: Vec<u8>;
    let mut cur = if header.compressed {
        body = compress::decompress(&mut cur, &mut header)?;
        Cursor::new(&body)
    } else {
        cur
    };

    match header.opcode {
        OpCode::Reply => operation::Reply::read(&mut cur, header).map(Operation::Reply),
        OpCode::Update => operation::Update::read(&mut cur, header).map(Operation::Update),
        OpCode::Insert => operation::Insert::read(&mut cur, header).map(Operation::Insert),
        OpCode::Query => operation::Query::read(&mut cur, header).map(Operation::Query),
        OpCode::GetMore => operation::GetMore::read(&mut cur, header).map(Operation::GetMore),
        OpCode::Delete => operation::Delete::read(&mut cur, header).map(Operation::Delete),
        OpCode::KillCursors => {
            operation::KillCursors::read(&mut cur, header).map(Operation::KillCursors)
        }
        OpCode::Msg => operation::Msg::read(&mut cur, header).map(Operation::Msg),
        // A nested OP_COMPRESSED or an opcode outside the closed set:
        // the body is discarded without erroring the stream.
        OpCode::Compressed | OpCode::Unknown(_) => Err(DecodeError::UnsupportedOpcode {
            opcode: header.opcode.as_i32(),
            message_length: header.message_length,
        }),
    }
}
