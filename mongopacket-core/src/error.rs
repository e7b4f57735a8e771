//! Error types for mongopacket-core.
//!
//! [`DecodeError`] covers everything that can go wrong while turning a
//! framed byte slice into a typed operation. None of these are fatal to a
//! capture run: the framer recovers per-flow and the stream continues.

use thiserror::Error;

/// Errors produced while decoding a framed wire-protocol message.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Ran off the end of the message while reading a field.
    #[error("{context}: need {needed} bytes, have {have}")]
    Truncated {
        context: &'static str,
        needed: usize,
        have: usize,
    },

    /// BSON document length prefix outside (0, 16 MiB].
    #[error("bad document size {length}")]
    BadDocumentLength { length: i32 },

    /// C-string missing its NUL terminator or not valid UTF-8.
    #[error("bad c-string: {reason}")]
    BadCString { reason: &'static str },

    /// BSON payload failed to decode.
    #[error("bson decode: {0}")]
    Bson(#[from] bson::de::Error),

    /// OP_MSG section kind outside the defined set {0, 1}.
    #[error("unknown op_msg section kind {kind}")]
    BadSectionKind { kind: u8 },

    /// OP_COMPRESSED compressor id outside the defined set {0, 1, 2, 3}.
    #[error("unknown compressor id {id}")]
    UnknownCompressor { id: u8 },

    /// Decompression of an OP_COMPRESSED body failed.
    #[error("decompress ({codec}): {reason}")]
    Decompress {
        codec: &'static str,
        reason: String,
    },

    /// Valid header, but the opcode is not in the closed set. The caller
    /// skips the message body; this is not a stream-level resync event.
    #[error("unsupported opcode {opcode} message size {message_length}")]
    UnsupportedOpcode { opcode: i32, message_length: i32 },
}

impl DecodeError {
    /// True when the message was well-framed but carried an opcode outside
    /// the closed set. Such messages are consumed without emitting an event.
    pub fn is_unsupported_opcode(&self) -> bool {
        matches!(self, DecodeError::UnsupportedOpcode { .. })
    }
}

/// Result type alias using [`DecodeError`].
pub type Result<T> = std::result::Result<T, DecodeError>;
