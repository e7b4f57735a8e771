//! # mongopacket-core
//!
//! Engine-agnostic reconstruction of MongoDB wire-protocol conversations
//! from reassembled TCP byte streams.
//!
//! This crate contains everything that does not touch the capture device or
//! the storage backend:
//!
//! - **Wire decoding**: parsing framed message blobs into typed
//!   [`Operation`] records for every defined opcode, including transparent
//!   decompression of `OP_COMPRESSED` envelopes (snappy, zlib, zstd).
//! - **Stream reassembly**: ordering TCP segments per half-flow and
//!   delivering contiguous byte runs, coping with retransmits, overlaps and
//!   sequence gaps.
//! - **Message framing**: accumulating byte runs into complete messages via
//!   the 4-byte length prefix, resynchronizing after loss or corruption.
//! - **Events**: the [`PacketEvent`] / [`MessageEvent`] records handed to
//!   storage sinks.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      mongopacket-core                        |
//! +--------------------------------------------------------------+
//! |  wire/    - header, opcodes, per-op readers, decompression   |
//! |  stream/  - TCP reassembly, per-flow message framer          |
//! |  event/   - PacketEvent, MessageEvent, fragment descriptors  |
//! |  error/   - DecodeError                                      |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mongopacket_core::stream::Assembler;
//!
//! let assembler = Assembler::new().with_group("capture-1");
//! // Feed TCP segments as they are captured:
//! // let events = assembler.process_segment(key, seq, flags, payload, seen_us);
//! assert_eq!(assembler.flow_count(), 0);
//! ```

pub mod error;
pub mod event;
pub mod stream;
pub mod wire;

pub use error::DecodeError;
pub use event::{MessageEvent, PacketEvent, PacketFragment};
pub use stream::{Assembler, Counters, FlowKey, MessageFramer, Reassembly, StreamBuffer, TcpFlags};
pub use wire::{decode_message, Header, OpCode, Operation};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
