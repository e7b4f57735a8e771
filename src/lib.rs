//! # mongopacket
//!
//! Reconstruct MongoDB wire-protocol conversations from packet captures.
//!
//! Reads a pcap/pcapng file, reassembles the TCP flows touching the
//! MongoDB service port, decodes every wire-protocol message (including
//! compressed envelopes), and writes packet- and message-level event rows
//! to a storage sink for downstream analysis.
//!
//! ```text
//! capture file -> frame decode -> per-flow reassembly -> framer
//!      |                                                    |
//!      +-> packet events --------> sink <---- message events+
//! ```
//!
//! The protocol and framing internals live in [`mongopacket_core`]; this
//! crate adds the capture loop, frame decoding, storage sinks and CLI.

pub mod capture;
pub mod cli;
pub mod error;
pub mod frame;
pub mod pcap;
pub mod sink;

pub use capture::{CaptureStats, Config};
pub use error::{CaptureError, Error, Result, SinkError};
pub use pcap::{CaptureFile, RawFrame};
