//! Event records emitted toward analytical storage.
//!
//! Two kinds of events leave the pipeline: one [`PacketEvent`] per
//! captured frame, and one [`MessageEvent`] per successfully decoded
//! operation. All timestamps are microseconds since the Unix epoch.

use std::net::IpAddr;

use serde::Serialize;

use crate::wire::Operation;

/// Capture-time metadata for a single frame.
#[derive(Debug, Clone, Serialize)]
pub struct PacketEvent {
    /// Caller-supplied group tag.
    pub group: String,
    /// Monotonic index assigned in capture order.
    pub packet_id: u64,
    /// Capture timestamp, microseconds since epoch.
    pub time_us: i64,
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flag_syn: bool,
    pub flag_fin: bool,
    pub flag_rst: bool,
    pub flag_psh: bool,
    pub flag_ack: bool,
    /// TCP payload length.
    pub payload_len: u32,
    /// Captured frame length (may be less than the wire length).
    pub captured_len: u32,
}

/// One packet's contribution to a reconstructed message.
#[derive(Debug, Clone, Serialize)]
pub struct PacketFragment {
    /// When the contributing run was seen, microseconds since epoch.
    pub time_us: i64,
    /// The run carried the flow's initial SYN.
    pub start: bool,
    /// The run carried a terminating FIN or RST.
    pub end: bool,
    /// Bytes contributed.
    pub length: u32,
}

/// A reconstructed wire-protocol operation and its packetization.
#[derive(Debug, Serialize)]
pub struct MessageEvent {
    /// Caller-supplied group tag.
    pub group: String,
    /// Monotonic id across all flows, in framing order.
    pub event_id: u64,
    /// Per-flow stream id.
    pub stream_id: u64,
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
    /// Earliest `seen` time across contributing packets.
    pub start_us: i64,
    /// Latest `seen` time across contributing packets.
    pub end_us: i64,
    /// A contributing packet carried the flow's initial SYN.
    pub stream_start: bool,
    /// A contributing packet carried a terminating FIN or RST.
    pub stream_end: bool,
    /// The decoded operation.
    pub op: Operation,
    /// Per-packet fragments that assembled this message.
    pub packets: Vec<PacketFragment>,
}
