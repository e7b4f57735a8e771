//! Link/IP/TCP frame decoding.
//!
//! One fixed chain: Ethernet → IPv4 → TCP. Anything else (ARP, IPv6, UDP,
//! trailing DNS noise) is skipped by returning `None` - non-TCP traffic
//! routinely leaks into captures and must not error the run.

use std::net::IpAddr;

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, TcpHeaderSlice};

/// EtherType for IPv4.
const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol number for TCP.
const IP_PROTO_TCP: u8 = 6;

/// TCP flags carried through to packet events and the reassembler.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpSegmentFlags {
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
}

/// A decoded TCP segment, payload borrowed from the frame.
#[derive(Debug)]
pub struct TcpSegment<'a> {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpSegmentFlags,
    pub payload: &'a [u8],
}

/// Decode an Ethernet/IPv4/TCP frame. Returns `None` for any frame
/// outside that chain or too short to parse.
pub fn decode_frame(data: &[u8]) -> Option<TcpSegment<'_>> {
    let eth = Ethernet2HeaderSlice::from_slice(data).ok()?;
    if eth.ether_type().0 != ETHERTYPE_IPV4 {
        return None;
    }
    let ip_data = &data[eth.slice().len()..];

    let ipv4 = Ipv4HeaderSlice::from_slice(ip_data).ok()?;
    if ipv4.protocol().0 != IP_PROTO_TCP {
        return None;
    }
    let ip_header_len = ipv4.slice().len();
    let tcp_data = &ip_data[ip_header_len..];

    let tcp = TcpHeaderSlice::from_slice(tcp_data).ok()?;
    let tcp_header_len = tcp.slice().len();

    // Clamp the payload to the IPv4 total length: short Ethernet frames
    // are padded to 60 bytes and the padding must not reach the framer.
    let ip_payload_len = (ipv4.total_len() as usize).saturating_sub(ip_header_len);
    let payload_len = ip_payload_len
        .saturating_sub(tcp_header_len)
        .min(tcp_data.len() - tcp_header_len);
    let payload = &tcp_data[tcp_header_len..tcp_header_len + payload_len];

    Some(TcpSegment {
        src: IpAddr::V4(ipv4.source_addr()),
        dst: IpAddr::V4(ipv4.destination_addr()),
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        seq: tcp.sequence_number(),
        ack: tcp.acknowledgment_number(),
        flags: TcpSegmentFlags {
            syn: tcp.syn(),
            fin: tcp.fin(),
            rst: tcp.rst(),
            psh: tcp.psh(),
            ack: tcp.ack(),
        },
        payload,
    })
}
