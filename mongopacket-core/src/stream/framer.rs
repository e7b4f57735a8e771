//! Per-flow message framing.
//!
//! The framer turns ordered byte runs into complete wire-protocol
//! messages using the 4-byte length prefix. It copes with capture starting
//! mid-stream, messages fragmented across many packets, several messages
//! per packet, and corrupt framing, applying the recovery rules:
//!
//! - A run with `skip > 0` discards any in-progress message.
//! - An out-of-range length prefix drops the whole pending payload.
//! - A failed decode drops the oldest contributing fragment and rebuilds
//!   the buffer from the rest (the corruption usually sits at the front),
//!   or drops everything when only one fragment is pending.

use tracing::{debug, warn};

use crate::event::{MessageEvent, PacketFragment};
use crate::wire::{self, Operation, MAX_MESSAGE_SIZE};

use super::reassembly::Reassembly;
use super::{Counters, FlowKey};

/// Stream lifecycle: `Unknown` until the first run arrives, `Starting`
/// once the run carrying the flow's SYN is seen, `Running` after the next
/// append so only the first emitted event carries `stream_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartState {
    Unknown,
    Starting,
    Running,
}

/// One run's contribution to the pending payload. The bytes are retained
/// so the buffer can be rebuilt when the oldest fragment is dropped.
#[derive(Debug, Clone)]
struct Fragment {
    seen: i64,
    start: bool,
    end: bool,
    bytes: Vec<u8>,
}

/// Bytes accumulated toward a not-yet-complete message, with the packets
/// that contributed them.
#[derive(Debug, Default)]
struct PendingPayload {
    /// The stream start marker must survive an otherwise empty payload.
    start: bool,
    data: Vec<u8>,
    packets: Vec<Fragment>,
}

/// Message framer for one TCP half-flow.
#[derive(Debug)]
pub struct MessageFramer {
    stream_id: u64,
    key: FlowKey,
    group: String,
    started: StartState,
    pending: Option<PendingPayload>,
    /// Total runs and bytes seen, for diagnostics.
    packets: u64,
    bytes: u64,
}

impl MessageFramer {
    pub fn new(stream_id: u64, key: FlowKey, group: String) -> Self {
        Self {
            stream_id,
            key,
            group,
            started: StartState::Unknown,
            pending: None,
            packets: 0,
            bytes: 0,
        }
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// True while bytes (or a start marker) are buffered toward an
    /// incomplete message.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume a batch of ordered runs, emitting one event per complete,
    /// decodable message.
    pub fn on_reassembled(
        &mut self,
        runs: Vec<Reassembly>,
        ids: &mut Counters,
    ) -> Vec<MessageEvent> {
        let mut events = Vec::new();
        let mut curr = self.pending.take();

        for run in runs {
            self.packets += 1;
            self.bytes += run.bytes.len() as u64;

            if run.skip > 0 && curr.is_some() {
                // Bytes before this run are no longer contiguous.
                warn!(
                    stream = self.stream_id,
                    skipped = run.skip,
                    "gap in stream, dropping partial message"
                );
                curr = None;
            }

            if run.start && self.started == StartState::Unknown {
                self.started = StartState::Starting;
            }

            let payload = curr.get_or_insert_with(PendingPayload::default);
            payload.start = self.started == StartState::Starting;
            payload.data.extend_from_slice(&run.bytes);
            payload.packets.push(Fragment {
                seen: run.seen,
                start: run.start,
                end: run.end,
                bytes: run.bytes,
            });

            if self.started == StartState::Starting {
                self.started = StartState::Running;
            }

            self.frame_pending(&mut curr, ids, &mut events);
        }

        // Keep the payload while bytes remain, or while it still carries
        // the stream-start marker for the next message.
        self.pending = curr.filter(|p| !p.data.is_empty() || p.start);
        events
    }

    /// Frame as many complete messages as the pending buffer holds.
    fn frame_pending(
        &mut self,
        curr: &mut Option<PendingPayload>,
        ids: &mut Counters,
        events: &mut Vec<MessageEvent>,
    ) {
        loop {
            let payload = match curr.as_ref() {
                Some(p) => p,
                None => return,
            };
            if payload.data.len() < 4 {
                return; // Need more bytes for the length prefix.
            }

            let message_length =
                i32::from_le_bytes(payload.data[..4].try_into().expect("4-byte prefix"));
            if message_length < 0 || message_length > MAX_MESSAGE_SIZE {
                warn!(
                    stream = self.stream_id,
                    message_length, "bad message length, dropping pending payload"
                );
                *curr = None;
                return;
            }
            let message_length = message_length as usize;
            if payload.data.len() < message_length {
                return; // Message still incomplete.
            }

            // A complete message is framed; this consumes an event id even
            // when the decode fails.
            let event_id = ids.next_event();
            match wire::decode_message(&payload.data[..message_length]) {
                Ok(op) => {
                    events.push(self.build_event(event_id, op, &payload.packets));
                    Self::carry_over(curr, message_length);
                }
                Err(err) if err.is_unsupported_opcode() => {
                    // Well-framed but outside the closed opcode set: skip
                    // the body, no event, the stream continues.
                    debug!(stream = self.stream_id, %err, "skipping message");
                    Self::carry_over(curr, message_length);
                }
                Err(err) => {
                    warn!(
                        stream = self.stream_id,
                        message_length, %err,
                        "undecodable message"
                    );
                    let payload = curr.as_mut().expect("pending payload");
                    if payload.packets.len() > 1 {
                        // Drop the oldest fragment and rebuild; retry only
                        // once the next run arrives.
                        payload.packets.remove(0);
                        payload.data = payload
                            .packets
                            .iter()
                            .flat_map(|f| f.bytes.iter().copied())
                            .collect();
                    } else {
                        *curr = None;
                    }
                    return;
                }
            }
        }
    }

    /// Advance past an emitted (or skipped) message. Residual bytes start
    /// a new payload credited to the fragment that delivered the tail.
    fn carry_over(curr: &mut Option<PendingPayload>, consumed: usize) {
        let payload = curr.take().expect("pending payload");
        if payload.data.len() > consumed {
            let data = payload.data[consumed..].to_vec();
            let last = payload
                .packets
                .last()
                .cloned()
                .expect("payload with bytes has fragments");
            *curr = Some(PendingPayload {
                start: false,
                data,
                packets: vec![last],
            });
        }
    }

    fn build_event(&self, event_id: u64, op: Operation, fragments: &[Fragment]) -> MessageEvent {
        let mut start_us = i64::MAX;
        let mut end_us = i64::MIN;
        let mut stream_start = false;
        let mut stream_end = false;
        let mut packets = Vec::with_capacity(fragments.len());
        for f in fragments {
            start_us = start_us.min(f.seen);
            end_us = end_us.max(f.seen);
            stream_start |= f.start;
            stream_end |= f.end;
            packets.push(PacketFragment {
                time_us: f.seen,
                start: f.start,
                end: f.end,
                length: f.bytes.len() as u32,
            });
        }

        MessageEvent {
            group: self.group.clone(),
            event_id,
            stream_id: self.stream_id,
            src: self.key.src,
            src_port: self.key.src_port,
            dst: self.key.dst,
            dst_port: self.key.dst_port,
            start_us,
            end_us,
            stream_start,
            stream_end,
            op,
            packets,
        }
    }
}
