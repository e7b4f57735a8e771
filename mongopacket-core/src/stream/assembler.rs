//! Flow table: one reassembly buffer and framer per TCP half-flow.

use std::collections::HashMap;

use tracing::debug;

use crate::event::MessageEvent;

use super::framer::MessageFramer;
use super::reassembly::{StreamBuffer, TcpFlags};
use super::{Counters, FlowKey};

struct Flow {
    buffer: StreamBuffer,
    framer: MessageFramer,
    /// Capture time of the last segment, microseconds.
    last_seen: i64,
}

/// Owns every tracked half-flow and the run-wide id counters.
///
/// Segments arrive in capture order; each half-flow's framer receives its
/// byte runs in sequence order. Within a flow, message events come out in
/// byte-stream order; across flows no ordering is promised.
#[derive(Default)]
pub struct Assembler {
    flows: HashMap<FlowKey, Flow>,
    counters: Counters,
    group: String,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a group tag to every emitted message event.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Feed one TCP segment, returning any completed message events.
    pub fn process_segment(
        &mut self,
        key: FlowKey,
        seq: u32,
        flags: TcpFlags,
        payload: &[u8],
        seen_us: i64,
    ) -> Vec<MessageEvent> {
        if !self.flows.contains_key(&key) {
            let stream_id = self.counters.next_stream();
            debug!(
                stream = stream_id,
                src = %key.src,
                src_port = key.src_port,
                dst = %key.dst,
                dst_port = key.dst_port,
                "new stream"
            );
            self.flows.insert(
                key,
                Flow {
                    buffer: StreamBuffer::new(),
                    framer: MessageFramer::new(stream_id, key, self.group.clone()),
                    last_seen: seen_us,
                },
            );
        }

        let flow = self.flows.get_mut(&key).expect("flow just inserted");
        flow.last_seen = seen_us;
        let runs = flow.buffer.add_segment(seq, payload, flags, seen_us);
        flow.framer.on_reassembled(runs, &mut self.counters)
    }

    /// Complete flows quiescent since `t_us`: force pending-but-ordered
    /// segments past any sequence gaps, frame what results, and reclaim
    /// the flow state.
    pub fn flush_older_than(&mut self, t_us: i64) -> Vec<MessageEvent> {
        let idle: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, flow)| flow.last_seen < t_us)
            .map(|(key, _)| *key)
            .collect();

        let mut events = Vec::new();
        for key in idle {
            let mut flow = self.flows.remove(&key).expect("idle flow present");
            let runs = flow.buffer.flush();
            events.extend(flow.framer.on_reassembled(runs, &mut self.counters));
        }
        events
    }

    /// Complete every flow (end of capture).
    pub fn flush_all(&mut self) -> Vec<MessageEvent> {
        self.flush_older_than(i64::MAX)
    }

    /// Number of currently tracked half-flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}
