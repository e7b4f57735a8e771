//! Per half-flow TCP reassembly.
//!
//! A [`StreamBuffer`] accepts raw segments in capture order and delivers
//! [`Reassembly`] runs in sequence-space order: retransmits are dropped,
//! overlaps trimmed, out-of-order segments parked until the hole fills.
//! A run with `skip > 0` is only produced by a forced flush across a
//! sequence gap, and tells the framer the byte stream is no longer
//! contiguous at that point.

use std::collections::BTreeMap;

/// An ordered byte run delivered to the framer.
#[derive(Debug, Clone)]
pub struct Reassembly {
    pub bytes: Vec<u8>,
    /// Capture timestamp of the delivering segment, microseconds.
    pub seen: i64,
    /// True exactly once per flow: the first run of a flow whose initial
    /// SYN was captured.
    pub start: bool,
    /// The delivering segment carried FIN or RST.
    pub end: bool,
    /// Number of sequence bytes lost immediately before this run.
    pub skip: u32,
}

/// TCP flags relevant to reassembly and lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
}

/// An out-of-order segment waiting for the hole before it to fill.
#[derive(Debug)]
struct ParkedSegment {
    data: Vec<u8>,
    seen: i64,
    end: bool,
}

/// Reassembly buffer for one TCP half-flow.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Next expected sequence number.
    expected_seq: u32,
    /// Initial sequence number, from SYN or adopted from the first segment.
    initial_seq: Option<u32>,
    /// The flow's opening SYN was captured.
    syn_seen: bool,
    /// A run has been delivered (the start flag fires at most once).
    delivered_any: bool,
    /// Out-of-order segments keyed by sequence number.
    parked: BTreeMap<u32, ParkedSegment>,
    /// FIN or RST observed.
    pub closed: bool,
    /// Statistics.
    pub segment_count: u32,
    pub retransmit_count: u32,
    pub out_of_order_count: u32,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one TCP segment, returning the runs that became deliverable.
    pub fn add_segment(
        &mut self,
        seq: u32,
        data: &[u8],
        flags: TcpFlags,
        seen: i64,
    ) -> Vec<Reassembly> {
        let mut runs = Vec::new();

        if flags.syn && self.initial_seq.is_none() {
            self.syn_seen = true;
            self.initial_seq = Some(seq);
            self.expected_seq = seq.wrapping_add(1); // SYN consumes one seq
        }

        let ended = flags.fin || flags.rst;
        if ended {
            self.closed = true;
        }

        if data.is_empty() {
            // Pure ACK/SYN carry no payload; a bare FIN/RST still delivers
            // an empty run so the framer can mark the stream end.
            if ended {
                runs.push(self.make_run(Vec::new(), seen, true, 0));
            }
            return runs;
        }

        self.segment_count += 1;

        // Mid-stream capture: adopt the first segment's sequence.
        if self.initial_seq.is_none() {
            self.initial_seq = Some(seq);
            self.expected_seq = seq;
        }

        let mut seq = seq;
        let mut data = data;
        if seq_lt(seq, self.expected_seq) {
            let overlap = self.expected_seq.wrapping_sub(seq) as usize;
            if overlap >= data.len() {
                // Pure retransmit of bytes already delivered.
                self.retransmit_count += 1;
                if ended {
                    runs.push(self.make_run(Vec::new(), seen, true, 0));
                }
                return runs;
            }
            // Partial overlap: trim the already-delivered prefix.
            data = &data[overlap..];
            seq = self.expected_seq;
        }

        if seq == self.expected_seq {
            self.expected_seq = seq_add(seq, data.len());
            runs.push(self.make_run(data.to_vec(), seen, ended, 0));
            self.drain_parked(&mut runs);
        } else {
            // Hole before this segment; park it.
            self.out_of_order_count += 1;
            self.parked.insert(
                seq,
                ParkedSegment {
                    data: data.to_vec(),
                    seen,
                    end: ended,
                },
            );
        }

        runs
    }

    /// Forcibly deliver parked segments across sequence gaps. Used when a
    /// flow is flushed: missing bytes are assumed lost, and the first run
    /// after each gap carries the skipped byte count.
    pub fn flush(&mut self) -> Vec<Reassembly> {
        let mut runs = Vec::new();
        while let Some((&seq, _)) = self.parked.first_key_value() {
            let gap = seq.wrapping_sub(self.expected_seq);
            let parked = self.parked.remove(&seq).unwrap();
            self.expected_seq = seq_add(seq, parked.data.len());
            runs.push(self.make_run(parked.data, parked.seen, parked.end, gap));
            self.drain_parked(&mut runs);
        }
        runs
    }

    /// Bytes parked out of order (buffered memory for this half-flow).
    pub fn parked_bytes(&self) -> usize {
        self.parked.values().map(|s| s.data.len()).sum()
    }

    fn make_run(&mut self, bytes: Vec<u8>, seen: i64, end: bool, skip: u32) -> Reassembly {
        let start = self.syn_seen && !self.delivered_any;
        self.delivered_any = true;
        Reassembly {
            bytes,
            seen,
            start,
            end,
            skip,
        }
    }

    /// Deliver parked segments that the advancing edge has reached.
    fn drain_parked(&mut self, runs: &mut Vec<Reassembly>) {
        while let Some((&seq, _)) = self.parked.first_key_value() {
            if seq == self.expected_seq {
                let parked = self.parked.remove(&seq).unwrap();
                self.expected_seq = seq_add(seq, parked.data.len());
                runs.push(self.make_run(parked.data, parked.seen, parked.end, 0));
            } else if seq_lt(seq, self.expected_seq) {
                // Late retransmit that got parked; superseded.
                self.parked.remove(&seq);
                self.retransmit_count += 1;
            } else {
                break; // Still a hole.
            }
        }
    }
}

// Sequence number comparison helpers (wrapping 32-bit space).
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

fn seq_add(a: u32, n: usize) -> u32 {
    a.wrapping_add(n as u32)
}
