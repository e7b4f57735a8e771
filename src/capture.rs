//! Capture loop and pipeline.
//!
//! The capture task owns the reader, the assembler and every per-flow
//! framer; the sink task owns the storage backend. They meet at a bounded
//! channel, so a slow sink backpressures capture instead of growing an
//! unbounded queue. Packet events are batched capture-side, message
//! events sink-side.

use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};

use mongopacket_core::stream::{Assembler, FlowKey, TcpFlags};
use mongopacket_core::{MessageEvent, PacketEvent};

use crate::error::Result;
use crate::frame::decode_frame;
use crate::pcap::CaptureFile;
use crate::sink::Storage;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port of the MongoDB service; traffic touching it is framed.
    pub mongo_port: u16,
    /// Heartbeat between idle-flow sweeps, capture-time microseconds.
    pub flush_interval_us: i64,
    /// Flows quiescent longer than this are completed, microseconds.
    pub flush_idle_us: i64,
    /// Packet events per storage batch.
    pub packet_batch_size: usize,
    /// Message events per storage batch.
    pub message_batch_size: usize,
    /// Group tag attached to every event.
    pub group: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_port: 27017,
            flush_interval_us: 10_000_000,
            flush_idle_us: 60_000_000,
            packet_batch_size: 50_000,
            message_batch_size: 50_000,
            group: String::new(),
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct CaptureStats {
    /// Frames read from the capture source.
    pub frames: u64,
    /// Frames that decoded as Ethernet/IPv4/TCP.
    pub tcp_segments: u64,
    /// Message events emitted.
    pub messages: u64,
}

/// Work items crossing from the capture task to the sink task.
enum SinkItem {
    Packets(Vec<PacketEvent>),
    Message(Box<MessageEvent>),
}

/// Depth of the capture → sink channel.
const CHANNEL_DEPTH: usize = 1024;

/// Drive the full pipeline: frames in, TSV/columnar rows out.
///
/// Returns when the capture source reports end of file (all flows
/// flushed, sink drained, storage flushed) or fails, which is the only
/// fatal error.
pub fn run<S>(mut capture: CaptureFile, storage: S, config: Config) -> Result<CaptureStats>
where
    S: Storage + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<SinkItem>(CHANNEL_DEPTH);
    let message_batch_size = config.message_batch_size;
    let sink = thread::spawn(move || sink_task(rx, storage, message_batch_size));

    let send = |item: SinkItem| {
        if tx.send(item).is_err() {
            // The sink hung up; events are dropped but capture continues.
            warn!("sink task is gone, dropping events");
        }
    };

    let mut assembler = Assembler::new().with_group(config.group.clone());
    let mut packet_batch: Vec<PacketEvent> = Vec::with_capacity(config.packet_batch_size);
    let mut stats = CaptureStats::default();
    let mut packet_id = 0u64;
    let mut last_flush_us: Option<i64> = None;

    let fatal = loop {
        let frame = match capture.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(frames = stats.frames, "end of capture");
                break None;
            }
            Err(e) => break Some(e),
        };
        stats.frames += 1;
        if stats.frames % 10_000 == 0 {
            info!(frames = stats.frames, "frames processed");
        }

        // Non-TCP/IP traffic leaks into captures; skip it silently.
        let segment = match decode_frame(&frame.data) {
            Some(segment) => segment,
            None => {
                debug!(frame = frame.frame_number, "skipping non-tcp frame");
                continue;
            }
        };
        stats.tcp_segments += 1;
        let ts = frame.timestamp_us;

        // Heartbeat: complete flows that have gone quiet.
        match last_flush_us {
            None => last_flush_us = Some(ts),
            Some(last) if ts - last >= config.flush_interval_us => {
                for event in assembler.flush_older_than(ts - config.flush_idle_us) {
                    stats.messages += 1;
                    send(SinkItem::Message(Box::new(event)));
                }
                last_flush_us = Some(ts);
            }
            Some(_) => {}
        }

        packet_id += 1;
        packet_batch.push(PacketEvent {
            group: config.group.clone(),
            packet_id,
            time_us: ts,
            src: segment.src,
            src_port: segment.src_port,
            dst: segment.dst,
            dst_port: segment.dst_port,
            seq: segment.seq,
            ack: segment.ack,
            flag_syn: segment.flags.syn,
            flag_fin: segment.flags.fin,
            flag_rst: segment.flags.rst,
            flag_psh: segment.flags.psh,
            flag_ack: segment.flags.ack,
            payload_len: segment.payload.len() as u32,
            captured_len: frame.captured_length,
        });
        if packet_batch.len() >= config.packet_batch_size {
            send(SinkItem::Packets(std::mem::take(&mut packet_batch)));
        }

        // Only traffic touching the MongoDB port is reassembled.
        if segment.src_port == config.mongo_port || segment.dst_port == config.mongo_port {
            let key = FlowKey {
                src: segment.src,
                src_port: segment.src_port,
                dst: segment.dst,
                dst_port: segment.dst_port,
            };
            let flags = TcpFlags {
                syn: segment.flags.syn,
                fin: segment.flags.fin,
                rst: segment.flags.rst,
            };
            for event in assembler.process_segment(key, segment.seq, flags, segment.payload, ts) {
                stats.messages += 1;
                send(SinkItem::Message(Box::new(event)));
            }
        }
    };

    // EOF or fatal capture error: emit whatever the flows still hold,
    // then let the sink drain and commit.
    for event in assembler.flush_all() {
        stats.messages += 1;
        send(SinkItem::Message(Box::new(event)));
    }
    if !packet_batch.is_empty() {
        send(SinkItem::Packets(packet_batch));
    }
    drop(send);
    drop(tx);
    if sink.join().is_err() {
        warn!("sink task panicked");
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// Sink task: batch message events, write both event kinds, flush on
/// shutdown. Storage failures are logged and never stall the pipeline.
fn sink_task<S: Storage>(rx: mpsc::Receiver<SinkItem>, mut storage: S, message_batch_size: usize) {
    let mut batch: Vec<MessageEvent> = Vec::new();

    while let Ok(item) = rx.recv() {
        match item {
            SinkItem::Packets(events) => {
                if let Err(e) = storage.save_packet_events(&events) {
                    warn!(error = %e, count = events.len(), "packet event write failed");
                }
            }
            SinkItem::Message(event) => {
                batch.push(*event);
                if batch.len() >= message_batch_size {
                    if let Err(e) = storage.save_message_events(&batch) {
                        warn!(error = %e, count = batch.len(), "message event write failed");
                    }
                    batch.clear();
                }
            }
        }
    }

    // Sender disconnected: residual batch, then a durable flush.
    if !batch.is_empty() {
        if let Err(e) = storage.save_message_events(&batch) {
            warn!(error = %e, count = batch.len(), "message event write failed");
        }
    }
    if let Err(e) = storage.flush() {
        warn!(error = %e, "storage flush failed");
    }
}
