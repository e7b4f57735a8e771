//! TSV storage backend.
//!
//! Two tab-delimited files, one row per event, header row first:
//! `<prefix>-packets.tsv` and `<prefix>-events.tsv`. Booleans render as
//! 0/1, timestamps as microseconds since epoch, and the `op` / `packets`
//! columns as JSON.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use mongopacket_core::{MessageEvent, PacketEvent};

use super::Storage;
use crate::error::SinkError;

/// Writer buffer size (16MB, large batches stream through).
const WRITE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const EVENTS_HEADER: &[&str] = &[
    "group",
    "event_id",
    "start_time_us",
    "end_time_us",
    "stream_id",
    "stream_start",
    "stream_end",
    "request_id",
    "response_to",
    "src",
    "src_port",
    "dst",
    "dst_port",
    "opcode",
    "op",
    "packets",
];

const PACKETS_HEADER: &[&str] = &[
    "group",
    "packet_id",
    "time_us",
    "seq",
    "ack",
    "src",
    "src_port",
    "dst",
    "dst_port",
    "flag_syn",
    "flag_fin",
    "flag_rst",
    "flag_psh",
    "flag_ack",
    "size",
];

/// TSV-file storage for packet and message events.
pub struct TsvStorage {
    events: BufWriter<File>,
    packets: BufWriter<File>,
}

impl TsvStorage {
    /// Create `<prefix>-events.tsv` and `<prefix>-packets.tsv`, truncating
    /// existing files, and write the header rows.
    pub fn create(prefix: &Path) -> Result<Self, SinkError> {
        let events = init_tsv(prefix, "events", EVENTS_HEADER)?;
        let packets = init_tsv(prefix, "packets", PACKETS_HEADER)?;
        Ok(Self { events, packets })
    }
}

impl Storage for TsvStorage {
    fn save_message_events(&mut self, batch: &[MessageEvent]) -> Result<(), SinkError> {
        for event in batch {
            let header = event.op.header();
            let op = serde_json::to_string(&event.op)?;
            let packets = serde_json::to_string(&event.packets)?;

            let row = [
                event.group.clone(),
                event.event_id.to_string(),
                event.start_us.to_string(),
                event.end_us.to_string(),
                event.stream_id.to_string(),
                bit(event.stream_start).to_string(),
                bit(event.stream_end).to_string(),
                header.request_id.to_string(),
                header.response_to.to_string(),
                event.src.to_string(),
                event.src_port.to_string(),
                event.dst.to_string(),
                event.dst_port.to_string(),
                header.opcode.to_string(),
                op,
                packets,
            ];
            write_row(&mut self.events, &row)?;
        }
        Ok(())
    }

    fn save_packet_events(&mut self, batch: &[PacketEvent]) -> Result<(), SinkError> {
        for event in batch {
            let row = [
                event.group.clone(),
                event.packet_id.to_string(),
                event.time_us.to_string(),
                event.seq.to_string(),
                event.ack.to_string(),
                event.src.to_string(),
                event.src_port.to_string(),
                event.dst.to_string(),
                event.dst_port.to_string(),
                bit(event.flag_syn).to_string(),
                bit(event.flag_fin).to_string(),
                bit(event.flag_rst).to_string(),
                bit(event.flag_psh).to_string(),
                bit(event.flag_ack).to_string(),
                event.payload_len.to_string(),
            ];
            write_row(&mut self.packets, &row)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.events.flush()?;
        self.packets.flush()?;
        Ok(())
    }
}

fn bit(b: bool) -> u8 {
    b as u8
}

fn init_tsv(prefix: &Path, name: &str, header: &[&str]) -> Result<BufWriter<File>, SinkError> {
    let mut path = prefix.as_os_str().to_os_string();
    path.push(format!("-{name}.tsv"));
    let file = File::create(path)?;
    let mut out = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    write_row(&mut out, header)?;
    Ok(out)
}

fn write_row<W: Write, S: AsRef<str>>(out: &mut W, row: &[S]) -> Result<(), SinkError> {
    for (i, field) in row.iter().enumerate() {
        if i > 0 {
            out.write_all(b"\t")?;
        }
        out.write_all(field.as_ref().as_bytes())?;
    }
    out.write_all(b"\n")?;
    Ok(())
}
