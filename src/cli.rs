//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::capture::Config;

/// Storage backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Tab-separated files: `<prefix>-events.tsv`, `<prefix>-packets.tsv`
    Tsv,
}

/// Reconstruct MongoDB wire-protocol conversations from packet captures.
#[derive(Parser, Debug)]
#[command(name = "mongopacket")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file to read (pcap or pcapng)
    #[arg(value_name = "CAPTURE_FILE")]
    pub file: PathBuf,

    /// Group tag attached to every emitted event
    #[arg(long = "group", default_value = "")]
    pub group: String,

    /// TCP port of the MongoDB service
    #[arg(long = "mongo-port", default_value = "27017")]
    pub mongo_port: u16,

    /// Storage backend for events
    #[arg(long = "sink", value_enum, default_value = "tsv")]
    pub sink: SinkKind,

    /// Output path prefix (defaults to the capture file without extension)
    #[arg(long = "out-prefix", value_name = "PREFIX")]
    pub out_prefix: Option<PathBuf>,

    /// Complete flows idle for more than this many capture-time seconds
    #[arg(long = "flush-idle", default_value = "60", value_name = "SECONDS")]
    pub flush_idle: u64,

    /// Seconds of capture time between idle-flow sweeps
    #[arg(long = "flush-interval", default_value = "10", value_name = "SECONDS")]
    pub flush_interval: u64,

    /// Packet events per storage batch
    #[arg(long = "packet-batch-size", default_value = "50000")]
    pub packet_batch_size: usize,

    /// Message events per storage batch
    #[arg(long = "message-batch-size", default_value = "50000")]
    pub message_batch_size: usize,

    /// Enable verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Pipeline configuration from the parsed flags.
    pub fn config(&self) -> Config {
        Config {
            mongo_port: self.mongo_port,
            flush_interval_us: (self.flush_interval as i64) * 1_000_000,
            flush_idle_us: (self.flush_idle as i64) * 1_000_000,
            packet_batch_size: self.packet_batch_size,
            message_batch_size: self.message_batch_size,
            group: self.group.clone(),
        }
    }

    /// Output prefix: explicit flag, or the capture path minus extension.
    pub fn out_prefix(&self) -> PathBuf {
        self.out_prefix
            .clone()
            .unwrap_or_else(|| self.file.with_extension(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: defaults match the documented configuration surface
    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["mongopacket", "capture.pcap"]);
        assert_eq!(args.mongo_port, 27017);
        assert_eq!(args.sink, SinkKind::Tsv);
        assert_eq!(args.flush_idle, 60);
        assert_eq!(args.flush_interval, 10);
        assert_eq!(args.packet_batch_size, 50_000);
        assert_eq!(args.message_batch_size, 50_000);
        assert_eq!(args.out_prefix(), PathBuf::from("capture"));
    }

    // Test 2: flags map into the pipeline config
    #[test]
    fn test_config_mapping() {
        let args = Args::parse_from([
            "mongopacket",
            "cap.pcapng",
            "--group",
            "prod-7",
            "--mongo-port",
            "27018",
            "--flush-interval",
            "5",
            "--flush-idle",
            "30",
        ]);
        let config = args.config();
        assert_eq!(config.group, "prod-7");
        assert_eq!(config.mongo_port, 27018);
        assert_eq!(config.flush_interval_us, 5_000_000);
        assert_eq!(config.flush_idle_us, 30_000_000);
    }

    // Test 3: explicit out-prefix wins
    #[test]
    fn test_out_prefix_flag() {
        let args = Args::parse_from(["mongopacket", "cap.pcap", "--out-prefix", "/tmp/run1"]);
        assert_eq!(args.out_prefix(), PathBuf::from("/tmp/run1"));
    }
}
