//! mongopacket CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mongopacket::cli::{Args, SinkKind};
use mongopacket::pcap::CaptureFile;
use mongopacket::sink::TsvStorage;
use mongopacket::capture;

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let capture_file = CaptureFile::open(&args.file)
        .with_context(|| format!("failed to open capture file: {}", args.file.display()))?;

    let prefix = args.out_prefix();
    let stats = match args.sink {
        SinkKind::Tsv => {
            let storage = TsvStorage::create(&prefix).with_context(|| {
                format!("failed to create output files at prefix {}", prefix.display())
            })?;
            capture::run(capture_file, storage, args.config())?
        }
    };

    eprintln!(
        "{} frames ({} tcp), {} message events -> {}-events.tsv / {}-packets.tsv",
        stats.frames,
        stats.tcp_segments,
        stats.messages,
        prefix.display(),
        prefix.display(),
    );
    Ok(())
}
