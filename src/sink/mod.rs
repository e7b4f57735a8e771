//! Storage sinks for packet and message events.
//!
//! The capture pipeline is sink-agnostic: anything implementing
//! [`Storage`] can receive event batches. Sink failures are logged by the
//! pipeline and never stall capture; `flush` is called once on shutdown.

mod tsv;

pub use tsv::TsvStorage;

use mongopacket_core::{MessageEvent, PacketEvent};

use crate::error::SinkError;

/// Contract the pipeline requires from a storage backend.
pub trait Storage {
    /// Persist a batch of packet events.
    fn save_packet_events(&mut self, batch: &[PacketEvent]) -> Result<(), SinkError>;

    /// Persist a batch of message events.
    fn save_message_events(&mut self, batch: &[MessageEvent]) -> Result<(), SinkError>;

    /// Durably commit pending writes.
    fn flush(&mut self) -> Result<(), SinkError>;
}
