//! IBC packet lifecycle model: event extraction and send/ack correlation.

pub mod correlator;
pub mod events;
pub mod time;
pub mod types;

pub use correlator::{CorrelatorStats, PacketCorrelator};
pub use events::extract_packet_events;
pub use types::*;
