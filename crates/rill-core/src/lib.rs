//! rill-core — wire format, identifiers, and configuration.
//! All other rill crates depend on this one.

pub mod config;
pub mod id;
pub mod wire;

pub use id::{peer_id_from_name, short_id, PeerId};
pub use wire::{ChannelId, Datagram, Handshake, Message, Opcode, Payload, SwarmId};
