//! rill-peer — channel lifecycle, handshake state machine, and the peer
//! orchestrator of the rill control plane.

pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod peer;
pub mod store;
pub mod stream;
pub mod transport;

pub use error::{MessageError, PeerError, ProtocolError, SendError, TransportError};
pub use peer::Peer;
pub use store::{Channel, ChannelState, ChannelStore, SharedStore};
pub use transport::{mem::MemNetwork, Transport};
