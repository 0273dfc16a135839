//! Error taxonomy for the rill control plane.
//!
//! `ProtocolError` covers state-machine and dispatch rule violations,
//! `MessageError` opcode-level problems on an otherwise valid channel,
//! `SendError` outbound transport/stream failures, and `PeerError` is the
//! union surfaced by stream handlers. A handler error terminates only the
//! offending stream; the peer stays alive.

use std::time::Duration;

use rill_core::wire::{ChannelId, DecodeError, EncodeError, SwarmId};

/// State-machine or dispatch rule violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("no messages in datagram")]
    EmptyDatagram,

    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("handshake cannot request channel ID 0")]
    ZeroChannelRequest,

    #[error("starting handshake must use channel 0")]
    StartNotOnChannelZero,

    #[error("got non-closing handshake while ready on channel {0}")]
    UnexpectedHandshake(ChannelId),

    #[error("no swarm registered with id {0}")]
    UnknownSwarm(SwarmId),

    #[error("cannot create channel with reserved id 0")]
    ReservedChannelId,

    #[error("channel id space exhausted")]
    IdSpaceExhausted,

    #[error("no channel to peer {peer} in swarm {swarm}")]
    NoChannelForPeer { swarm: SwarmId, peer: String },
}

/// A message that cannot be routed on its channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("bad opcode {op} on channel {channel}")]
    BadOpcode { channel: ChannelId, op: u8 },
}

/// Transport-level failure establishing or accepting streams.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(String),

    #[error("transport closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure on the outbound send path.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("stream write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("datagram body of {0} bytes exceeds the frame limit")]
    Oversized(usize),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Union of everything a stream handler can report.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("receive timed out after {0:?}")]
    Timeout(Duration),
}
