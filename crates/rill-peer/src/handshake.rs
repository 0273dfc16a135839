//! Handshake transition logic.
//!
//! Pure functions from (channel state, incoming handshake) to the action the
//! dispatcher must carry out. No store access and no I/O here — the
//! dispatcher owns both, which keeps every rule in the table below testable
//! in isolation.

use rill_core::wire::{ChannelId, Handshake, SwarmId};

use crate::error::ProtocolError;
use crate::store::ChannelState;

/// What the dispatcher must do after a handshake transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Admit a new channel: allocate a local id, enter ready, and reply with
    /// a handshake carrying that id.
    Admit {
        remote_channel: ChannelId,
        swarm: SwarmId,
    },
    /// Record the peer's channel id and move to ready.
    Establish { remote_channel: ChannelId },
    /// Closing handshake: remove the channel.
    Close,
}

/// Compute the transition for a handshake received on `channel`.
///
/// `state` is `None` when the datagram was addressed to channel 0, i.e. no
/// local channel exists yet and the handshake is an initial request.
pub fn transition(
    channel: ChannelId,
    state: Option<ChannelState>,
    h: &Handshake,
) -> Result<HandshakeAction, ProtocolError> {
    match state {
        // Incoming starting handshake on the rendezvous channel.
        None => {
            if h.channel < 1 {
                return Err(ProtocolError::ZeroChannelRequest);
            }
            Ok(HandshakeAction::Admit {
                remote_channel: h.channel,
                swarm: h.swarm,
            })
        }
        // A channel we created but never sent a request on cannot receive
        // handshakes addressed to it.
        Some(ChannelState::Begin) => Err(ProtocolError::StartNotOnChannelZero),
        Some(ChannelState::WaitHandshake) => {
            if h.channel == 0 {
                Ok(HandshakeAction::Close)
            } else {
                Ok(HandshakeAction::Establish {
                    remote_channel: h.channel,
                })
            }
        }
        Some(ChannelState::Ready) => {
            if h.channel == 0 {
                Ok(HandshakeAction::Close)
            } else {
                Err(ProtocolError::UnexpectedHandshake(channel))
            }
        }
    }
}
