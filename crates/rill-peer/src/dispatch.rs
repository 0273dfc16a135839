//! Inbound datagram dispatch.
//!
//! Validates the datagram's channel reference, walks its messages in
//! sequence order, routes each by opcode, and applies handshake transitions
//! to the store. The first failing message aborts the rest of the datagram.
//!
//! Dispatch mutates the store but never touches the transport: replies come
//! back as [`OutboundDatagram`] values for the caller to send after the
//! store lock is released.

use rill_core::wire::{Datagram, Handshake, Message, Opcode, Payload};
use rill_core::{short_id, ChannelId, PeerId};

use crate::error::{MessageError, PeerError, ProtocolError};
use crate::handshake::{self, HandshakeAction};
use crate::store::{ChannelState, ChannelStore};

/// A datagram the dispatcher wants sent once its store mutations commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDatagram {
    pub remote: PeerId,
    pub datagram: Datagram,
}

/// Handle one inbound datagram from `remote` against the store.
///
/// The caller holds the store lock for the whole call, so channel creation
/// and swarm membership updates commit atomically with respect to other
/// stream handler tasks.
pub fn handle_datagram(
    store: &mut ChannelStore,
    datagram: &Datagram,
    remote: PeerId,
) -> Result<Vec<OutboundDatagram>, PeerError> {
    if datagram.messages.is_empty() {
        return Err(ProtocolError::EmptyDatagram.into());
    }

    let channel = datagram.channel;
    let mut outbound = Vec::new();
    for message in &datagram.messages {
        // Re-checked per message: an earlier message in the batch may have
        // closed the channel.
        if channel != 0 && store.lookup(channel).is_none() {
            return Err(ProtocolError::ChannelNotFound(channel).into());
        }
        if let Some(reply) = handle_message(store, channel, message, remote)? {
            outbound.push(reply);
        }
    }
    Ok(outbound)
}

/// Route one message by opcode.
fn handle_message(
    store: &mut ChannelStore,
    channel: ChannelId,
    message: &Message,
    remote: PeerId,
) -> Result<Option<OutboundDatagram>, PeerError> {
    match &message.payload {
        Payload::Handshake(h) if message.op == Opcode::Handshake => {
            handle_handshake(store, channel, h, remote)
        }
        _ => Err(MessageError::BadOpcode {
            channel,
            op: message.op.into(),
        }
        .into()),
    }
}

/// Feed a handshake through the state machine and apply the result.
fn handle_handshake(
    store: &mut ChannelStore,
    channel: ChannelId,
    h: &Handshake,
    remote: PeerId,
) -> Result<Option<OutboundDatagram>, PeerError> {
    let state = if channel == 0 {
        None
    } else {
        Some(
            store
                .lookup(channel)
                .ok_or(ProtocolError::ChannelNotFound(channel))?
                .state,
        )
    };

    match handshake::transition(channel, state, h)? {
        HandshakeAction::Admit {
            remote_channel,
            swarm,
        } => {
            let local = store.allocate_id()?;
            if let Err(e) =
                store.create_channel(local, swarm, remote_channel, ChannelState::Ready, remote)
            {
                store.release_id(local);
                return Err(e.into());
            }
            tracing::debug!(
                channel = local,
                remote_channel,
                swarm,
                remote = %short_id(&remote),
                "admitted channel, moving to ready"
            );
            // Reply with our id, addressed to the channel the peer requested.
            let reply = Datagram::single(
                remote_channel,
                Message::handshake(Handshake {
                    channel: local,
                    swarm,
                }),
            );
            Ok(Some(OutboundDatagram {
                remote,
                datagram: reply,
            }))
        }
        HandshakeAction::Establish { remote_channel } => {
            let chan = store
                .lookup_mut(channel)
                .ok_or(ProtocolError::ChannelNotFound(channel))?;
            chan.remote_channel = remote_channel;
            chan.state = ChannelState::Ready;
            tracing::debug!(channel, remote_channel, "handshake reply received, channel ready");
            Ok(None)
        }
        HandshakeAction::Close => {
            store.remove_channel(channel);
            tracing::debug!(channel, "received closing handshake, channel removed");
            Ok(None)
        }
    }
}
