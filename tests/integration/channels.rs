//! Channel and swarm lifecycle rules as seen through the peer API.

use crate::*;

use rill_core::{peer_id_from_name, SwarmId};
use rill_peer::transport::mem::MemNetwork;
use rill_peer::{ChannelState, PeerError, ProtocolError, SendError, TransportError};

const SWARM: SwarmId = 42;

/// A channel can only join a swarm that was registered first.
#[tokio::test]
async fn start_handshake_requires_registered_swarm() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    // alice never calls add_swarm

    let err = a.peer.start_handshake(b.id(), SWARM).await.unwrap_err();
    assert!(matches!(
        err,
        PeerError::Protocol(ProtocolError::UnknownSwarm(SWARM))
    ));
    assert_eq!(a.peer.channel_for_peer(SWARM, &b.id()).await, None);

    a.stop();
    b.stop();
}

/// Closing without an established channel reports the missing mapping.
#[tokio::test]
async fn closing_without_a_channel_fails() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    a.peer.add_swarm(SWARM).await;

    let err = a
        .peer
        .send_closing_handshake(b.id(), SWARM)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PeerError::Protocol(ProtocolError::NoChannelForPeer { swarm: SWARM, .. })
    ));

    a.stop();
    b.stop();
}

/// The request send can fail at the transport; the local channel stays in
/// wait_handshake for the caller to tear down or retry.
#[tokio::test]
async fn send_to_unknown_transport_peer_keeps_channel() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    a.peer.add_swarm(SWARM).await;

    let ghost = peer_id_from_name(b"ghost"); // never registered on the fabric
    let err = a.peer.start_handshake(ghost, SWARM).await.unwrap_err();
    assert!(matches!(
        err,
        PeerError::Send(SendError::Transport(TransportError::UnknownPeer(_)))
    ));

    let cid = a
        .peer
        .channel_for_peer(SWARM, &ghost)
        .await
        .expect("channel is kept after a failed send");
    let chan = a.peer.channel(cid).await.unwrap();
    assert_eq!(chan.state, ChannelState::WaitHandshake);
    assert_eq!(chan.remote_channel, 0);

    a.stop();
}

/// One peer pair, two swarms — two independent channels.
#[tokio::test]
async fn two_swarms_two_channels() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    for swarm in [7, SWARM] {
        a.peer.add_swarm(swarm).await;
        b.peer.add_swarm(swarm).await;
    }

    let cid_7 = a.peer.start_handshake(b.id(), 7).await.unwrap();
    let cid_42 = a.peer.start_handshake(b.id(), SWARM).await.unwrap();
    assert_ne!(cid_7, cid_42);

    let chan_7 = wait_for_state(&a.peer, cid_7, ChannelState::Ready)
        .await
        .unwrap();
    let chan_42 = wait_for_state(&a.peer, cid_42, ChannelState::Ready)
        .await
        .unwrap();
    assert_eq!(chan_7.swarm, 7);
    assert_eq!(chan_42.swarm, SWARM);
    assert_eq!(a.peer.channel_for_peer(7, &b.id()).await, Some(cid_7));
    assert_eq!(a.peer.channel_for_peer(SWARM, &b.id()).await, Some(cid_42));

    // closing one swarm's channel leaves the other untouched
    a.peer.send_closing_handshake(b.id(), 7).await.unwrap();
    assert_eq!(a.peer.channel_for_peer(7, &b.id()).await, None);
    assert_eq!(a.peer.channel_for_peer(SWARM, &b.id()).await, Some(cid_42));

    a.stop();
    b.stop();
}

/// Closing a channel returns its local id to the allocator; the next
/// handshake reuses it.
#[tokio::test]
async fn closed_channel_id_is_recycled() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    a.peer.add_swarm(SWARM).await;
    b.peer.add_swarm(SWARM).await;

    let first = a.peer.start_handshake(b.id(), SWARM).await.unwrap();
    wait_for_state(&a.peer, first, ChannelState::Ready)
        .await
        .unwrap();
    a.peer.send_closing_handshake(b.id(), SWARM).await.unwrap();
    wait_for_removal(&a.peer, first).await.unwrap();

    let second = a.peer.start_handshake(b.id(), SWARM).await.unwrap();
    assert_eq!(second, first, "released id should be reused");
    wait_for_state(&a.peer, second, ChannelState::Ready)
        .await
        .unwrap();

    a.stop();
    b.stop();
}
