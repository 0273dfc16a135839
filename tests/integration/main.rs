//! rill integration test harness.
//!
//! Tests drive complete peers over the in-memory transport fabric — each
//! peer runs its real accept loop, streams are real duplex pipes, and every
//! datagram goes through the full encode → frame → decode → dispatch path.
//! No real network is involved, so tests need no privileges and cannot
//! interfere with each other: every test builds its own fabric.

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use rill_core::config::RillConfig;
use rill_core::{ChannelId, PeerId, SwarmId};
use rill_peer::transport::mem::{MemEndpoint, MemNetwork};
use rill_peer::{Channel, ChannelState, Peer};

mod channels;

/// How long helpers poll before declaring a scenario stuck.
pub const WAIT: Duration = Duration::from_secs(2);

// ── Harness ──────────────────────────────────────────────────────────────────

static INIT: Once = Once::new();

/// Install a tracing subscriber once, honoring RUST_LOG.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A peer with its accept loop running, plus the shutdown handle.
pub struct RunningPeer {
    pub peer: Arc<Peer<MemEndpoint>>,
    shutdown: broadcast::Sender<()>,
}

impl RunningPeer {
    pub fn id(&self) -> PeerId {
        self.peer.local_peer()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Spawn a named peer on the fabric with its listener running.
pub fn spawn_peer(net: &Arc<MemNetwork>, name: &str) -> RunningPeer {
    init_tracing();
    let peer = Peer::new(net.endpoint(name), &RillConfig::default());
    let (shutdown, rx) = broadcast::channel(1);
    tokio::spawn(Arc::clone(&peer).run(rx));
    RunningPeer { peer, shutdown }
}

/// Poll until the channel exists and reaches `state`.
pub async fn wait_for_state(
    peer: &Arc<Peer<MemEndpoint>>,
    id: ChannelId,
    state: ChannelState,
) -> Result<Channel> {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(chan) = peer.channel(id).await {
            if chan.state == state {
                return Ok(chan);
            }
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for channel {id} to reach {state:?}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the peer has a channel serving `remote` in `swarm`.
pub async fn wait_for_peer_channel(
    peer: &Arc<Peer<MemEndpoint>>,
    swarm: SwarmId,
    remote: &PeerId,
) -> Result<ChannelId> {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(id) = peer.channel_for_peer(swarm, remote).await {
            return Ok(id);
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for a channel in swarm {swarm}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the channel disappears from the peer's store.
pub async fn wait_for_removal(peer: &Arc<Peer<MemEndpoint>>, id: ChannelId) -> Result<()> {
    let deadline = Instant::now() + WAIT;
    loop {
        if peer.channel(id).await.is_none() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for channel {id} to be removed");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Two peers on one fabric get distinct identities.
#[tokio::test]
async fn peers_have_distinct_identities() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    assert_ne!(a.id(), b.id());
    a.stop();
    b.stop();
}

/// Shutdown stops the accept loop; a request sent afterwards is buffered by
/// the fabric but never answered, so the channel stays in wait_handshake.
#[tokio::test]
async fn shutdown_stops_listener() {
    let net = MemNetwork::new();
    let a = spawn_peer(&net, "alice");
    let b = spawn_peer(&net, "bob");
    for p in [&a, &b] {
        p.peer.add_swarm(42).await;
    }

    b.stop();
    sleep(Duration::from_millis(50)).await;

    let cid = a.peer.start_handshake(b.id(), 42).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let chan = a.peer.channel(cid).await.expect("channel should survive");
    assert_eq!(chan.state, ChannelState::WaitHandshake);
    a.stop();
}
