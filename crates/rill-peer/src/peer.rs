//! Peer orchestrator.
//!
//! Binds the transport's inbound streams to the dispatcher (one handler task
//! per accepted stream) and exposes the channel lifecycle — swarm
//! registration, handshake initiation, closing — to callers. Outbound sends
//! open a fresh stream per datagram; every blocking stream operation runs
//! under the configured io deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use rill_core::config::RillConfig;
use rill_core::wire::{CodecRegistry, Datagram, Handshake, Message};
use rill_core::{short_id, ChannelId, PeerId, SwarmId};

use crate::dispatch;
use crate::error::{PeerError, ProtocolError, SendError, TransportError};
use crate::store::{Channel, ChannelState, ChannelStore, SharedStore};
use crate::stream::FramedStream;
use crate::transport::Transport;

/// A protocol peer: the channel/swarm store, the payload codec registry,
/// and a handle to the transport.
pub struct Peer<T: Transport> {
    transport: T,
    store: SharedStore,
    registry: CodecRegistry,
    protocol_id: String,
    io_timeout: Duration,
    max_datagram: usize,
}

impl<T: Transport> Peer<T> {
    pub fn new(transport: T, config: &RillConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            store: ChannelStore::shared(),
            registry: CodecRegistry::standard(),
            protocol_id: config.network.protocol_id.clone(),
            io_timeout: config.io_timeout(),
            max_datagram: config.protocol.max_datagram_bytes,
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.transport.local_peer()
    }

    /// Register a swarm. Idempotent; channels can only join known swarms.
    pub async fn add_swarm(&self, swarm: SwarmId) {
        self.store.lock().await.add_swarm(swarm);
    }

    /// Accept inbound streams until shutdown, spawning one handler task per
    /// stream. A failing handler takes down only its own stream.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(peer = %short_id(&self.local_peer()), "peer listener shutting down");
                    return;
                }

                accepted = self.transport.accept() => {
                    let (remote, stream) = match accepted {
                        Ok(pair) => pair,
                        Err(TransportError::Closed) => {
                            tracing::info!("transport closed, stopping listener");
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let peer = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = peer.handle_stream(remote, stream).await {
                            tracing::warn!(
                                remote = %short_id(&remote),
                                error = %e,
                                "stream handler failed"
                            );
                        }
                    });
                }
            }
        }
    }

    /// Handle one inbound stream: read a datagram, dispatch it, send replies.
    async fn handle_stream(&self, remote: PeerId, stream: T::Stream) -> Result<(), PeerError> {
        let mut framed = FramedStream::new(stream, self.max_datagram);
        let datagram = timeout(self.io_timeout, framed.read_datagram(&self.registry))
            .await
            .map_err(|_| PeerError::Timeout(self.io_timeout))??;
        tracing::debug!(
            remote = %short_id(&remote),
            channel = datagram.channel,
            messages = datagram.messages.len(),
            "received datagram"
        );

        // Transitions are computed under the store lock; replies go out
        // after it is released.
        let outbound = {
            let mut store = self.store.lock().await;
            dispatch::handle_datagram(&mut store, &datagram, remote)?
        };
        for out in outbound {
            self.send_datagram(out.remote, &out.datagram).await?;
        }
        Ok(())
    }

    /// Open a channel to `remote` in `swarm`.
    ///
    /// Allocates a local id, enters wait_handshake, and sends the request
    /// handshake addressed to the peer's channel 0. On send failure the
    /// channel stays in wait_handshake for the caller to tear down.
    pub async fn start_handshake(
        &self,
        remote: PeerId,
        swarm: SwarmId,
    ) -> Result<ChannelId, PeerError> {
        let ours = {
            let mut store = self.store.lock().await;
            let ours = store.allocate_id()?;
            // their channel id is 0 until they reply with a handshake
            if let Err(e) = store.create_channel(ours, swarm, 0, ChannelState::Begin, remote) {
                store.release_id(ours);
                return Err(e.into());
            }
            if let Some(chan) = store.lookup_mut(ours) {
                chan.state = ChannelState::WaitHandshake;
            }
            ours
        };

        tracing::debug!(
            channel = ours,
            swarm,
            remote = %short_id(&remote),
            "starting handshake"
        );
        let request = Datagram::single(
            0,
            Message::handshake(Handshake {
                channel: ours,
                swarm,
            }),
        );
        self.send_datagram(remote, &request).await?;
        Ok(ours)
    }

    /// Close the channel to `remote` in `swarm`.
    ///
    /// Sends a handshake with channel id 0 addressed to the peer's recorded
    /// channel; once the send succeeds, the local channel and its swarm
    /// membership entry are removed together.
    pub async fn send_closing_handshake(
        &self,
        remote: PeerId,
        swarm: SwarmId,
    ) -> Result<(), PeerError> {
        let (ours, theirs) = {
            let store = self.store.lock().await;
            let ours = store.channel_for_peer(swarm, &remote).ok_or_else(|| {
                ProtocolError::NoChannelForPeer {
                    swarm,
                    peer: short_id(&remote),
                }
            })?;
            let theirs = store
                .lookup(ours)
                .map(|c| c.remote_channel)
                .ok_or(ProtocolError::ChannelNotFound(ours))?;
            (ours, theirs)
        };

        tracing::debug!(
            channel = ours,
            swarm,
            remote = %short_id(&remote),
            "sending closing handshake"
        );
        let closing = Datagram::single(
            theirs,
            Message::handshake(Handshake { channel: 0, swarm }),
        );
        self.send_datagram(remote, &closing).await?;
        self.store.lock().await.remove_channel(ours);
        Ok(())
    }

    /// Encode and write one datagram on a fresh stream to the peer.
    async fn send_datagram(&self, remote: PeerId, datagram: &Datagram) -> Result<(), SendError> {
        let stream = timeout(self.io_timeout, self.transport.open(remote, &self.protocol_id))
            .await
            .map_err(|_| SendError::Timeout(self.io_timeout))??;
        let mut framed = FramedStream::new(stream, self.max_datagram);
        timeout(self.io_timeout, framed.write_datagram(&self.registry, datagram))
            .await
            .map_err(|_| SendError::Timeout(self.io_timeout))??;
        tracing::trace!(
            remote = %short_id(&remote),
            channel = datagram.channel,
            "datagram flushed"
        );
        Ok(())
    }

    /// Snapshot of a channel record, if it exists.
    pub async fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.store.lock().await.lookup(id).cloned()
    }

    /// The local channel id serving `remote` in `swarm`, if any.
    pub async fn channel_for_peer(&self, swarm: SwarmId, remote: &PeerId) -> Option<ChannelId> {
        self.store.lock().await.channel_for_peer(swarm, remote)
    }
}
