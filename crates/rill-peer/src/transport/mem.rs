//! In-process transport fabric.
//!
//! Endpoints register on a shared [`MemNetwork`] under name-derived peer
//! ids; opening a stream hands the far end of a duplex pipe to the remote
//! endpoint's accept queue. This is what the integration tests drive — the
//! control plane never knows it is not on a real network.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};

use rill_core::{peer_id_from_name, short_id, PeerId};

use super::Transport;
use crate::error::TransportError;

/// Pipe buffer per direction. Comfortably above one maximum datagram frame.
const PIPE_CAPACITY: usize = 128 * 1024;

type IncomingTx = mpsc::UnboundedSender<(PeerId, DuplexStream)>;

/// The fabric — a registry of endpoints reachable by peer id.
pub struct MemNetwork {
    endpoints: DashMap<PeerId, IncomingTx>,
}

impl MemNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
        })
    }

    /// Register an endpoint under a name-derived peer id.
    /// Re-registering a name replaces the previous endpoint's accept queue.
    pub fn endpoint(self: &Arc<Self>, name: &str) -> MemEndpoint {
        let id = peer_id_from_name(name.as_bytes());
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(id, tx);
        MemEndpoint {
            net: Arc::clone(self),
            id,
            incoming: Mutex::new(rx),
        }
    }
}

/// One peer's attachment to the fabric.
pub struct MemEndpoint {
    net: Arc<MemNetwork>,
    id: PeerId,
    incoming: Mutex<mpsc::UnboundedReceiver<(PeerId, DuplexStream)>>,
}

impl Transport for MemEndpoint {
    type Stream = DuplexStream;

    fn local_peer(&self) -> PeerId {
        self.id
    }

    fn accept(
        &self,
    ) -> impl Future<Output = Result<(PeerId, DuplexStream), TransportError>> + Send {
        async move {
            self.incoming
                .lock()
                .await
                .recv()
                .await
                .ok_or(TransportError::Closed)
        }
    }

    fn open(
        &self,
        remote: PeerId,
        protocol: &str,
    ) -> impl Future<Output = Result<DuplexStream, TransportError>> + Send {
        async move {
            let tx = self
                .net
                .endpoints
                .get(&remote)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| TransportError::UnknownPeer(short_id(&remote)))?;
            let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
            tracing::trace!(remote = %short_id(&remote), protocol, "opening in-memory stream");
            tx.send((self.id, far)).map_err(|_| TransportError::Closed)?;
            Ok(near)
        }
    }
}
