//! Transport seam — how the control plane reaches the network.
//!
//! The transport owns identity, address resolution, and connection
//! establishment; the control plane only accepts inbound streams and opens
//! outbound ones. Streams are plain async byte pipes — framing and codecs
//! live above, in [`crate::stream`].

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use rill_core::PeerId;

use crate::error::TransportError;

pub mod mem;

/// A byte-stream transport between peers.
pub trait Transport: Send + Sync + 'static {
    /// One bidirectional stream to a remote peer.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// This peer's identity on the transport.
    fn local_peer(&self) -> PeerId;

    /// Wait for the next inbound stream and the identity of its opener.
    fn accept(
        &self,
    ) -> impl Future<Output = Result<(PeerId, Self::Stream), TransportError>> + Send;

    /// Open a fresh stream to a remote peer for the given protocol.
    fn open(
        &self,
        remote: PeerId,
        protocol: &str,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>> + Send;
}
