//! Per-peer channel and swarm state.
//!
//! The store is the single authority for which channels exist, which swarm
//! each serves, and which remote peer sits on the other end. It is shared
//! between all stream handler tasks as [`SharedStore`]; every multi-step
//! mutation (create channel + update swarm membership, close channel + drop
//! membership) happens under one lock acquisition.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use rill_core::{ChannelId, PeerId, SwarmId};

use crate::error::ProtocolError;

/// Shared store handle, one per peer.
pub type SharedStore = Arc<Mutex<ChannelStore>>;

/// Per-channel protocol state local to a peer.
///
/// Transitions move forward only; the terminal close removes the channel
/// from the store instead of adding a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel created locally, request handshake not yet sent.
    Begin,
    /// Request sent, waiting for the peer's reply handshake.
    WaitHandshake,
    /// Channel usable.
    Ready,
}

/// Current state of one logical channel.
#[derive(Debug, Clone)]
pub struct Channel {
    /// The swarm this channel is communicating for.
    pub swarm: SwarmId,
    /// Remote id to stamp on outgoing datagrams; 0 until the peer replies.
    pub remote_channel: ChannelId,
    pub state: ChannelState,
    /// Identity of the peer on the other end.
    pub remote_peer: PeerId,
}

/// Collision-free local channel id generator.
///
/// Monotonic counter starting at 1, with released ids tracked for reuse.
/// Never yields 0 — that value is the wire-level "no channel yet" marker.
#[derive(Debug)]
struct ChannelIdAllocator {
    next: ChannelId,
    released: BTreeSet<ChannelId>,
}

impl ChannelIdAllocator {
    fn new() -> Self {
        Self {
            next: 1,
            released: BTreeSet::new(),
        }
    }

    fn allocate(&mut self) -> Option<ChannelId> {
        if let Some(id) = self.released.pop_first() {
            return Some(id);
        }
        // next == 0 means the counter wrapped: the space is exhausted
        if self.next == 0 {
            return None;
        }
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        Some(id)
    }

    fn release(&mut self, id: ChannelId) {
        if id != 0 {
            self.released.insert(id);
        }
    }
}

/// Authoritative channel and swarm-membership state for one peer.
pub struct ChannelStore {
    /// All live channels, indexed by local channel id. Never contains key 0.
    channels: HashMap<ChannelId, Channel>,
    /// Swarm membership: remote peer → local channel id, per registered swarm.
    swarms: HashMap<SwarmId, HashMap<PeerId, ChannelId>>,
    allocator: ChannelIdAllocator,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            swarms: HashMap::new(),
            allocator: ChannelIdAllocator::new(),
        }
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Register a swarm. Idempotent; existing membership is untouched.
    pub fn add_swarm(&mut self, swarm: SwarmId) {
        self.swarms.entry(swarm).or_default();
    }

    pub fn has_swarm(&self, swarm: SwarmId) -> bool {
        self.swarms.contains_key(&swarm)
    }

    /// Hand out an unused local channel id (always ≥ 1).
    pub fn allocate_id(&mut self) -> Result<ChannelId, ProtocolError> {
        self.allocator
            .allocate()
            .ok_or(ProtocolError::IdSpaceExhausted)
    }

    /// Return an id obtained from [`allocate_id`] that never became a channel.
    pub fn release_id(&mut self, id: ChannelId) {
        self.allocator.release(id);
    }

    /// Insert a channel under `local` and record it in the swarm's
    /// membership map, as one operation.
    ///
    /// Fails if `local` is the reserved id 0 or the swarm was never
    /// registered; nothing is inserted on failure.
    pub fn create_channel(
        &mut self,
        local: ChannelId,
        swarm: SwarmId,
        remote_channel: ChannelId,
        state: ChannelState,
        remote_peer: PeerId,
    ) -> Result<(), ProtocolError> {
        if local < 1 {
            return Err(ProtocolError::ReservedChannelId);
        }
        let members = self
            .swarms
            .get_mut(&swarm)
            .ok_or(ProtocolError::UnknownSwarm(swarm))?;
        members.insert(remote_peer, local);
        self.channels.insert(
            local,
            Channel {
                swarm,
                remote_channel,
                state,
                remote_peer,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, local: ChannelId) -> Option<&Channel> {
        self.channels.get(&local)
    }

    pub fn lookup_mut(&mut self, local: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&local)
    }

    /// Remove a channel, its swarm-membership entry, and return its id to
    /// the allocator. No-op on unknown ids.
    pub fn remove_channel(&mut self, local: ChannelId) -> Option<Channel> {
        let channel = self.channels.remove(&local)?;
        if let Some(members) = self.swarms.get_mut(&channel.swarm) {
            // only drop the mapping if it still points at this channel
            if members.get(&channel.remote_peer) == Some(&local) {
                members.remove(&channel.remote_peer);
            }
        }
        self.allocator.release(local);
        Some(channel)
    }

    /// The local channel id serving `peer` in `swarm`, if one exists.
    pub fn channel_for_peer(&self, swarm: SwarmId, peer: &PeerId) -> Option<ChannelId> {
        self.swarms.get(&swarm)?.get(peer).copied()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}
