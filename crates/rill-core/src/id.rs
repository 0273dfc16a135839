//! Peer identity — an opaque 32-byte id supplied by the transport layer.

/// Peer identifier. Transports own the derivation (key hash, name hash, …);
/// the control plane only compares and logs it.
pub type PeerId = [u8; 32];

/// Derive a PeerId from a canonical name.
/// Used by in-process transports and tests; stable for a given input.
pub fn peer_id_from_name(name: &[u8]) -> PeerId {
    *blake3::hash(name).as_bytes()
}

/// Abbreviated hex rendering for log fields.
pub fn short_id(id: &PeerId) -> String {
    hex::encode(&id[..6])
}
