//! rill wire format — datagrams, messages, and the payload codec registry.
//!
//! These types ARE the protocol. A datagram is one batch of messages written
//! atomically to a stream; messages are processed in sequence order, never
//! reordered. Framing is two-layer: the outer envelope is generically
//! self-describing (`{op, data}` pairs inside a JSON datagram body), while
//! each `data` blob carries an opcode-specific binary encoding resolved
//! through [`CodecRegistry`]. Payload shapes differ per opcode, so the outer
//! layer stays opaque about them and the registry performs the second,
//! opcode-specific decode step.
//!
//! Inner payload structs are #[repr(C)] with explicit big-endian fields and
//! zerocopy derives for deterministic, allocation-free layout. There is no
//! unsafe code in this module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Local identifier for a logical channel, unique within a peer.
///
/// Value 0 is reserved: it never names a live channel. It appears only as the
/// datagram channel of an initial handshake request (the rendezvous point for
/// channels that do not exist yet) and as the requested channel id meaning
/// "no channel yet" or "close".
pub type ChannelId = u32;

/// Identifies a content swarm a peer participates in. Opaque beyond identity.
pub type SwarmId = u32;

// ── Opcodes ──────────────────────────────────────────────────────────────────

/// Message type discriminant.
///
/// Message type table:
///
///   | value  | type        |
///   |--------|-------------|
///   | 13     | HANDSHAKE   |
///   | 0-254  | unassigned (payload opcodes: DATA, ACK, HAVE, …) |
///   | 255    | reserved    |
///
/// HANDSHAKE deliberately sits at 13 rather than its conventional slot so it
/// stands out when eyeballing decoded datagrams; peers speaking this wire
/// format expect that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Handshake = 13,
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            13 => Ok(Opcode::Handshake),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

// ── Handshake payload ────────────────────────────────────────────────────────

/// Handshake message payload.
///
/// `channel` is the sender's local channel id (≥ 1) when opening or replying;
/// 0 signals a closing handshake. `swarm` names the swarm the channel serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub channel: ChannelId,
    pub swarm: SwarmId,
}

/// On-wire layout of a handshake payload blob.
///
/// Wire size: 8 bytes, both fields big-endian.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
struct HandshakeWire {
    channel: U32<BigEndian>,
    swarm: U32<BigEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(HandshakeWire, [u8; 8]);

// ── Messages and datagrams ───────────────────────────────────────────────────

/// A decoded message payload. The concrete shape is selected by the opcode;
/// only the handshake shape is registered in this control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Handshake(Handshake),
}

impl Payload {
    /// The opcode this payload is carried under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Payload::Handshake(_) => Opcode::Handshake,
        }
    }
}

/// A protocol message: opcode tag plus the payload it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub op: Opcode,
    pub payload: Payload,
}

impl Message {
    /// Build a handshake message with the opcode set from the payload.
    pub fn handshake(h: Handshake) -> Self {
        Self {
            op: Opcode::Handshake,
            payload: Payload::Handshake(h),
        }
    }
}

/// One batch of messages addressed to a channel, exchanged per stream write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// The receiver's local channel id, or 0 for an initial handshake.
    pub channel: ChannelId,
    pub messages: Vec<Message>,
}

impl Datagram {
    /// A datagram carrying a single message.
    pub fn single(channel: ChannelId, message: Message) -> Self {
        Self {
            channel,
            messages: vec![message],
        }
    }
}

// ── Outer envelope ───────────────────────────────────────────────────────────

/// Outer message envelope: fixed two-field structure, payload left opaque.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    op: u8,
    data: Vec<u8>,
}

/// Outer datagram body as serialized into the stream frame.
#[derive(Serialize, Deserialize)]
struct WireDatagram {
    channel: u32,
    messages: Vec<WireMessage>,
}

// ── Payload codecs ───────────────────────────────────────────────────────────

/// Encoder/decoder for the payload blob of one opcode.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, EncodeError>;
    fn decode(&self, data: &[u8]) -> Result<Payload, DecodeError>;
}

struct HandshakeCodec;

impl PayloadCodec for HandshakeCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, EncodeError> {
        match payload {
            Payload::Handshake(h) => {
                let wire = HandshakeWire {
                    channel: U32::new(h.channel),
                    swarm: U32::new(h.swarm),
                };
                Ok(wire.as_bytes().to_vec())
            }
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Payload, DecodeError> {
        let wire = HandshakeWire::read_from(data).ok_or(DecodeError::BadPayload {
            op: Opcode::Handshake.into(),
            len: data.len(),
        })?;
        Ok(Payload::Handshake(Handshake {
            channel: wire.channel.get(),
            swarm: wire.swarm.get(),
        }))
    }
}

/// Maps opcodes to payload codecs and drives datagram encode/decode.
///
/// Registration is explicit: an opcode with no codec cannot be encoded or
/// decoded. [`CodecRegistry::standard`] registers the handshake codec only.
pub struct CodecRegistry {
    codecs: HashMap<u8, Box<dyn PayloadCodec>>,
}

impl CodecRegistry {
    /// An empty registry. Nothing encodes or decodes until registered.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// The registry with every opcode this control plane assigns.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Opcode::Handshake, Box::new(HandshakeCodec));
        registry
    }

    /// Register a codec for an opcode, replacing any previous entry.
    pub fn register(&mut self, op: Opcode, codec: Box<dyn PayloadCodec>) {
        self.codecs.insert(op.into(), codec);
    }

    /// Serialize a datagram into a stream-frame body.
    pub fn encode_datagram(&self, datagram: &Datagram) -> Result<Vec<u8>, EncodeError> {
        let mut messages = Vec::with_capacity(datagram.messages.len());
        for message in &datagram.messages {
            let op = u8::from(message.op);
            let codec = self
                .codecs
                .get(&op)
                .ok_or(EncodeError::UnsupportedPayload(op))?;
            messages.push(WireMessage {
                op,
                data: codec.encode(&message.payload)?,
            });
        }
        let body = WireDatagram {
            channel: datagram.channel,
            messages,
        };
        serde_json::to_vec(&body).map_err(EncodeError::Serialize)
    }

    /// Parse a stream-frame body back into a datagram.
    pub fn decode_datagram(&self, bytes: &[u8]) -> Result<Datagram, DecodeError> {
        let body: WireDatagram = serde_json::from_slice(bytes).map_err(DecodeError::Malformed)?;
        let mut messages = Vec::with_capacity(body.messages.len());
        for wire in &body.messages {
            let codec = self
                .codecs
                .get(&wire.op)
                .ok_or(DecodeError::UnknownOpcode(wire.op))?;
            messages.push(Message {
                op: Opcode::try_from(wire.op)?,
                payload: codec.decode(&wire.data)?,
            });
        }
        Ok(Datagram {
            channel: body.channel,
            messages,
        })
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Constants ────────────────────────────────────────────────────────────────

/// Protocol id announced when opening streams to a peer.
pub const PROTOCOL_ID: &str = "/rill/1.0.0";

/// Maximum encoded datagram body in bytes.
/// Validated against the frame length prefix before any allocation.
pub const MAX_DATAGRAM: usize = 65536;

/// Opcode value reserved by the protocol, never assignable.
pub const OPCODE_RESERVED: u8 = 255;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors from serializing a datagram for the wire.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("unsupported payload for opcode {0}")]
    UnsupportedPayload(u8),

    #[error("datagram serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("malformed datagram: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("bad payload blob for opcode {op}: {len} bytes")]
    BadPayload { op: u8, len: usize },

    #[error("datagram length {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

// ── Tests ────────────────────────────────────────────────────────────────────
