// src/protocol/mod.rs

//! Wire codec: an 8-byte little-endian header followed by a typed payload.
//! Encoding is deterministic and decoding is total; adversarial input can
//! only produce a [`PacketError`], never a panic.

pub mod ack;
pub mod connect_accept;
pub mod connect_deny;
pub mod connect_request;
pub mod disconnect_notice;
pub mod game_packet;
pub mod message_identifiers;
pub mod packet;
pub mod packet_serializer;
pub mod packet_type_registry;
pub mod ping;
pub mod pong;
pub mod reconnect_request;
pub mod session_config;

pub use ack::Ack;
pub use connect_accept::ConnectAccept;
pub use connect_deny::ConnectDeny;
pub use connect_request::ConnectRequest;
pub use disconnect_notice::DisconnectNotice;
pub use game_packet::GamePacket;
pub use message_identifiers::MessageIdentifiers;
pub use packet::{Packet, PacketHeader, Payload};
pub use packet_serializer::{sanitize_text, PacketSerializer};
pub use packet_type_registry::{PacketTypeEntry, PacketTypeRegistry};
pub use ping::Ping;
pub use pong::Pong;
pub use reconnect_request::ReconnectRequest;
pub use session_config::SessionConfig;

use crate::utils::BinaryDataError;
use thiserror::Error;

/// Two-byte constant leading every datagram.
pub const MAGIC: u16 = 0x4E45;

/// Current wire protocol revision.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest datagram a UDP payload can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Destination id meaning "every peer in the session except the sender".
pub const DEST_BROADCAST: u8 = 0;

/// The session host always holds client id 1.
pub const HOST_CLIENT_ID: u8 = 1;

/// Largest assignable client id; 255 is reserved on the wire.
pub const MAX_CLIENT_ID: u8 = 254;

pub const MAX_NAME_LENGTH: usize = 64;
pub const MAX_DESCRIPTION_LENGTH: usize = 256;
pub const MAX_REGISTRY_ENTRIES: usize = 100;
pub const MAX_ACK_SEQUENCES: usize = 100;

/// Everything that can go wrong while encoding or decoding a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("invalid magic number 0x{0:04X}")]
    BadMagic(u16),
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u8),
    #[error("destination id 255 is reserved")]
    ReservedDestination,
    #[error("unknown packet type 0x{0:02X}")]
    UnknownPacketType(u8),
    #[error("game packet type 0x{0:02X} is below the application range")]
    InvalidGamePacketType(u8),
    #[error("{field} is {len} bytes, limit is {max}")]
    OversizedField { field: &'static str, len: usize, max: usize },
    #[error("{what} holds {len} entries, limit is {max}")]
    OversizedCollection { what: &'static str, len: usize, max: usize },
    #[error("encoded packet is {len} bytes, datagram limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Binary(#[from] BinaryDataError),
}
