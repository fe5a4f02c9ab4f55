// src/protocol/message_identifiers.rs

/// Packet-type byte assignments for the control plane. Everything at or
/// above [`MessageIdentifiers::ID_USER_PACKET_ENUM`] is application-defined
/// and carried opaquely.
pub struct MessageIdentifiers;

impl MessageIdentifiers {
    pub const ID_CONNECT_REQUEST: u8 = 0x01;
    pub const ID_CONNECT_ACCEPT: u8 = 0x02;
    pub const ID_CONNECT_DENY: u8 = 0x03;
    pub const ID_SESSION_CONFIG: u8 = 0x04;
    pub const ID_PACKET_TYPE_REGISTRY: u8 = 0x05;
    pub const ID_RECONNECT_REQUEST: u8 = 0x06;
    // 0x07..=0x0A reserved
    pub const ID_PING: u8 = 0x0B;
    pub const ID_PONG: u8 = 0x0C;
    pub const ID_DISCONNECT_NOTICE: u8 = 0x0D;
    pub const ID_ACK: u8 = 0x0E;

    /// First packet type available to applications.
    pub const ID_USER_PACKET_ENUM: u8 = 0x10;
}
