// src/protocol/packet.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::{
    Ack, ConnectAccept, ConnectDeny, ConnectRequest, DisconnectNotice, GamePacket,
    MessageIdentifiers, PacketError, PacketTypeRegistry, Ping, Pong, ReconnectRequest,
    SessionConfig, MAGIC, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
};

/// Fixed 8-byte header leading every datagram. The magic constant and the
/// protocol version are written and checked by the codec, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub sequence: u16,
    /// Source peer within its session; 0 means "not assigned yet".
    pub client_id: u8,
    /// 0 = broadcast, 1 = session host, 2..=254 = a specific client.
    pub destination_id: u8,
}

impl PacketHeader {
    pub(crate) fn encode(&self, stream: &mut PacketSerializer) {
        stream.put_u16_le(MAGIC);
        stream.put_u8(PROTOCOL_VERSION);
        stream.put_u8(self.packet_type);
        stream.put_u16_le(self.sequence);
        stream.put_u8(self.client_id);
        stream.put_u8(self.destination_id);
    }

    pub(crate) fn decode(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        let magic = stream.get_u16_le()?;
        if magic != MAGIC {
            return Err(PacketError::BadMagic(magic));
        }
        let version = stream.get_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(PacketError::VersionMismatch(version));
        }
        let packet_type = stream.get_u8()?;
        let sequence = stream.get_u16_le()?;
        let client_id = stream.get_u8()?;
        let destination_id = stream.get_u8()?;
        if destination_id == u8::MAX {
            return Err(PacketError::ReservedDestination);
        }
        Ok(Self { packet_type, sequence, client_id, destination_id })
    }
}

/// Tagged sum over the payload kinds; the header's type byte selects the
/// branch. Everything at or above 0x10 is an opaque [`GamePacket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    ConnectRequest(ConnectRequest),
    ConnectAccept(ConnectAccept),
    ConnectDeny(ConnectDeny),
    SessionConfig(SessionConfig),
    PacketTypeRegistry(PacketTypeRegistry),
    ReconnectRequest(ReconnectRequest),
    Ping(Ping),
    Pong(Pong),
    DisconnectNotice(DisconnectNotice),
    Ack(Ack),
    Game(GamePacket),
}

impl Payload {
    pub fn packet_type(&self) -> u8 {
        match self {
            Payload::ConnectRequest(_) => MessageIdentifiers::ID_CONNECT_REQUEST,
            Payload::ConnectAccept(_) => MessageIdentifiers::ID_CONNECT_ACCEPT,
            Payload::ConnectDeny(_) => MessageIdentifiers::ID_CONNECT_DENY,
            Payload::SessionConfig(_) => MessageIdentifiers::ID_SESSION_CONFIG,
            Payload::PacketTypeRegistry(_) => MessageIdentifiers::ID_PACKET_TYPE_REGISTRY,
            Payload::ReconnectRequest(_) => MessageIdentifiers::ID_RECONNECT_REQUEST,
            Payload::Ping(_) => MessageIdentifiers::ID_PING,
            Payload::Pong(_) => MessageIdentifiers::ID_PONG,
            Payload::DisconnectNotice(_) => MessageIdentifiers::ID_DISCONNECT_NOTICE,
            Payload::Ack(_) => MessageIdentifiers::ID_ACK,
            Payload::Game(game) => game.packet_type,
        }
    }

    fn encode(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        match self {
            Payload::ConnectRequest(p) => p.encode_payload(stream),
            Payload::ConnectAccept(p) => p.encode_payload(stream),
            Payload::ConnectDeny(p) => p.encode_payload(stream),
            Payload::SessionConfig(p) => p.encode_payload(stream),
            Payload::PacketTypeRegistry(p) => p.encode_payload(stream),
            Payload::ReconnectRequest(p) => p.encode_payload(stream),
            Payload::Ping(p) => p.encode_payload(stream),
            Payload::Pong(p) => p.encode_payload(stream),
            Payload::DisconnectNotice(p) => p.encode_payload(stream),
            Payload::Ack(p) => p.encode_payload(stream),
            Payload::Game(p) => p.encode_payload(stream),
        }
    }

    fn decode(packet_type: u8, stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        match packet_type {
            MessageIdentifiers::ID_CONNECT_REQUEST => {
                Ok(Payload::ConnectRequest(ConnectRequest::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_CONNECT_ACCEPT => {
                Ok(Payload::ConnectAccept(ConnectAccept::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_CONNECT_DENY => {
                Ok(Payload::ConnectDeny(ConnectDeny::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_SESSION_CONFIG => {
                Ok(Payload::SessionConfig(SessionConfig::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_PACKET_TYPE_REGISTRY => {
                Ok(Payload::PacketTypeRegistry(PacketTypeRegistry::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_RECONNECT_REQUEST => {
                Ok(Payload::ReconnectRequest(ReconnectRequest::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_PING => Ok(Payload::Ping(Ping::decode_payload(stream)?)),
            MessageIdentifiers::ID_PONG => Ok(Payload::Pong(Pong::decode_payload(stream)?)),
            MessageIdentifiers::ID_DISCONNECT_NOTICE => {
                Ok(Payload::DisconnectNotice(DisconnectNotice::decode_payload(stream)?))
            }
            MessageIdentifiers::ID_ACK => Ok(Payload::Ack(Ack::decode_payload(stream)?)),
            id if id >= MessageIdentifiers::ID_USER_PACKET_ENUM => {
                Ok(Payload::Game(GamePacket::decode_payload(id, stream)?))
            }
            id => Err(PacketError::UnknownPacketType(id)),
        }
    }
}

/// A complete wire packet: header plus payload. The header's type byte is
/// kept consistent with the payload by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Payload,
}

impl Packet {
    pub fn create(payload: Payload, sequence: u16, client_id: u8, destination_id: u8) -> Self {
        let packet_type = payload.packet_type();
        Self {
            header: PacketHeader { packet_type, sequence, client_id, destination_id },
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut stream = PacketSerializer::new();
        self.header.encode(&mut stream);
        self.payload.encode(&mut stream)?;
        let buffer = stream.into_buffer();
        if buffer.len() > MAX_DATAGRAM_SIZE {
            return Err(PacketError::PayloadTooLarge { len: buffer.len(), max: MAX_DATAGRAM_SIZE });
        }
        Ok(buffer)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(PacketError::PayloadTooLarge { len: bytes.len(), max: MAX_DATAGRAM_SIZE });
        }
        let mut stream = PacketSerializer::from_slice(bytes);
        let header = PacketHeader::decode(&mut stream)?;
        let payload = Payload::decode(header.packet_type, &mut stream)?;
        Ok(Self { header, payload })
    }
}
