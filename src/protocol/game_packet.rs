// src/protocol/game_packet.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::{MessageIdentifiers, PacketError};
use bytes::Bytes;

/// Application-defined payload. Any header type byte at or above 0x10 lands
/// here; the relay and the endpoints never look inside `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePacket {
    pub packet_type: u8,
    pub data: Bytes,
}

impl GamePacket {
    pub fn create(packet_type: u8, data: impl Into<Bytes>) -> Result<Self, PacketError> {
        if packet_type < MessageIdentifiers::ID_USER_PACKET_ENUM {
            return Err(PacketError::InvalidGamePacketType(packet_type));
        }
        Ok(Self { packet_type, data: data.into() })
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put(&self.data);
        Ok(())
    }

    pub(crate) fn decode_payload(
        packet_type: u8,
        stream: &mut PacketSerializer,
    ) -> Result<Self, PacketError> {
        Ok(Self { packet_type, data: Bytes::copy_from_slice(stream.get_remaining()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_range_rejected() {
        assert!(matches!(
            GamePacket::create(0x0F, Bytes::new()),
            Err(PacketError::InvalidGamePacketType(0x0F))
        ));
        assert!(GamePacket::create(0x10, Bytes::new()).is_ok());
        assert!(GamePacket::create(0xFF, Bytes::new()).is_ok());
    }
}
