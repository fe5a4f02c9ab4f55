// src/protocol/session_config.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

/// Session parameters the host pushes to a freshly accepted client. The only
/// control packet that requires an [`Ack`](crate::protocol::Ack); the host
/// retransmits it until acknowledged or retries run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub version: u8,
    pub tick_rate: u16,
    pub max_packet_size: u16,
}

impl SessionConfig {
    pub fn create(version: u8, tick_rate: u16, max_packet_size: u16) -> Self {
        Self { version, tick_rate, max_packet_size }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u8(self.version);
        stream.put_u16_le(self.tick_rate);
        stream.put_u16_le(self.max_packet_size);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self {
            version: stream.get_u8()?,
            tick_rate: stream.get_u16_le()?,
            max_packet_size: stream.get_u16_le()?,
        })
    }
}
