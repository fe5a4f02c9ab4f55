// src/protocol/pong.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    /// The timestamp carried by the Ping this answers.
    pub original_timestamp_ms: u64,
}

impl Pong {
    pub fn create(original_timestamp_ms: u64) -> Self {
        Self { original_timestamp_ms }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u64_le(self.original_timestamp_ms);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self { original_timestamp_ms: stream.get_u64_le()? })
    }
}
