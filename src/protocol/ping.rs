// src/protocol/ping.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Sender's monotonic clock in milliseconds, echoed back in the Pong.
    pub timestamp_ms: u64,
}

impl Ping {
    pub fn create(timestamp_ms: u64) -> Self {
        Self { timestamp_ms }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u64_le(self.timestamp_ms);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self { timestamp_ms: stream.get_u64_le()? })
    }
}
