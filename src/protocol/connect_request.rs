// src/protocol/connect_request.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

/// First packet a joining client sends, addressed to the session host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol revision the client speaks; the host denies mismatches.
    pub version: u8,
    pub target_session_id: u32,
    pub game_identifier: u32,
    pub desired_name: String,
}

impl ConnectRequest {
    pub fn create(
        version: u8,
        target_session_id: u32,
        game_identifier: u32,
        desired_name: impl Into<String>,
    ) -> Self {
        Self { version, target_session_id, game_identifier, desired_name: desired_name.into() }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u8(self.version);
        stream.put_u32_le(self.target_session_id);
        stream.put_u32_le(self.game_identifier);
        stream.put_name("desired_name", &self.desired_name)
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self {
            version: stream.get_u8()?,
            target_session_id: stream.get_u32_le()?,
            game_identifier: stream.get_u32_le()?,
            desired_name: stream.get_name("desired_name")?,
        })
    }
}
