// src/protocol/reconnect_request.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

/// Sent by a client resuming a dropped session with the token it was issued
/// on connect. The relay forwards it to the host and rebinds the stored
/// address for `previous_client_id` to the request's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub session_token: u64,
    pub target_session_id: u32,
    pub previous_client_id: u8,
}

impl ReconnectRequest {
    pub fn create(session_token: u64, target_session_id: u32, previous_client_id: u8) -> Self {
        Self { session_token, target_session_id, previous_client_id }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u64_le(self.session_token);
        stream.put_u32_le(self.target_session_id);
        stream.put_u8(self.previous_client_id);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self {
            session_token: stream.get_u64_le()?,
            target_session_id: stream.get_u32_le()?,
            previous_client_id: stream.get_u8()?,
        })
    }
}
