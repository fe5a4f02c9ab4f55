// src/protocol/connect_accept.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

/// Host's admission reply. Also doubles as the host's own registration with
/// the relay (`assigned_client_id == 1`) and as the client's confirmation
/// echo that binds its address at the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAccept {
    pub assigned_client_id: u8,
    pub session_id: u32,
    /// 64-bit opaque value authorizing a later reconnect.
    pub session_token: u64,
}

impl ConnectAccept {
    pub fn create(assigned_client_id: u8, session_id: u32, session_token: u64) -> Self {
        Self { assigned_client_id, session_id, session_token }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        stream.put_u8(self.assigned_client_id);
        stream.put_u32_le(self.session_id);
        stream.put_u64_le(self.session_token);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self {
            assigned_client_id: stream.get_u8()?,
            session_id: stream.get_u32_le()?,
            session_token: stream.get_u64_le()?,
        })
    }
}
