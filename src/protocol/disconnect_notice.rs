// src/protocol/disconnect_notice.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::PacketError;

/// Empty-bodied notice that a peer is leaving. The relay re-broadcasts it to
/// the rest of the session and drops the sender's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectNotice;

impl DisconnectNotice {
    pub fn create() -> Self {
        Self
    }

    pub(crate) fn encode_payload(&self, _stream: &mut PacketSerializer) -> Result<(), PacketError> {
        Ok(())
    }

    pub(crate) fn decode_payload(_stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        Ok(Self)
    }
}
