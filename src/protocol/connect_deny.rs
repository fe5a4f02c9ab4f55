// src/protocol/connect_deny.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::{PacketError, MAX_DESCRIPTION_LENGTH};
use crate::utils::BinaryDataError;

/// Refusal from the host or the relay. The payload is nothing but the
/// human-readable reason, so it is carried without a length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDeny {
    pub reason: String,
}

impl ConnectDeny {
    pub fn create(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        let bytes = self.reason.as_bytes();
        if bytes.len() > MAX_DESCRIPTION_LENGTH {
            return Err(PacketError::OversizedField {
                field: "reason",
                len: bytes.len(),
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        stream.put(bytes);
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        let bytes = stream.get_remaining().to_vec();
        if bytes.len() > MAX_DESCRIPTION_LENGTH {
            return Err(PacketError::OversizedField {
                field: "reason",
                len: bytes.len(),
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        let text = std::str::from_utf8(&bytes).map_err(|_| BinaryDataError::InvalidUtf8)?;
        Ok(Self { reason: crate::protocol::sanitize_text(text) })
    }
}
