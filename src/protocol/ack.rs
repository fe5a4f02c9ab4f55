// src/protocol/ack.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::{PacketError, MAX_ACK_SEQUENCES};

/// Acknowledges specific header sequence numbers. Sequences name packets,
/// not positions in a stream; there is no cumulative semantics here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    pub acknowledged_sequences: Vec<u16>,
}

impl Ack {
    pub fn create(acknowledged_sequences: Vec<u16>) -> Self {
        Self { acknowledged_sequences }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        if self.acknowledged_sequences.len() > MAX_ACK_SEQUENCES {
            return Err(PacketError::OversizedCollection {
                what: "ack sequence list",
                len: self.acknowledged_sequences.len(),
                max: MAX_ACK_SEQUENCES,
            });
        }
        stream.put_u8(self.acknowledged_sequences.len() as u8);
        for seq in &self.acknowledged_sequences {
            stream.put_u16_le(*seq);
        }
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        let count = stream.get_u8()? as usize;
        if count > MAX_ACK_SEQUENCES {
            return Err(PacketError::OversizedCollection {
                what: "ack sequence list",
                len: count,
                max: MAX_ACK_SEQUENCES,
            });
        }
        let mut acknowledged_sequences = Vec::with_capacity(count);
        for _ in 0..count {
            acknowledged_sequences.push(stream.get_u16_le()?);
        }
        Ok(Self { acknowledged_sequences })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ack = Ack::create(vec![1, 2, 0xFFFF]);
        let mut stream = PacketSerializer::new();
        ack.encode_payload(&mut stream).unwrap();
        assert_eq!(stream.buffer(), &[3, 0x01, 0x00, 0x02, 0x00, 0xFF, 0xFF]);

        let mut stream = PacketSerializer::from_slice(stream.buffer());
        assert_eq!(Ack::decode_payload(&mut stream).unwrap(), ack);
    }

    #[test]
    fn test_sequence_count_cap() {
        let ack = Ack::create((0..101).collect());
        let mut stream = PacketSerializer::new();
        assert!(matches!(
            ack.encode_payload(&mut stream),
            Err(PacketError::OversizedCollection { len: 101, max: 100, .. })
        ));

        let mut stream = PacketSerializer::from_slice(&[101]);
        assert!(Ack::decode_payload(&mut stream).is_err());
    }

    #[test]
    fn test_truncated_list_fails() {
        // Claims two sequences, carries one and a half.
        let mut stream = PacketSerializer::from_slice(&[2, 0x01, 0x00, 0x02]);
        assert!(Ack::decode_payload(&mut stream).is_err());
    }
}
