// src/protocol/packet_type_registry.rs

use crate::protocol::packet_serializer::PacketSerializer;
use crate::protocol::{MessageIdentifiers, PacketError, MAX_REGISTRY_ENTRIES};

/// One advertised application packet type. Descriptive only; dispatch stays
/// with the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketTypeEntry {
    pub packet_id: u8,
    pub name: String,
    pub description: String,
}

impl PacketTypeEntry {
    pub fn create(
        packet_id: u8,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, PacketError> {
        if packet_id < MessageIdentifiers::ID_USER_PACKET_ENUM {
            return Err(PacketError::InvalidGamePacketType(packet_id));
        }
        Ok(Self { packet_id, name: name.into(), description: description.into() })
    }
}

/// Catalogue of application packet types the host advertises to new clients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketTypeRegistry {
    pub entries: Vec<PacketTypeEntry>,
}

impl PacketTypeRegistry {
    pub fn create(entries: Vec<PacketTypeEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn encode_payload(&self, stream: &mut PacketSerializer) -> Result<(), PacketError> {
        if self.entries.len() > MAX_REGISTRY_ENTRIES {
            return Err(PacketError::OversizedCollection {
                what: "packet type registry",
                len: self.entries.len(),
                max: MAX_REGISTRY_ENTRIES,
            });
        }
        stream.put_u8(self.entries.len() as u8);
        for entry in &self.entries {
            stream.put_u8(entry.packet_id);
            stream.put_short_name("entry name", &entry.name)?;
            stream.put_description("entry description", &entry.description)?;
        }
        Ok(())
    }

    pub(crate) fn decode_payload(stream: &mut PacketSerializer) -> Result<Self, PacketError> {
        let count = stream.get_u8()? as usize;
        if count > MAX_REGISTRY_ENTRIES {
            return Err(PacketError::OversizedCollection {
                what: "packet type registry",
                len: count,
                max: MAX_REGISTRY_ENTRIES,
            });
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(PacketTypeEntry {
                packet_id: stream.get_u8()?,
                name: stream.get_short_name("entry name")?,
                description: stream.get_description("entry description")?,
            });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_one_byte() {
        let registry = PacketTypeRegistry::default();
        let mut stream = PacketSerializer::new();
        registry.encode_payload(&mut stream).unwrap();
        assert_eq!(stream.buffer(), &[0x00]);
    }

    #[test]
    fn test_round_trip() {
        let registry = PacketTypeRegistry::create(vec![
            PacketTypeEntry::create(0x10, "move", "player movement delta").unwrap(),
            PacketTypeEntry::create(0x11, "chat", "chat line").unwrap(),
        ]);
        let mut stream = PacketSerializer::new();
        registry.encode_payload(&mut stream).unwrap();

        let mut stream = PacketSerializer::from_slice(stream.buffer());
        assert_eq!(PacketTypeRegistry::decode_payload(&mut stream).unwrap(), registry);
        assert!(stream.feof());
    }

    #[test]
    fn test_entry_count_cap() {
        // A forged count must be rejected before entry parsing starts.
        let mut stream = PacketSerializer::from_slice(&[101]);
        assert!(matches!(
            PacketTypeRegistry::decode_payload(&mut stream),
            Err(PacketError::OversizedCollection { len: 101, max: 100, .. })
        ));
    }

    #[test]
    fn test_entry_ids_below_user_range_rejected() {
        assert!(matches!(
            PacketTypeEntry::create(0x0E, "ack", ""),
            Err(PacketError::InvalidGamePacketType(0x0E))
        ));
    }
}
