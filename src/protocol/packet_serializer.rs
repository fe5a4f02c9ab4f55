// src/protocol/packet_serializer.rs

use crate::protocol::{PacketError, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::utils::{BinaryDataError, BinaryStream};

/// Strips characters that have no business in a peer-supplied string:
/// everything below 0x20 except `\t`, `\n` and `\r`, plus DEL (0x7F).
/// Applying it twice changes nothing.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|&c| (c >= '\u{20}' || c == '\t' || c == '\n' || c == '\r') && c != '\u{7F}')
        .collect()
}

/// [`BinaryStream`] wrapper adding the protocol's length-prefixed string
/// conventions. Reads sanitize on the way out; writes enforce the same caps
/// so encode can never produce a packet decode would refuse.
#[derive(Debug, Clone, Default)]
pub struct PacketSerializer {
    stream: BinaryStream,
}

impl PacketSerializer {
    pub fn new() -> Self {
        Self { stream: BinaryStream::new() }
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self { stream: BinaryStream::from_slice(slice) }
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.stream.into_buffer()
    }

    pub fn buffer(&self) -> &[u8] {
        self.stream.buffer()
    }

    pub fn remaining(&self) -> usize {
        self.stream.remaining()
    }

    pub fn feof(&self) -> bool {
        self.stream.feof()
    }

    pub fn get(&mut self, len: usize) -> Result<&[u8], PacketError> {
        Ok(self.stream.get(len)?)
    }

    pub fn get_remaining(&mut self) -> &[u8] {
        self.stream.get_remaining()
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.stream.put(bytes);
    }

    pub fn get_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.stream.get_u8()?)
    }

    pub fn put_u8(&mut self, v: u8) {
        self.stream.put_u8(v);
    }

    pub fn get_u16_le(&mut self) -> Result<u16, PacketError> {
        Ok(self.stream.get_u16_le()?)
    }

    pub fn put_u16_le(&mut self, v: u16) {
        self.stream.put_u16_le(v);
    }

    pub fn get_u32_le(&mut self) -> Result<u32, PacketError> {
        Ok(self.stream.get_u32_le()?)
    }

    pub fn put_u32_le(&mut self, v: u32) {
        self.stream.put_u32_le(v);
    }

    pub fn get_u64_le(&mut self) -> Result<u64, PacketError> {
        Ok(self.stream.get_u64_le()?)
    }

    pub fn put_u64_le(&mut self, v: u64) {
        self.stream.put_u64_le(v);
    }

    fn utf8(bytes: &[u8]) -> Result<String, PacketError> {
        let text = std::str::from_utf8(bytes).map_err(|_| BinaryDataError::InvalidUtf8)?;
        Ok(sanitize_text(text))
    }

    /// Peer name: `u32` length prefix, at most [`MAX_NAME_LENGTH`] bytes.
    pub fn get_name(&mut self, field: &'static str) -> Result<String, PacketError> {
        let len = self.get_u32_le()? as usize;
        if len > MAX_NAME_LENGTH {
            return Err(PacketError::OversizedField { field, len, max: MAX_NAME_LENGTH });
        }
        let bytes = self.get(len)?.to_vec();
        Self::utf8(&bytes)
    }

    pub fn put_name(&mut self, field: &'static str, value: &str) -> Result<(), PacketError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_NAME_LENGTH {
            return Err(PacketError::OversizedField { field, len: bytes.len(), max: MAX_NAME_LENGTH });
        }
        self.put_u32_le(bytes.len() as u32);
        self.put(bytes);
        Ok(())
    }

    /// Registry entry name: `u8` length prefix, same 64-byte cap.
    pub fn get_short_name(&mut self, field: &'static str) -> Result<String, PacketError> {
        let len = self.get_u8()? as usize;
        if len > MAX_NAME_LENGTH {
            return Err(PacketError::OversizedField { field, len, max: MAX_NAME_LENGTH });
        }
        let bytes = self.get(len)?.to_vec();
        Self::utf8(&bytes)
    }

    pub fn put_short_name(&mut self, field: &'static str, value: &str) -> Result<(), PacketError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_NAME_LENGTH {
            return Err(PacketError::OversizedField { field, len: bytes.len(), max: MAX_NAME_LENGTH });
        }
        self.put_u8(bytes.len() as u8);
        self.put(bytes);
        Ok(())
    }

    /// Registry entry description: `u16` length prefix, 256-byte cap.
    pub fn get_description(&mut self, field: &'static str) -> Result<String, PacketError> {
        let len = self.get_u16_le()? as usize;
        if len > MAX_DESCRIPTION_LENGTH {
            return Err(PacketError::OversizedField { field, len, max: MAX_DESCRIPTION_LENGTH });
        }
        let bytes = self.get(len)?.to_vec();
        Self::utf8(&bytes)
    }

    pub fn put_description(&mut self, field: &'static str, value: &str) -> Result<(), PacketError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_DESCRIPTION_LENGTH {
            return Err(PacketError::OversizedField {
                field,
                len: bytes.len(),
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        self.put_u16_le(bytes.len() as u16);
        self.put(bytes);
        Ok(())
    }
}
