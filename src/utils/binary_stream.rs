// src/utils/binary_stream.rs

use crate::utils::error::{BinaryDataError, BinaryResult};
use byteorder::{ByteOrder, LittleEndian};

/// Bounds-checked cursor over a byte buffer. All multi-byte reads and writes
/// are little-endian; every read checks the remaining length first so that
/// decoding adversarial input can fail but never panic.
#[derive(Debug, Clone, Default)]
pub struct BinaryStream {
    buffer: Vec<u8>,
    offset: usize,
}

impl BinaryStream {
    pub fn new() -> Self {
        Self { buffer: Vec::new(), offset: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity), offset: 0 }
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self { buffer: slice.to_vec(), offset: 0 }
    }

    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// True once the read offset has reached the end of the buffer.
    pub fn feof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    #[inline]
    fn ensure_available(&self, len: usize) -> BinaryResult<()> {
        if self.remaining() < len {
            return Err(BinaryDataError::NotEnoughData { needed: len, have: self.remaining() });
        }
        Ok(())
    }

    pub fn get(&mut self, len: usize) -> BinaryResult<&[u8]> {
        self.ensure_available(len)?;
        let start = self.offset;
        self.offset += len;
        Ok(&self.buffer[start..self.offset])
    }

    /// Consumes and returns everything left in the buffer. An exhausted
    /// stream yields an empty slice, not an error.
    pub fn get_remaining(&mut self) -> &[u8] {
        let start = self.offset.min(self.buffer.len());
        self.offset = self.buffer.len();
        &self.buffer[start..]
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn get_u8(&mut self) -> BinaryResult<u8> {
        Ok(self.get(1)?[0])
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    pub fn get_u16_le(&mut self) -> BinaryResult<u16> {
        Ok(LittleEndian::read_u16(self.get(2)?))
    }

    pub fn put_u16_le(&mut self, v: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, v);
        self.put(&buf);
    }

    pub fn get_u32_le(&mut self) -> BinaryResult<u32> {
        Ok(LittleEndian::read_u32(self.get(4)?))
    }

    pub fn put_u32_le(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.put(&buf);
    }

    pub fn get_u64_le(&mut self) -> BinaryResult<u64> {
        Ok(LittleEndian::read_u64(self.get(8)?))
    }

    pub fn put_u64_le(&mut self, v: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        self.put(&buf);
    }
}
