// src/utils/error.rs

use thiserror::Error;

/// Raised by [`BinaryStream`](crate::utils::BinaryStream) when a read runs
/// off the end of the buffer or string data is not valid UTF-8.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryDataError {
    #[error("not enough bytes left in buffer: need {needed}, have {have}")]
    NotEnoughData { needed: usize, have: usize },
    #[error("invalid UTF-8 in string data")]
    InvalidUtf8,
}

pub type BinaryResult<T> = Result<T, BinaryDataError>;
