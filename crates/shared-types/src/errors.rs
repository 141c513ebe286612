//! # Error Types
//!
//! Errors shared by every crate that encodes chain entities.

use thiserror::Error;

/// Failures of the canonical binary encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Bytes decoded but do not re-encode to the same bytes.
    #[error("non-canonical encoding")]
    NonCanonical,
}
