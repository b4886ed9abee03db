//! Validation error model for shared primitives.

use thiserror::Error;

/// Result type used when parsing/validating shared primitives.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A primitive value failed to parse or validate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An address was not 20 bytes of hex (optionally `0x`-prefixed).
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A mixed-case address failed its EIP-55 checksum.
    #[error("address checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// A token id was not a decimal unsigned 256-bit integer.
    #[error("invalid token id: {0}")]
    InvalidTokenId(String),

    /// An identifier was invalid (e.g. uuid parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A chain network id was not a positive integer.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

impl ValidationError {
    pub fn address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    pub fn token_id(msg: impl Into<String>) -> Self {
        Self::InvalidTokenId(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
