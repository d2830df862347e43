//! Codec error types

use thiserror::Error;

/// Malformed textual input handed to the codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Hex string has odd length ({0} digits)")]
    OddLength(usize),

    #[error("Invalid hex character at position {0}")]
    InvalidCharacter(usize),

    #[error("Empty input")]
    Empty,
}
