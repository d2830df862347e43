//! Hex rendering and parsing for frames and raw operator input

use data_encoding::{DecodeKind, HEXLOWER, HEXLOWER_PERMISSIVE};

use crate::error::FormatError;

/// Lowercase, two digits per byte, no separators
pub fn to_hex(bytes: &[u8]) -> String {
    HEXLOWER.encode(bytes)
}

/// Parse a hex string, accepting either case.
///
/// Fails on odd length or any non-hex character. Whitespace is not skipped;
/// callers that accept spaced input strip it first.
pub fn from_hex(s: &str) -> Result<Vec<u8>, FormatError> {
    if s.len() % 2 != 0 {
        return Err(FormatError::OddLength(s.len()));
    }
    HEXLOWER_PERMISSIVE
        .decode(s.as_bytes())
        .map_err(|e| match e.kind {
            DecodeKind::Length => FormatError::OddLength(s.len()),
            _ => FormatError::InvalidCharacter(e.position),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_lowercase() {
        assert_eq!(to_hex(&[0x20, 0x00, 0x3A, 0xFF]), "20003aff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_from_hex_case_insensitive() {
        assert_eq!(from_hex("20003A26").unwrap(), vec![0x20, 0x00, 0x3A, 0x26]);
        assert_eq!(from_hex("aBcD").unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(from_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_from_hex_rejects() {
        assert_eq!(from_hex("abc"), Err(FormatError::OddLength(3)));
        assert_eq!(from_hex("zz"), Err(FormatError::InvalidCharacter(0)));
        assert_eq!(from_hex("00g1"), Err(FormatError::InvalidCharacter(2)));
        assert!(from_hex("20 00").is_err());
    }

    #[test]
    fn test_hex_identity() {
        for s in ["20003a26a20262fa26020d0a", "00", "ff0180", "0123456789abcdef"] {
            assert_eq!(to_hex(&from_hex(s).unwrap()), s);
        }
    }
}
