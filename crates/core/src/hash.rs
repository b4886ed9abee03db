//! Keccak-256 helpers (the hash EVM chains use everywhere).

use sha3::{Digest, Keccak256};

/// Keccak-256 of a single byte slice.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Keccak-256 over several slices, hashed as one contiguous input.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(
            hex::encode(keccak256([])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn concat_equals_single_buffer() {
        assert_eq!(keccak256_concat(&[b"lock", b"gate"]), keccak256(b"lockgate"));
    }
}
