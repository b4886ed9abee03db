//! EVM account / contract address.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::hash::keccak256;

/// A 20-byte EVM address (wallet or lock contract).
///
/// Equality is byte-wise, so differently-cased spellings of the same address
/// compare equal. `Display` renders the EIP-55 checksummed form.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Take the trailing 20 bytes of a 32-byte word (ABI / pubkey-hash layout).
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase `0x`-prefixed hex.
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case checksum encoding.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(ValidationError::address(s));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ValidationError::address(s))?;
        let address = Self(bytes);

        // All-lower or all-upper carries no checksum; mixed case must match EIP-55.
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower && address.to_checksum()[2..] != *digits {
            return Err(ValidationError::ChecksumMismatch(s.to_string()));
        }

        Ok(address)
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_checksum()
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl core::fmt::Debug for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn eip55_vectors_round_trip() {
        for s in CHECKSUMMED {
            let addr: Address = s.parse().unwrap();
            assert_eq!(addr.to_checksum(), s);
        }
    }

    #[test]
    fn lowercase_and_uppercase_are_accepted_and_equal() {
        let canonical: Address = CHECKSUMMED[0].parse().unwrap();
        let lower: Address = CHECKSUMMED[0].to_lowercase().parse().unwrap();
        let upper: Address = format!("0x{}", &CHECKSUMMED[0][2..].to_uppercase()).parse().unwrap();
        assert_eq!(canonical, lower);
        assert_eq!(canonical, upper);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let broken = "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        assert!(matches!(
            broken.parse::<Address>(),
            Err(ValidationError::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!(format!("{}00", CHECKSUMMED[0]).parse::<Address>().is_err());
    }

    #[test]
    fn serde_uses_checksummed_string() {
        let addr: Address = CHECKSUMMED[1].to_lowercase().parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED[1]));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    proptest! {
        #[test]
        fn any_bytes_parse_back_from_checksum(bytes in proptest::array::uniform20(any::<u8>())) {
            let addr = Address::from_bytes(bytes);
            prop_assert_eq!(addr.to_checksum().parse::<Address>().unwrap(), addr);
            prop_assert_eq!(addr.to_lower_hex().parse::<Address>().unwrap(), addr);
        }
    }
}
