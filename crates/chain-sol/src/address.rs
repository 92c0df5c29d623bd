//! Solana account keys.
//!
//! A Solana address is the Base58 encoding of a raw 32-byte key. Program
//! derived addresses and Ed25519 public keys share the same representation,
//! so [`Pubkey`] makes no claim about which one it holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SolError;

/// Length of an account key in bytes.
pub const PUBKEY_BYTES: usize = 32;

/// A 32-byte account key, compared by byte equality.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    pub const fn new(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; PUBKEY_BYTES] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_BYTES] {
        &self.0
    }

    /// Read a key from the start of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self, SolError> {
        let bytes: [u8; PUBKEY_BYTES] = data
            .get(..PUBKEY_BYTES)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                SolError::InvalidPublicKey(format!(
                    "expected {PUBKEY_BYTES} bytes, got {}",
                    data.len()
                ))
            })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; PUBKEY_BYTES]> for Pubkey {
    fn from(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl FromStr for Pubkey {
    type Err = SolError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(address)
            .into_vec()
            .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

        let arr: [u8; PUBKEY_BYTES] = bytes.try_into().map_err(|v: Vec<u8>| {
            SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
        })?;

        Ok(Self(arr))
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Validate a Solana address string.
///
/// Returns `Ok(true)` if the string is Base58 and decodes to exactly 32
/// bytes, or an error describing why it does not.
pub fn validate_address(address: &str) -> Result<bool, SolError> {
    address.parse::<Pubkey>().map(|_| true)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The System Program address is 32 zero bytes.
    #[test]
    fn system_program_address() {
        let key = Pubkey::new([0u8; 32]);
        assert_eq!(key.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn parse_and_display_agree() {
        let address = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let key: Pubkey = address.parse().unwrap();
        assert_eq!(key.to_string(), address);
    }

    #[test]
    fn validate_garbage_returns_error() {
        assert!(validate_address("not-a-valid-address!!!").is_err());
    }

    #[test]
    fn validate_too_short_returns_error() {
        // "1" decodes to a single zero byte.
        assert!(validate_address("1").is_err());
    }

    #[test]
    fn validate_known_program() {
        assert!(validate_address("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr").unwrap());
    }

    #[test]
    fn from_slice_rejects_short_input() {
        assert!(Pubkey::from_slice(&[1u8; 31]).is_err());
        assert_eq!(Pubkey::from_slice(&[7u8; 40]).unwrap(), Pubkey::new([7u8; 32]));
    }

    #[test]
    fn debug_shows_base58() {
        let key = Pubkey::new([0u8; 32]);
        assert_eq!(format!("{key:?}"), "Pubkey(11111111111111111111111111111111)");
    }

    #[test]
    fn serde_uses_base58_string() {
        let key: Pubkey = "ComputeBudget111111111111111111111111111111".parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"ComputeBudget111111111111111111111111111111\"");
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
