//! Solana addresses (base58-encoded 32-byte public keys).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Length in bytes of an ed25519 public key.
pub const PUBKEY_LEN: usize = 32;

/// A validated base58 Solana address.
///
/// Wallets, asset ids and Merkle trees all share this encoding. Equality is
/// by string value, which is canonical for base58.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_address(s, "empty"));
        }

        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| DomainError::invalid_address(trimmed, e.to_string()))?;

        if bytes.len() != PUBKEY_LEN {
            return Err(DomainError::invalid_address(
                trimmed,
                format!("expected {PUBKEY_LEN} bytes, got {}", bytes.len()),
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
