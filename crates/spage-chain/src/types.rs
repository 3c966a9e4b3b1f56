//! Chain-side primitive types and hex codecs

use std::fmt;
use std::str::FromStr;

pub use keccak_hash::H256;
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// A 20-byte chain address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address; token transfers from it are mints
    pub const ZERO: Address = Address([0u8; 20]);

    /// Raw bytes of the address
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse from 0x-prefixed or bare hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidAddress(format!("expected 20 bytes in {s}")))?;
        Ok(Address(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a 0x-prefixed hex quantity (e.g. a block number)
pub fn parse_quantity(s: &str) -> Result<u64> {
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity {s} missing 0x prefix")))?;
    u64::from_str_radix(stripped, 16).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Format a quantity the way the RPC expects it
pub fn format_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Parse a 0x-prefixed 32-byte word
pub fn parse_h256(s: &str) -> Result<H256> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::Decode(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ChainError::Decode(format!("expected 32 bytes in {s}")));
    }
    Ok(H256::from_slice(&bytes))
}

/// Format a 32-byte word as 0x-prefixed hex
pub fn format_h256(h: &H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// Parse a 0x-prefixed byte string
pub fn parse_data(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| ChainError::Decode(e.to_string()))
}

/// One decoded log entry
#[derive(Clone, Debug)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; topic 0 names the event
    pub topics: Vec<H256>,
    /// Unindexed payload
    pub data: Vec<u8>,
    /// Height the log was included at
    pub block_number: u64,
}
