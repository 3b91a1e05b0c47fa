//! Account addresses of storage clients and providers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("invalid address length: expected 40 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl AddressError {
    pub fn kind(&self) -> crate::ErrorKind {
        crate::ErrorKind::Input
    }
}

/// A 20-byte account address.
///
/// Displays as lower-case `0x`-prefixed hex, which is also the sub-domain
/// label used by the edge cache.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address([u8; 20]);

/// The account a piece is stored for.
pub type ClientAddress = Address;

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses `0x` followed by 40 hex digits, in any letter case.
    pub fn parse(str: &str) -> Result<Self, AddressError> {
        let hex_part = str
            .strip_prefix("0x")
            .or_else(|| str.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if hex_part.len() != 40 {
            return Err(AddressError::InvalidLength(hex_part.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
