//! Ethernet MAC addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OlanError, OlanResult};

/// A 6-byte Ethernet hardware address.
///
/// Text forms accepted by [`MacAddr::parse`]:
/// - `aa:bb:cc:dd:ee:ff`
/// - `aa-bb-cc-dd-ee-ff`
/// - `aabbccddeeff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Length of a MAC address in bytes.
    pub const LEN: usize = 6;

    /// The all-ones broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// Create an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Read an address from the first six bytes of `data`.
    ///
    /// Returns `None` if `data` is shorter than six bytes.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = data.get(..Self::LEN)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Parse an address from text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not twelve hex digits, optionally
    /// separated by `:` or `-`.
    pub fn parse(value: &str) -> OlanResult<Self> {
        let invalid = || OlanError::InvalidMac {
            value: value.to_string(),
        };

        let digits: String = if value.len() == 17 {
            let sep = value.as_bytes()[2];
            if sep != b':' && sep != b'-' {
                return Err(invalid());
            }
            let parts: Vec<&str> = value.split(char::from(sep)).collect();
            if parts.len() != Self::LEN || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            value.to_string()
        };

        let mut bytes = [0u8; 6];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Raw bytes of the address.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether the group bit (low bit of the first octet) is set.
    ///
    /// True for multicast and broadcast addresses.
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Whether this is the broadcast address.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Canonical table key: twelve lowercase hex digits, no separators.
    #[must_use]
    pub fn key(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = OlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddr {
    type Error = OlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for MacAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
