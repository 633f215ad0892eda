use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal user identifier. Assigned by hashing the address and probing
/// until free; negative probes wrap to zero, so the value is kept signed.
pub type Uid = i64;

/// Point balance / amount. Signed: a balance may go negative (locked user).
pub type Points = i64;

/// Nanoseconds since the Unix epoch.
pub type TimestampNs = i64;

// ── Address ──────────────────────────────────────────────────────────────────

/// 20-byte public identifier, recovered from signatures over request bodies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0x`-prefixed lowercase hex. Also the user's directory name on disk.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a 40-hex-digit address, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 40 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// True iff `s` parses as a 20-byte hex address (with or without `0x`).
/// Names like this are reserved for user mounts at the tree root.
pub fn is_hex_address(s: &str) -> bool {
    Address::from_hex(s).is_some()
}

// ── Txid ─────────────────────────────────────────────────────────────────────

/// 32-byte chain transaction id, stored in internal (hashed) byte order.
/// Chain RPC interfaces display txids byte-reversed; use the `rpc_hex`
/// conversions at that boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Byte-reversed hex as used on chain RPC interfaces.
    pub fn to_rpc_hex(&self) -> String {
        let mut rev = self.0;
        rev.reverse();
        hex::encode(rev)
    }

    pub fn from_rpc_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        arr.reverse();
        Some(Self(arr))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rpc_hex())
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({}…)", &self.to_rpc_hex()[..16])
    }
}
