//! Control-API request/response bodies.
//!
//! Every authenticated body carries a trailing `signature` over the SHA-256
//! hash of the JSON-serialized body with the signature field cleared.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Address, Points, TimestampNs};

/// SHA-256 of the canonical JSON form of `t`. Callers clear the signature
/// field before invoking this.
fn signing_hash<T: Serialize>(t: &T) -> [u8; 32] {
    // Serializing a struct is deterministic: fields emit in declaration order.
    let body = serde_json::to_vec(t).expect("params serialize");
    Sha256::digest(body).into()
}

// ── getsecrethash ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSecretHashRes {
    /// hash160 of the server-derived stochastic secret.
    pub hash: Vec<u8>,
    #[serde(rename = "uniqTimestamp")]
    pub uniq_timestamp: TimestampNs,
}

// ── buypoints ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyPointsParam {
    pub timestamp: TimestampNs,
    #[serde(rename = "isMainnetTx")]
    pub is_mainnet_tx: bool,
    /// Raw chain transaction, consensus-encoded.
    pub tx: Vec<u8>,
    #[serde(rename = "passwordHash")]
    pub password_hash: [u8; 32],
    pub salt: [u8; 4],
    #[serde(rename = "senderPkh")]
    pub sender_pkh: [u8; 20],
    /// Covenant expiration block height; zero selects the normal-transfer path.
    pub expiration: i64,
    pub probability: i64,
    /// Non-zero credits this address instead of the caller (pay-on-behalf).
    pub friend: Address,
    pub signature: Vec<u8>,
}

impl BuyPointsParam {
    pub fn sighash(&self) -> [u8; 32] {
        let mut cleared = self.clone();
        cleared.signature = Vec::new();
        signing_hash(&cleared)
    }
}

// ── viewhistory ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewHistoryParam {
    #[serde(rename = "beginTimestamp")]
    pub begin_timestamp: TimestampNs,
    #[serde(rename = "endTimestamp")]
    pub end_timestamp: TimestampNs,
    pub signature: Vec<u8>,
}

impl ViewHistoryParam {
    pub fn sighash(&self) -> [u8; 32] {
        let mut cleared = self.clone();
        cleared.signature = Vec::new();
        signing_hash(&cleared)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: TimestampNs,
    /// Positive for credits, negative for deductions.
    pub amount: Points,
    pub operation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewHistoryRes {
    pub records: Vec<OperationRecord>,
}

// ── setpassword ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPasswordHashParam {
    #[serde(rename = "newPasswordHash")]
    pub new_password_hash: [u8; 32],
    pub signature: Vec<u8>,
}

impl SetPasswordHashParam {
    pub fn sighash(&self) -> [u8; 32] {
        let mut cleared = self.clone();
        cleared.signature = Vec::new();
        signing_hash(&cleared)
    }
}

// ── sharedir ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareDirParam {
    pub friend: Address,
    /// Login hash for the friend if they are not yet registered.
    #[serde(rename = "passwordHash")]
    pub password_hash: [u8; 32],
    pub dir: String,
    #[serde(rename = "expiredTime")]
    pub expired_time: TimestampNs,
    pub signature: Vec<u8>,
}

impl ShareDirParam {
    pub fn sighash(&self) -> [u8; 32] {
        let mut cleared = self.clone();
        cleared.signature = Vec::new();
        signing_hash(&cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sighash_ignores_the_signature_field() {
        let mut p = ViewHistoryParam {
            begin_timestamp: 1,
            end_timestamp: 2,
            signature: Vec::new(),
        };
        let unsigned = p.sighash();
        p.signature = vec![1, 2, 3];
        assert_eq!(p.sighash(), unsigned);
    }

    #[test]
    fn sighash_depends_on_the_body() {
        let a = ViewHistoryParam {
            begin_timestamp: 1,
            end_timestamp: 2,
            signature: Vec::new(),
        };
        let b = ViewHistoryParam {
            begin_timestamp: 1,
            end_timestamp: 3,
            signature: Vec::new(),
        };
        assert_ne!(a.sighash(), b.sighash());
    }

    #[test]
    fn json_field_names_match_the_wire_format() {
        let p = ShareDirParam {
            friend: Address::ZERO,
            password_hash: [0; 32],
            dir: "/x".into(),
            expired_time: 7,
            signature: Vec::new(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"passwordHash\""));
        assert!(json.contains("\"expiredTime\""));
        assert!(json.contains("\"dir\":\"/x\""));
    }
}
