//! Fixed-layout key/value encoding for the single ordered ledger keyspace.
//!
//! A key is a 1-byte family tag followed by fixed-width fields; scalars are
//! big-endian 64-bit so that lexicographic key order matches numeric order.
//!
//!   RemainedPoints = 100 | tag | uid(8)
//!   DeductPoints   = 102 | tag | uid(8) | ts(8)
//!   AddPoints      = 104 | tag | uid(8) | status(1) | ts(8)
//!   PasswordHash   = 106 | tag | addr(20)
//!   SharedDir      = 108 | tag | from_uid(8) | to_uid(8) | sha256(dir)(32)
//!   UserToId       = 110 | tag | addr(20)
//!   IdToUser       = 112 | tag | uid(8)

use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::types::{Address, Points, TimestampNs, Txid, Uid};

// ── Key families ─────────────────────────────────────────────────────────────

pub const REMAINED_POINTS: u8 = 100;
pub const DEDUCT_POINTS: u8 = 102;
pub const ADD_POINTS: u8 = 104;
pub const PASSWORD_HASH: u8 = 106;
pub const SHARED_DIR: u8 = 108;
pub const USER_TO_ID: u8 = 110;
pub const ID_TO_USER: u8 = 112;

// ── Credit status ────────────────────────────────────────────────────────────

/// Status byte embedded in an `AddPoints` key. A credit is created `Pending`
/// and transitions exactly once to `Finalized` or `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditStatus {
    Finalized = 0x01,
    Pending = 0x02,
    Dead = 0x04,
}

impl CreditStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(CreditStatus::Finalized),
            0x02 => Some(CreditStatus::Pending),
            0x04 => Some(CreditStatus::Dead),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CreditStatus::Finalized => "finalized",
            CreditStatus::Pending => "pending",
            CreditStatus::Dead => "dead",
        }
    }
}

// ── Scalar encoding ──────────────────────────────────────────────────────────

pub fn i64_to_bytes(i: i64) -> [u8; 8] {
    i.to_be_bytes()
}

pub fn bytes_to_i64(b: &[u8]) -> i64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    i64::from_be_bytes(arr)
}

/// Additive merge of two big-endian i64 buffers (wrapping on overflow).
pub fn add_i64_bytes(existing: &[u8], delta: &[u8]) -> [u8; 8] {
    i64_to_bytes(bytes_to_i64(existing).wrapping_add(bytes_to_i64(delta)))
}

// ── Key builders ─────────────────────────────────────────────────────────────

pub fn remained_points_key(uid: Uid) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = REMAINED_POINTS;
    k[1..].copy_from_slice(&i64_to_bytes(uid));
    k
}

pub fn deduct_points_key(uid: Uid, ts: TimestampNs) -> [u8; 17] {
    let mut k = [0u8; 17];
    k[0] = DEDUCT_POINTS;
    k[1..9].copy_from_slice(&i64_to_bytes(uid));
    k[9..].copy_from_slice(&i64_to_bytes(ts));
    k
}

pub fn deduct_points_prefix(uid: Uid) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = DEDUCT_POINTS;
    k[1..].copy_from_slice(&i64_to_bytes(uid));
    k
}

pub fn add_points_key(uid: Uid, status: CreditStatus, ts: TimestampNs) -> [u8; 18] {
    let mut k = [0u8; 18];
    k[0] = ADD_POINTS;
    k[1..9].copy_from_slice(&i64_to_bytes(uid));
    k[9] = status.as_byte();
    k[10..].copy_from_slice(&i64_to_bytes(ts));
    k
}

pub fn add_points_prefix(uid: Uid) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = ADD_POINTS;
    k[1..].copy_from_slice(&i64_to_bytes(uid));
    k
}

pub fn password_hash_key(addr: &Address) -> [u8; 21] {
    let mut k = [0u8; 21];
    k[0] = PASSWORD_HASH;
    k[1..].copy_from_slice(addr.as_bytes());
    k
}

pub fn shared_dir_key(from_uid: Uid, to_uid: Uid, dir: &str) -> [u8; 49] {
    let mut k = [0u8; 49];
    k[0] = SHARED_DIR;
    k[1..9].copy_from_slice(&i64_to_bytes(from_uid));
    k[9..17].copy_from_slice(&i64_to_bytes(to_uid));
    let dir_hash: [u8; 32] = Sha256::digest(dir.as_bytes()).into();
    k[17..].copy_from_slice(&dir_hash);
    k
}

pub fn shared_dir_prefix(from_uid: Uid) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = SHARED_DIR;
    k[1..].copy_from_slice(&i64_to_bytes(from_uid));
    k
}

pub fn user_to_id_key(addr: &Address) -> [u8; 21] {
    let mut k = [0u8; 21];
    k[0] = USER_TO_ID;
    k[1..].copy_from_slice(addr.as_bytes());
    k
}

pub fn id_to_user_key(uid: Uid) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = ID_TO_USER;
    k[1..].copy_from_slice(&i64_to_bytes(uid));
    k
}

// ── Value layouts ────────────────────────────────────────────────────────────

/// `DeductPoints` value: `be64(amount) || operation-description`.
pub fn encode_deduct_value(amount: Points, operation: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + operation.len());
    v.extend_from_slice(&i64_to_bytes(amount));
    v.extend_from_slice(operation.as_bytes());
    v
}

pub fn decode_deduct_value(v: &[u8]) -> Result<(Points, String), LedgerError> {
    if v.len() < 8 {
        return Err(LedgerError::InconsistentDatabase(
            "short DeductPoints value".into(),
        ));
    }
    let amount = bytes_to_i64(&v[..8]);
    let op = String::from_utf8_lossy(&v[8..]).into_owned();
    Ok((amount, op))
}

/// `AddPoints` value: `be64(value) || txid(32)`.
pub fn encode_credit_value(value: Points, txid: &Txid) -> Vec<u8> {
    let mut v = Vec::with_capacity(40);
    v.extend_from_slice(&i64_to_bytes(value));
    v.extend_from_slice(txid.as_bytes());
    v
}

pub fn decode_credit_value(v: &[u8]) -> Result<(Points, Txid), LedgerError> {
    if v.len() < 40 {
        return Err(LedgerError::InconsistentDatabase(
            "short AddPoints value".into(),
        ));
    }
    let value = bytes_to_i64(&v[..8]);
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&v[8..40]);
    Ok((value, Txid::from_bytes(txid)))
}

/// `SharedDir` value: `be64(expire_ns) || dir-path`.
pub fn encode_share_value(expire_ns: TimestampNs, dir: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + dir.len());
    v.extend_from_slice(&i64_to_bytes(expire_ns));
    v.extend_from_slice(dir.as_bytes());
    v
}

pub fn decode_share_value(v: &[u8]) -> Result<(TimestampNs, String), LedgerError> {
    if v.len() < 8 {
        return Err(LedgerError::InconsistentDatabase(
            "short SharedDir value".into(),
        ));
    }
    let expire = bytes_to_i64(&v[..8]);
    let dir = String::from_utf8_lossy(&v[8..]).into_owned();
    Ok((expire, dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip_and_wrap() {
        assert_eq!(bytes_to_i64(&i64_to_bytes(-42)), -42);
        assert_eq!(
            bytes_to_i64(&add_i64_bytes(&i64_to_bytes(100), &i64_to_bytes(-30))),
            70
        );
    }

    #[test]
    fn key_layouts_match_the_wire_format() {
        let k = add_points_key(7, CreditStatus::Pending, 99);
        assert_eq!(k[0], ADD_POINTS);
        assert_eq!(bytes_to_i64(&k[1..9]), 7);
        assert_eq!(k[9], 0x02);
        assert_eq!(bytes_to_i64(&k[10..18]), 99);

        let addr = Address::from_bytes([0xaa; 20]);
        let k = user_to_id_key(&addr);
        assert_eq!(k[0], USER_TO_ID);
        assert_eq!(&k[1..], addr.as_bytes());
    }

    #[test]
    fn deduct_keys_sort_by_timestamp() {
        // Lexicographic order of big-endian suffixes is numeric order.
        assert!(deduct_points_key(1, 5) < deduct_points_key(1, 6));
        assert!(deduct_points_key(1, i64::MAX) < deduct_points_key(2, 0));
    }

    #[test]
    fn values_round_trip() {
        let (amount, op) =
            decode_deduct_value(&encode_deduct_value(3, "Write to '/a' for 3072 bytes")).unwrap();
        assert_eq!(amount, 3);
        assert_eq!(op, "Write to '/a' for 3072 bytes");

        let txid = Txid::from_bytes([9u8; 32]);
        let (value, id) = decode_credit_value(&encode_credit_value(1_000, &txid)).unwrap();
        assert_eq!(value, 1_000);
        assert_eq!(id, txid);

        let (exp, dir) = decode_share_value(&encode_share_value(55, "/photos")).unwrap();
        assert_eq!(exp, 55);
        assert_eq!(dir, "/photos");
    }

    #[test]
    fn credit_status_bytes() {
        for s in [
            CreditStatus::Finalized,
            CreditStatus::Pending,
            CreditStatus::Dead,
        ] {
            assert_eq!(CreditStatus::from_byte(s.as_byte()), Some(s));
        }
        assert_eq!(CreditStatus::from_byte(0x03), None);
    }
}
