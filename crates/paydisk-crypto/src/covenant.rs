//! Stochastic-payment covenant seam.
//!
//! A stochastic buy pays into a hash-locked P2SH output whose probabilistic
//! claim semantics mean only some fraction of submitted transactions actually
//! pay the receiver. The redeem-script construction itself is performed by an
//! external builder; this module carries its interface plus the server-side
//! secret schedule.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use paydisk_core::LedgerError;

use crate::hash::hash160;

/// Inputs of the covenant redeem script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CovenantParams {
    pub sender_pkh: [u8; 20],
    pub receiver_pkh: [u8; 20],
    pub secret_hash: [u8; 20],
    pub salt: [u8; 4],
    pub expiration: i64,
    pub probability: i64,
}

/// External covenant/stochastic-payment builder.
pub trait CovenantBuilder: Send + Sync {
    /// Hash of the redeem script derived from `params`; the buyer's output
    /// must be a P2SH to exactly this hash.
    fn redeem_script_hash(&self, params: &CovenantParams) -> Result<[u8; 20], LedgerError>;

    /// Encode a payout ratio as the covenant's probability operand.
    fn probability_from_ratio(&self, ratio: f64) -> i64;
}

/// Placeholder builder for deployments without stochastic payments; every
/// covenant purchase is rejected before any state change.
pub struct NoCovenant;

impl CovenantBuilder for NoCovenant {
    fn redeem_script_hash(&self, _params: &CovenantParams) -> Result<[u8; 20], LedgerError> {
        Err(LedgerError::Covenant(
            "no covenant builder configured".into(),
        ))
    }

    fn probability_from_ratio(&self, _ratio: f64) -> i64 {
        0
    }
}

// ── Master key & secret schedule ─────────────────────────────────────────────

/// Server master key; the only secret the service holds.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .ok()
            .map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// `sha256(master_key || be64(timestamp))` — the per-request covenant secret.
/// Only this server can later reveal it to redeem the covenant.
pub fn stochastic_secret(master: &MasterKey, timestamp: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(master.as_bytes());
    hasher.update(timestamp.to_be_bytes());
    hasher.finalize().into()
}

/// hash160 of the stochastic secret; handed to clients by `getsecrethash`.
pub fn stochastic_secret_hash(master: &MasterKey, timestamp: i64) -> [u8; 20] {
    hash160(&stochastic_secret(master, timestamp))
}
