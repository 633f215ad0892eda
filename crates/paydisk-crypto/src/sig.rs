//! Signature recovery: 65-byte recoverable ECDSA signature + message hash
//! → 20-byte signer address (last 20 bytes of keccak256 of the public key).

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, SECP256K1};

use paydisk_core::{Address, LedgerError};

use crate::hash::keccak256;

/// Recovers the signer identity of a control-API request body.
pub trait SigRecover: Send + Sync {
    fn recover(&self, hash: &[u8; 32], sig: &[u8]) -> Result<Address, LedgerError>;
}

/// secp256k1 recoverable-signature implementation. Signatures are
/// `r(32) || s(32) || v(1)` with `v` in {0, 1} or the legacy {27, 28}.
pub struct EcdsaRecover;

impl SigRecover for EcdsaRecover {
    fn recover(&self, hash: &[u8; 32], sig: &[u8]) -> Result<Address, LedgerError> {
        if sig.len() != 65 {
            return Err(LedgerError::Unauthenticated(format!(
                "signature must be 65 bytes, got {}",
                sig.len()
            )));
        }
        let v = match sig[64] {
            v @ 0..=3 => v,
            v @ 27..=30 => v - 27,
            v => {
                return Err(LedgerError::Unauthenticated(format!(
                    "bad recovery id {v}"
                )))
            }
        };
        let rec_id = RecoveryId::from_i32(v as i32)
            .map_err(|e| LedgerError::Unauthenticated(e.to_string()))?;
        let rec_sig = RecoverableSignature::from_compact(&sig[..64], rec_id)
            .map_err(|e| LedgerError::Unauthenticated(e.to_string()))?;
        let pubkey = SECP256K1
            .recover_ecdsa(&Message::from_digest(*hash), &rec_sig)
            .map_err(|e| LedgerError::Unauthenticated(e.to_string()))?;

        // Address = last 20 bytes of keccak256 of the uncompressed key body.
        let digest = keccak256(&pubkey.serialize_uncompressed()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Ok(Address::from_bytes(addr))
    }
}
