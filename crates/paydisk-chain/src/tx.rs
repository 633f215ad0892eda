//! Raw transaction decoding and output matching.

use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash, Transaction};

use paydisk_core::{LedgerError, Txid};

/// Decode a consensus-encoded raw transaction.
pub fn decode_tx(raw: &[u8]) -> Result<Transaction, LedgerError> {
    bitcoin::consensus::deserialize(raw).map_err(|e| LedgerError::TxDecode(e.to_string()))
}

/// The service's receiver script, built once at init:
/// `DUP HASH160 <receiver_pkh> EQUALVERIFY CHECKSIG`.
pub fn receiver_script(receiver_pkh: [u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(receiver_pkh))
}

/// Sum of all output values (satoshis) paying exactly `script`.
pub fn sum_outputs_to(tx: &Transaction, script: &ScriptBuf) -> i64 {
    tx.output
        .iter()
        .filter(|o| o.script_pubkey == *script)
        .map(|o| o.value.to_sat() as i64)
        .sum()
}

/// Value of the first output paying the P2SH of `script_hash`, if any.
pub fn first_output_to_script_hash(tx: &Transaction, script_hash: [u8; 20]) -> Option<i64> {
    let p2sh = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(script_hash));
    tx.output
        .iter()
        .find(|o| o.script_pubkey == p2sh)
        .map(|o| o.value.to_sat() as i64)
}

/// Internal-order txid of a decoded transaction.
pub fn txid_of(tx: &Transaction) -> Txid {
    Txid::from_bytes(tx.compute_txid().to_byte_array())
}
