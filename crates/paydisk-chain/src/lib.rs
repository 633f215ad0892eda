//! paydisk-chain
//!
//! UTXO-chain collaborators: the `ChainClient` RPC seam the watcher and
//! payment ingest poll, plus raw-transaction decoding and script matching
//! for purchase validation.

pub mod client;
pub mod tx;

pub use client::{BchRpcClient, ChainClient, TxStatus};
pub use tx::{decode_tx, first_output_to_script_hash, receiver_script, sum_outputs_to, txid_of};
