//! paydisk-ledger
//!
//! The metered point ledger: payment ingest, the pending-credit watcher,
//! the probabilistic storage charger, and the control-plane operations that
//! the HTTP front-end exposes.

pub mod dirscan;
pub mod engine;
pub mod stochastic;
pub mod watcher;

pub use engine::LedgerEngine;
pub use stochastic::StochasticCache;
