use std::collections::HashMap;
use std::sync::Mutex;

use paydisk_core::{TimestampNs, Txid, STOCHASTIC_CACHE_TTL_NS};

/// Replay guard for stochastic purchases: remembers every covenant txid seen
/// in the last five minutes. After the window the chain itself rejects the
/// duplicate as already spent.
pub struct StochasticCache {
    seen: Mutex<HashMap<Txid, TimestampNs>>,
}

impl StochasticCache {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns false if `txid` is still inside the window; otherwise records
    /// it and returns true.
    pub fn check_and_insert(&self, txid: &Txid, now_ns: TimestampNs) -> bool {
        let mut seen = self.seen.lock().unwrap();
        seen.retain(|_, expires| *expires > now_ns);
        if seen.contains_key(txid) {
            return false;
        }
        seen.insert(*txid, now_ns + STOCHASTIC_CACHE_TTL_NS);
        true
    }
}

impl Default for StochasticCache {
    fn default() -> Self {
        Self::new()
    }
}
