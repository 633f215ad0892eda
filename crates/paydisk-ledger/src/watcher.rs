//! Pending-credit reconciliation.
//!
//! Every sweep polls the chain for each cached pending credit: confirmed
//! transactions are rewritten `Pending → Finalized` and credited to the
//! balance; transactions unconfirmed past the dead window are rewritten
//! `Pending → Dead` with no balance change. The rewrite is the only legal
//! transition and happens exactly once per record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use paydisk_core::{
    now_ns, CreditStatus, LedgerError, TimestampNs, Uid, PAYMENT_WATCHER_PERIOD_SECS,
    TIME_TO_DEAD_NS,
};

use crate::engine::LedgerEngine;

/// Background loop; a single watcher owns the pending cache.
pub async fn run(engine: Arc<LedgerEngine>) {
    loop {
        tokio::time::sleep(Duration::from_secs(PAYMENT_WATCHER_PERIOD_SECS)).await;
        if let Err(e) = sweep(&engine).await {
            warn!(error = %e, "payment sweep aborted");
        }
    }
}

/// One reconciliation pass over the pending cache.
pub async fn sweep(engine: &LedgerEngine) -> Result<(), LedgerError> {
    let snapshot = engine.pending.read().unwrap().clone();
    if snapshot.is_empty() {
        return Ok(());
    }

    let now = now_ns();
    let mut settled: HashSet<(Uid, TimestampNs)> = HashSet::new();

    for p in &snapshot {
        match engine.chain.get_transaction(&p.txid).await {
            Ok(st) if st.confirmations > 0 => {
                engine
                    .db
                    .update_credit_status(p.uid, p.ts, CreditStatus::Finalized, p.value, &p.txid)?;
                engine.db.credit_finalized(p.uid, p.value)?;
                info!(uid = p.uid, txid = %p.txid, value = p.value, "credit finalized");
                settled.insert((p.uid, p.ts));
            }
            Ok(_) => {
                if now - p.ts > TIME_TO_DEAD_NS {
                    engine
                        .db
                        .update_credit_status(p.uid, p.ts, CreditStatus::Dead, p.value, &p.txid)?;
                    warn!(uid = p.uid, txid = %p.txid, "pending credit expired unconfirmed");
                    settled.insert((p.uid, p.ts));
                }
            }
            Err(e) => {
                warn!(txid = %p.txid, error = %e, "chain poll failed; kept pending");
            }
        }
    }

    // Swap the remaining-pending list back; entries appended by concurrent
    // ingests while the sweep ran are preserved.
    engine
        .pending
        .write()
        .unwrap()
        .retain(|p| !settled.contains(&(p.uid, p.ts)));
    Ok(())
}
