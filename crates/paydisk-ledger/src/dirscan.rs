//! Probabilistic storage fees.
//!
//! Continuous per-byte billing is replaced with a per-block Bernoulli trial:
//! each path (and each owner's share count) hashes the new block hash and is
//! charged the flat storage fee when the draw lands under
//! `threshold × size`. Block hashes are unpredictable, so the lottery cannot
//! be gamed by path choice.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use paydisk_core::keys::{bytes_to_i64, i64_to_bytes};
use paydisk_core::{now_ns, Address, Uid, DIR_SCAN_PERIOD_SECS, MEGA, POINTS_FOR_STORAGE};
use paydisk_crypto::sha256;
use paydisk_store::LedgerDb;

use crate::engine::LedgerEngine;

/// Background loop: poll the chain height and run one sweep per new block.
pub async fn run(engine: Arc<LedgerEngine>, threshold: i64) {
    let mut prev = engine.chain.get_block_count().await.unwrap_or(0);
    loop {
        tokio::time::sleep(Duration::from_secs(DIR_SCAN_PERIOD_SECS)).await;
        let latest = match engine.chain.get_block_count().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "block count poll failed");
                continue;
            }
        };
        if latest <= prev {
            continue;
        }
        match engine.chain.get_block_hash(latest).await {
            Ok(hash) => {
                debug!(height = latest, "storage fee sweep");
                sweep_storage_fees(&engine, hash, threshold);
                prev = latest;
            }
            Err(e) => warn!(height = latest, error = %e, "block hash fetch failed"),
        }
    }
}

/// One full sweep: every user's tree, then every owner's share count.
pub fn sweep_storage_fees(engine: &LedgerEngine, block_hash: [u8; 32], threshold: i64) {
    match engine.db.users() {
        Ok(users) => {
            for (addr, uid) in users {
                charge_user_tree(&engine.db, &engine.work_dir, block_hash, threshold, uid, &addr);
            }
        }
        Err(e) => warn!(error = %e, "user scan failed"),
    }

    match engine.db.share_counts(now_ns()) {
        Ok(counts) => {
            for (uid, count) in counts {
                let mut buf = block_hash.to_vec();
                buf.extend_from_slice(&i64_to_bytes(uid));
                let n = bytes_to_i64(&sha256(&buf)[..8]);
                if n < threshold.saturating_mul(count) {
                    let op = format!(
                        "Storage: block={} dir share={}",
                        hex::encode(block_hash),
                        count
                    );
                    if let Err(e) = engine.db.consume(uid, POINTS_FOR_STORAGE, &op) {
                        debug!(uid, error = %e, "share storage fee not collected");
                    }
                }
            }
        }
        Err(e) => warn!(error = %e, "share scan failed"),
    }
}

/// Walk one user's tree and run the per-path lottery. Directories count as
/// one mebibyte; files as started mebibytes.
fn charge_user_tree(
    db: &LedgerDb,
    work_dir: &Path,
    block_hash: [u8; 32],
    threshold: i64,
    uid: Uid,
    addr: &Address,
) {
    let root = work_dir.join(addr.to_hex());
    if !root.exists() {
        return;
    }
    walk(&root, &mut |path, size_bytes, is_dir| {
        let size = if is_dir {
            1
        } else {
            (size_bytes as i64 + MEGA - 1) / MEGA
        };
        let mut buf = block_hash.to_vec();
        buf.extend_from_slice(path.to_string_lossy().as_bytes());
        let n = bytes_to_i64(&sha256(&buf)[..8]);
        if n < threshold.saturating_mul(size) {
            let op = format!(
                "Storage: block={} path={} size={}",
                hex::encode(block_hash),
                path.display(),
                size
            );
            if let Err(e) = db.consume(uid, POINTS_FOR_STORAGE, &op) {
                debug!(uid, path = %path.display(), error = %e, "storage fee not collected");
            }
        }
    });
}

/// Depth-first walk visiting the directory itself before its children.
fn walk(dir: &Path, visit: &mut impl FnMut(&Path, u64, bool)) {
    visit(dir, 0, true);
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "walk failed");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.metadata() {
            Ok(meta) if meta.is_dir() => walk(&path, visit),
            Ok(meta) => visit(&path, meta.len(), false),
            Err(e) => warn!(path = %path.display(), error = %e, "stat failed during walk"),
        }
    }
}
