use std::collections::HashMap;
use std::path::Path;

use sled::transaction::{ConflictableTransactionResult, TransactionError};
use tracing::debug;

use paydisk_core::keys::{self, CreditStatus};
use paydisk_core::{
    get_timestamp, Address, LedgerError, Points, TimestampNs, Txid, Uid,
    CONSUME_LOG_DURATION_NS, MERGE_FLUSH_WINDOW_MS,
};

/// Persistent ledger state backed by sled (pure-Rust, no C dependencies).
///
/// Everything lives in one tree with the tag-prefixed key space of
/// `paydisk_core::keys`, so big-endian scalar suffixes iterate in numeric
/// order. The balance family is only ever written through the tree's
/// additive merge operator; sled is configured to flush within the charge
/// window.
pub struct LedgerDb {
    _db: sled::Db,
    ledger: sled::Tree,
}

/// In-memory mirror of a `Pending` credit record, recovered on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCredit {
    pub uid: Uid,
    pub txid: Txid,
    pub ts: TimestampNs,
    pub value: Points,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRecord {
    pub ts: TimestampNs,
    pub status: CreditStatus,
    pub value: Points,
    pub txid: Txid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionRecord {
    pub ts: TimestampNs,
    pub amount: Points,
    pub operation: String,
}

fn storage(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn tx_storage(e: TransactionError<()>) -> LedgerError {
    LedgerError::Storage(format!("{e:?}"))
}

/// Additive 64-bit merge: `new = prev + delta`, absent reads as zero.
fn add_merge(_key: &[u8], old: Option<&[u8]>, delta: &[u8]) -> Option<Vec<u8>> {
    let prev = old.map(keys::bytes_to_i64).unwrap_or(0);
    Some(keys::i64_to_bytes(prev.wrapping_add(keys::bytes_to_i64(delta))).to_vec())
}

impl LedgerDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(Some(MERGE_FLUSH_WINDOW_MS))
            .open()
            .map_err(storage)?;
        let ledger = db.open_tree("ledger").map_err(storage)?;
        ledger.set_merge_operator(add_merge);
        Ok(Self { _db: db, ledger })
    }

    // ── Balance ──────────────────────────────────────────────────────────────

    /// Charge `points` from `uid` and journal the deduction.
    ///
    /// Charge-then-check: the delta is applied through the merge operator
    /// first, so concurrent charges race on commutative merges instead of a
    /// read-modify-write. If the merged balance is negative the charge
    /// stands, no journal entry is written, and the operation fails; a later
    /// finalized credit restores positivity.
    pub fn consume(&self, uid: Uid, points: Points, operation: &str) -> Result<(), LedgerError> {
        debug_assert!(points > 0, "consume requires a positive charge");
        let key = keys::remained_points_key(uid);
        self.ledger
            .merge(key, keys::i64_to_bytes(-points))
            .map_err(storage)?;
        let balance = self.get_points(uid)?;
        if balance < 0 {
            return Err(LedgerError::InsufficientPoints(operation.to_string()));
        }

        let ts = get_timestamp();
        self.ledger
            .insert(
                keys::deduct_points_key(uid, ts),
                keys::encode_deduct_value(points, operation),
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Apply a finalized credit through the same merge path. There is no
    /// credit-without-record path: callers rewrite the credit record in the
    /// same sweep.
    pub fn credit_finalized(&self, uid: Uid, value: Points) -> Result<(), LedgerError> {
        self.ledger
            .merge(keys::remained_points_key(uid), keys::i64_to_bytes(value))
            .map_err(storage)?;
        Ok(())
    }

    pub fn get_points(&self, uid: Uid) -> Result<Points, LedgerError> {
        Ok(self
            .ledger
            .get(keys::remained_points_key(uid))
            .map_err(storage)?
            .map(|v| keys::bytes_to_i64(&v))
            .unwrap_or(0))
    }

    /// A user is locked iff their balance is negative.
    pub fn is_locked(&self, uid: Uid) -> Result<(bool, Points), LedgerError> {
        let balance = self.get_points(uid)?;
        Ok((balance < 0, balance))
    }

    // ── Identity ─────────────────────────────────────────────────────────────

    pub fn get_uid(&self, addr: &Address) -> Result<Option<Uid>, LedgerError> {
        Ok(self
            .ledger
            .get(keys::user_to_id_key(addr))
            .map_err(storage)?
            .map(|v| keys::bytes_to_i64(&v)))
    }

    pub fn get_address(&self, uid: Uid) -> Result<Option<Address>, LedgerError> {
        let Some(v) = self.ledger.get(keys::id_to_user_key(uid)).map_err(storage)? else {
            return Ok(None);
        };
        if v.len() != 20 {
            return Err(LedgerError::InconsistentDatabase(format!(
                "IdToUser({uid}) holds {} bytes",
                v.len()
            )));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&v);
        Ok(Some(Address::from_bytes(arr)))
    }

    /// Resolve `addr` to its uid, or pick a fresh one: seed with xxhash64 of
    /// the address and linearly probe past occupied ids, wrapping negatives
    /// to zero. Returns `(uid, is_new)`; a new uid is NOT persisted here —
    /// callers materialize the identity entries only once payment succeeds.
    pub fn assign_uid(&self, addr: &Address) -> Result<(Uid, bool), LedgerError> {
        if let Some(uid) = self.get_uid(addr)? {
            return Ok((uid, false));
        }
        let mut uid = xxhash_rust::xxh64::xxh64(addr.as_bytes(), 0) as i64;
        loop {
            if self
                .ledger
                .get(keys::id_to_user_key(uid))
                .map_err(storage)?
                .is_none()
            {
                return Ok((uid, true));
            }
            uid = uid.wrapping_add(1);
            if uid < 0 {
                uid = 0;
            }
        }
    }

    /// Materialize the three identity entries for a new user in one
    /// transaction: `UserToId`, `IdToUser`, and `PasswordHash`.
    pub fn add_new_user(
        &self,
        addr: &Address,
        uid: Uid,
        password_hash: [u8; 32],
    ) -> Result<(), LedgerError> {
        let addr = *addr;
        self.ledger
            .transaction(move |tx| -> ConflictableTransactionResult<(), ()> {
                tx.insert(&keys::id_to_user_key(uid)[..], &addr.as_bytes()[..])?;
                tx.insert(&keys::user_to_id_key(&addr)[..], &keys::i64_to_bytes(uid)[..])?;
                tx.insert(&keys::password_hash_key(&addr)[..], &password_hash[..])?;
                Ok(())
            })
            .map_err(tx_storage)?;
        Ok(())
    }

    pub fn get_password_hash(&self, addr: &Address) -> Result<Option<[u8; 32]>, LedgerError> {
        let Some(v) = self
            .ledger
            .get(keys::password_hash_key(addr))
            .map_err(storage)?
        else {
            return Ok(None);
        };
        if v.len() != 32 {
            return Err(LedgerError::InconsistentDatabase(format!(
                "PasswordHash({addr}) holds {} bytes",
                v.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        Ok(Some(arr))
    }

    pub fn set_password_hash(&self, addr: &Address, hash: [u8; 32]) -> Result<(), LedgerError> {
        self.ledger
            .insert(keys::password_hash_key(addr), &hash[..])
            .map_err(storage)?;
        Ok(())
    }

    /// All registered users, scanned from the `UserToId` family.
    pub fn users(&self) -> Result<Vec<(Address, Uid)>, LedgerError> {
        let mut out = Vec::new();
        for item in self.ledger.scan_prefix([keys::USER_TO_ID]) {
            let (k, v) = item.map_err(storage)?;
            if k.len() != 21 {
                continue;
            }
            let mut arr = [0u8; 20];
            arr.copy_from_slice(&k[1..]);
            out.push((Address::from_bytes(arr), keys::bytes_to_i64(&v)));
        }
        Ok(out)
    }

    // ── Credit records ───────────────────────────────────────────────────────

    pub fn add_pending_credit(
        &self,
        uid: Uid,
        ts: TimestampNs,
        value: Points,
        txid: &Txid,
    ) -> Result<(), LedgerError> {
        self.ledger
            .insert(
                keys::add_points_key(uid, CreditStatus::Pending, ts),
                keys::encode_credit_value(value, txid),
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Rewrite a `Pending` credit to `Finalized` or `Dead`: delete the old
    /// key and insert the new one in a single transaction, so a crash can
    /// never lose the record between the two writes.
    pub fn update_credit_status(
        &self,
        uid: Uid,
        ts: TimestampNs,
        status: CreditStatus,
        value: Points,
        txid: &Txid,
    ) -> Result<(), LedgerError> {
        debug_assert!(status != CreditStatus::Pending);
        let txid = *txid;
        self.ledger
            .transaction(move |tx| -> ConflictableTransactionResult<(), ()> {
                tx.remove(&keys::add_points_key(uid, CreditStatus::Pending, ts)[..])?;
                tx.insert(
                    &keys::add_points_key(uid, status, ts)[..],
                    keys::encode_credit_value(value, &txid),
                )?;
                Ok(())
            })
            .map_err(tx_storage)?;
        Ok(())
    }

    /// Every credit record still in `Pending` state, across all users.
    pub fn pending_credits(&self) -> Result<Vec<PendingCredit>, LedgerError> {
        let mut out = Vec::new();
        for item in self.ledger.scan_prefix([keys::ADD_POINTS]) {
            let (k, v) = item.map_err(storage)?;
            if k.len() != 18 || CreditStatus::from_byte(k[9]) != Some(CreditStatus::Pending) {
                continue;
            }
            let (value, txid) = keys::decode_credit_value(&v)?;
            out.push(PendingCredit {
                uid: keys::bytes_to_i64(&k[1..9]),
                ts: keys::bytes_to_i64(&k[10..18]),
                value,
                txid,
            });
        }
        Ok(out)
    }

    /// Credit records for one user with `ts ∈ [begin, end]`, any status.
    pub fn credits_in_range(
        &self,
        uid: Uid,
        begin: TimestampNs,
        end: TimestampNs,
    ) -> Result<Vec<CreditRecord>, LedgerError> {
        let mut out = Vec::new();
        for item in self.ledger.scan_prefix(keys::add_points_prefix(uid)) {
            let (k, v) = item.map_err(storage)?;
            if k.len() != 18 {
                continue;
            }
            let Some(status) = CreditStatus::from_byte(k[9]) else {
                continue;
            };
            let ts = keys::bytes_to_i64(&k[10..18]);
            if ts < begin || ts > end {
                continue;
            }
            let (value, txid) = keys::decode_credit_value(&v)?;
            out.push(CreditRecord {
                ts,
                status,
                value,
                txid,
            });
        }
        Ok(out)
    }

    // ── Deduction journal ────────────────────────────────────────────────────

    /// Journal entries for one user with `ts ∈ [begin, end]`.
    pub fn deductions_in_range(
        &self,
        uid: Uid,
        begin: TimestampNs,
        end: TimestampNs,
    ) -> Result<Vec<DeductionRecord>, LedgerError> {
        let mut out = Vec::new();
        for item in self.ledger.scan_prefix(keys::deduct_points_prefix(uid)) {
            let (k, v) = item.map_err(storage)?;
            if k.len() != 17 {
                continue;
            }
            let ts = keys::bytes_to_i64(&k[9..17]);
            if ts < begin || ts > end {
                continue;
            }
            let (amount, operation) = keys::decode_deduct_value(&v)?;
            out.push(DeductionRecord {
                ts,
                amount,
                operation,
            });
        }
        Ok(out)
    }

    /// Drop journal entries older than the 30-day retention window.
    /// Stands in for per-entry TTL; the node runs it on a timer.
    pub fn purge_expired_deductions(&self, now_ns: TimestampNs) -> Result<usize, LedgerError> {
        let cutoff = now_ns - CONSUME_LOG_DURATION_NS;
        let mut stale = Vec::new();
        for item in self.ledger.scan_prefix([keys::DEDUCT_POINTS]) {
            let (k, _) = item.map_err(storage)?;
            if k.len() == 17 && keys::bytes_to_i64(&k[9..17]) < cutoff {
                stale.push(k);
            }
        }
        let purged = stale.len();
        for k in stale {
            self.ledger.remove(k).map_err(storage)?;
        }
        if purged > 0 {
            debug!(purged, "expired deduction journal entries removed");
        }
        Ok(purged)
    }

    // ── Share grants ─────────────────────────────────────────────────────────

    /// Grant (or re-stamp) read-only access on `dir` from `from_uid` to
    /// `to_uid` until `expire_ns`.
    pub fn set_shared_dir(
        &self,
        from_uid: Uid,
        to_uid: Uid,
        dir: &str,
        expire_ns: TimestampNs,
    ) -> Result<(), LedgerError> {
        self.ledger
            .insert(
                keys::shared_dir_key(from_uid, to_uid, dir),
                keys::encode_share_value(expire_ns, dir),
            )
            .map_err(storage)?;
        Ok(())
    }

    pub fn shared_dir_expiry(
        &self,
        from_uid: Uid,
        to_uid: Uid,
        dir: &str,
    ) -> Result<Option<TimestampNs>, LedgerError> {
        let Some(v) = self
            .ledger
            .get(keys::shared_dir_key(from_uid, to_uid, dir))
            .map_err(storage)?
        else {
            return Ok(None);
        };
        Ok(Some(keys::decode_share_value(&v)?.0))
    }

    /// Number of live (unexpired) grants per owner uid; feeds the per-block
    /// share storage fee.
    pub fn share_counts(&self, now_ns: TimestampNs) -> Result<HashMap<Uid, i64>, LedgerError> {
        let mut counts = HashMap::new();
        for item in self.ledger.scan_prefix([keys::SHARED_DIR]) {
            let (k, v) = item.map_err(storage)?;
            if k.len() != 49 {
                continue;
            }
            let (expire, _) = keys::decode_share_value(&v)?;
            if expire > now_ns {
                *counts.entry(keys::bytes_to_i64(&k[1..9])).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
