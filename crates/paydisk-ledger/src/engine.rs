use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use bitcoin::ScriptBuf;
use tracing::{debug, info};

use paydisk_chain::{self as chain, ChainClient};
use paydisk_core::{
    get_timestamp, now_ns, Address, BuyPointsParam, GetSecretHashRes, LedgerError,
    OperationRecord, SetPasswordHashParam, ShareDirParam, Uid, ViewHistoryParam, ViewHistoryRes,
    LOCKED_STOCHASTIC_VALUE_SAT, MIN_EXPIRATION_BLOCKS, MIN_POINTS_FIRST_BUY,
    POINTS_OF_USER_MANAGER_ACCESS, POINTS_PER_SATOSHI, STOCHASTIC_FRESHNESS_NS,
};
use paydisk_crypto::{
    stochastic_secret_hash, CovenantBuilder, CovenantParams, MasterKey, SigRecover,
};
use paydisk_store::{LedgerDb, PendingCredit};

use crate::stochastic::StochasticCache;

/// The service object: owns the KV ledger, the chain collaborators, and the
/// in-memory payment caches. Background tasks hold it behind an `Arc`.
pub struct LedgerEngine {
    pub(crate) db: Arc<LedgerDb>,
    pub(crate) chain: Arc<dyn ChainClient>,
    covenant: Arc<dyn CovenantBuilder>,
    recover: Arc<dyn SigRecover>,
    master_key: MasterKey,
    receiver_pkh: [u8; 20],
    receiver_script: ScriptBuf,
    pub(crate) work_dir: PathBuf,
    /// Mirror of all `Pending` credit records; the watcher sweeps it.
    pub(crate) pending: RwLock<Vec<PendingCredit>>,
    stochastic_seen: StochasticCache,
}

impl LedgerEngine {
    /// Build the engine and rehydrate the pending-payment cache from the
    /// store.
    pub fn new(
        db: Arc<LedgerDb>,
        chain_client: Arc<dyn ChainClient>,
        covenant: Arc<dyn CovenantBuilder>,
        recover: Arc<dyn SigRecover>,
        master_key: MasterKey,
        receiver_pkh: [u8; 20],
        work_dir: PathBuf,
    ) -> Result<Self, LedgerError> {
        let pending = db.pending_credits()?;
        info!(pending = pending.len(), "pending payment cache rehydrated");
        Ok(Self {
            db,
            chain: chain_client,
            covenant,
            recover,
            master_key,
            receiver_pkh,
            receiver_script: chain::receiver_script(receiver_pkh),
            work_dir,
            pending: RwLock::new(pending),
            stochastic_seen: StochasticCache::new(),
        })
    }

    pub fn db(&self) -> &Arc<LedgerDb> {
        &self.db
    }

    /// Shared pattern of the authenticated control endpoints: recover the
    /// caller, reject locked users, charge the manager-access fee.
    fn authenticate_control(
        &self,
        hash: [u8; 32],
        sig: &[u8],
        operation: &str,
    ) -> Result<(Address, Uid), LedgerError> {
        let addr = self.recover.recover(&hash, sig)?;
        let uid = self.db.get_uid(&addr)?.ok_or(LedgerError::UnknownUser)?;
        let (locked, _) = self.db.is_locked(uid)?;
        if locked {
            return Err(LedgerError::UserLocked);
        }
        self.db
            .consume(uid, POINTS_OF_USER_MANAGER_ACCESS, operation)?;
        Ok((addr, uid))
    }

    // ── getsecrethash ────────────────────────────────────────────────────────

    /// Hand out the hash160 of a fresh server-derived covenant secret; the
    /// client builds a stochastic covenant only this server can redeem.
    /// Unauthenticated and free.
    pub fn get_secret_hash(&self) -> GetSecretHashRes {
        let ts = get_timestamp();
        GetSecretHashRes {
            hash: stochastic_secret_hash(&self.master_key, ts).to_vec(),
            uniq_timestamp: ts,
        }
    }

    // ── buypoints ────────────────────────────────────────────────────────────

    /// Validate a purchase, submit the raw transaction, and record the credit
    /// as pending. The credit only reaches the balance once the watcher sees
    /// the transaction confirm.
    pub async fn buy_points(&self, param: &BuyPointsParam) -> Result<(), LedgerError> {
        let caller = self.recover.recover(&param.sighash(), &param.signature)?;
        // Pay-on-behalf: a non-zero friend address receives the credit.
        let target = if param.friend.is_zero() {
            caller
        } else {
            param.friend
        };
        let (uid, is_new) = self.db.assign_uid(&target)?;
        let (locked, balance) = if is_new {
            (false, 0)
        } else {
            self.db.is_locked(uid)?
        };

        let tx = chain::decode_tx(&param.tx)?;

        let amount = if param.expiration == 0 {
            // Normal transfer: sum every output paying the receiver script.
            // Always acceptable for a locked user since it raises the balance.
            chain::sum_outputs_to(&tx, &self.receiver_script)
        } else {
            self.stochastic_amount(param, &tx, locked, balance).await?
        };
        if amount == 0 {
            return Err(LedgerError::NoPaymentToReceiver);
        }

        let points = amount * POINTS_PER_SATOSHI;
        if is_new && points < MIN_POINTS_FIRST_BUY {
            return Err(LedgerError::MinFirstBuy {
                got: points,
                min: MIN_POINTS_FIRST_BUY,
            });
        }

        // Submit before any state change; a rejected tx leaves no trace.
        let txid = self.chain.send_raw(&param.tx).await?;

        if is_new {
            self.db.add_new_user(&target, uid, param.password_hash)?;
            info!(uid, %target, "new user registered");
        }

        let ts = get_timestamp();
        self.db.add_pending_credit(uid, ts, points, &txid)?;
        self.pending.write().unwrap().push(PendingCredit {
            uid,
            txid,
            ts,
            value: points,
        });

        // The access fee may drive a fresh account negative; the pending
        // credit restores it on finalization.
        match self
            .db
            .consume(uid, POINTS_OF_USER_MANAGER_ACCESS, "buyPoints")
        {
            Err(LedgerError::InsufficientPoints(_)) => {}
            other => other?,
        }
        info!(uid, %txid, points, "purchase recorded as pending");
        Ok(())
    }

    /// Stochastic branch of `buy_points`: freshness, replay, expiration and
    /// covenant checks, returning the first matching P2SH output value.
    async fn stochastic_amount(
        &self,
        param: &BuyPointsParam,
        tx: &bitcoin::Transaction,
        locked: bool,
        balance: i64,
    ) -> Result<i64, LedgerError> {
        let now = now_ns();
        if param.timestamp < now - STOCHASTIC_FRESHNESS_NS {
            return Err(LedgerError::StaleStochastic);
        }
        let txid = chain::txid_of(tx);
        if !self.stochastic_seen.check_and_insert(&txid, now) {
            return Err(LedgerError::ReplayedStochastic);
        }
        let height = self.chain.get_block_count().await?;
        let min = (height + MIN_EXPIRATION_BLOCKS) as i64;
        if param.expiration < min {
            return Err(LedgerError::ExpirationTooSoon {
                got: param.expiration,
                min,
            });
        }

        let secret_hash = stochastic_secret_hash(&self.master_key, param.timestamp);
        let redeem_hash = self.covenant.redeem_script_hash(&CovenantParams {
            sender_pkh: param.sender_pkh,
            receiver_pkh: self.receiver_pkh,
            secret_hash,
            salt: param.salt,
            expiration: param.expiration,
            probability: param.probability,
        })?;
        let amount = chain::first_output_to_script_hash(tx, redeem_hash).unwrap_or(0);

        if locked {
            // A locked user must buy the forced unlock package: probability
            // scaled to the debt and a fixed output value.
            let forced = self
                .covenant
                .probability_from_ratio(((-balance / 1_000_000) / 10) as f64);
            if param.probability != forced || amount != LOCKED_STOCHASTIC_VALUE_SAT {
                return Err(LedgerError::PolicyMismatchOnLocked);
            }
        }
        Ok(amount)
    }

    // ── viewhistory ──────────────────────────────────────────────────────────

    /// Credit records plus journal deductions for the caller, newest first.
    pub fn view_history(&self, param: &ViewHistoryParam) -> Result<ViewHistoryRes, LedgerError> {
        let (_, uid) = self.authenticate_control(param.sighash(), &param.signature, "viewHistory")?;

        let mut records = Vec::new();
        for c in self
            .db
            .credits_in_range(uid, param.begin_timestamp, param.end_timestamp)?
        {
            records.push(OperationRecord {
                timestamp: c.ts,
                amount: c.value,
                operation: format!("buyPoints tx {} ({})", c.txid, c.status.as_str()),
            });
        }
        for d in self
            .db
            .deductions_in_range(uid, param.begin_timestamp, param.end_timestamp)?
        {
            records.push(OperationRecord {
                timestamp: d.ts,
                amount: -d.amount,
                operation: d.operation,
            });
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(ViewHistoryRes { records })
    }

    // ── setpassword ──────────────────────────────────────────────────────────

    pub fn set_password(&self, param: &SetPasswordHashParam) -> Result<(), LedgerError> {
        let (addr, uid) =
            self.authenticate_control(param.sighash(), &param.signature, "setPassword")?;
        self.db.set_password_hash(&addr, param.new_password_hash)?;
        debug!(uid, "password hash updated");
        Ok(())
    }

    // ── sharedir ─────────────────────────────────────────────────────────────

    /// Grant the friend read-only access on `dir`. An unregistered friend is
    /// created on the spot with the caller-supplied password hash.
    pub fn share_dir(&self, param: &ShareDirParam) -> Result<(), LedgerError> {
        let (_, uid) = self.authenticate_control(param.sighash(), &param.signature, "shareDir")?;

        let (friend_uid, is_new) = self.db.assign_uid(&param.friend)?;
        if is_new {
            self.db
                .add_new_user(&param.friend, friend_uid, param.password_hash)?;
            info!(uid = friend_uid, addr = %param.friend, "friend user created by share");
        }
        self.db
            .set_shared_dir(uid, friend_uid, &param.dir, param.expired_time)?;
        info!(
            from = uid,
            to = friend_uid,
            dir = %param.dir,
            expire = param.expired_time,
            "share grant written"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptHash, Sequence, TxIn, TxOut, Witness};

    use paydisk_chain::TxStatus;
    use paydisk_core::{CreditStatus, Txid};
    use paydisk_crypto::sha256 as sha;

    const RECEIVER_PKH: [u8; 20] = [0xee; 20];

    // ── Fakes ─────────────────────────────────────────────────────────────────

    /// Recovers the "signer" from the first 20 bytes of the signature.
    struct TestRecover;

    impl SigRecover for TestRecover {
        fn recover(&self, _hash: &[u8; 32], sig: &[u8]) -> Result<Address, LedgerError> {
            if sig.len() < 20 {
                return Err(LedgerError::Unauthenticated("short signature".into()));
            }
            let mut a = [0u8; 20];
            a.copy_from_slice(&sig[..20]);
            Ok(Address::from_bytes(a))
        }
    }

    fn sig_for(addr: Address) -> Vec<u8> {
        let mut s = addr.as_bytes().to_vec();
        s.resize(65, 0);
        s
    }

    struct TestChain {
        height: AtomicU64,
        confirmations: AtomicU64,
        reject_send: AtomicBool,
    }

    impl TestChain {
        fn new() -> Self {
            Self {
                height: AtomicU64::new(1_000),
                confirmations: AtomicU64::new(0),
                reject_send: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ChainClient for TestChain {
        async fn get_block_count(&self) -> Result<u64, LedgerError> {
            Ok(self.height.load(Ordering::Relaxed))
        }

        async fn get_block_hash(&self, height: u64) -> Result<[u8; 32], LedgerError> {
            Ok([height as u8; 32])
        }

        async fn get_transaction(&self, _txid: &Txid) -> Result<TxStatus, LedgerError> {
            Ok(TxStatus {
                confirmations: self.confirmations.load(Ordering::Relaxed),
            })
        }

        async fn send_raw(&self, tx: &[u8]) -> Result<Txid, LedgerError> {
            if self.reject_send.load(Ordering::Relaxed) {
                return Err(LedgerError::ChainSubmitFailed("rejected by node".into()));
            }
            Ok(chain::txid_of(&chain::decode_tx(tx)?))
        }
    }

    /// Deterministic stand-in builder: hashes the covenant params.
    struct TestCovenant;

    fn test_redeem_hash(p: &CovenantParams) -> [u8; 20] {
        let mut buf = Vec::new();
        buf.extend_from_slice(&p.sender_pkh);
        buf.extend_from_slice(&p.receiver_pkh);
        buf.extend_from_slice(&p.secret_hash);
        buf.extend_from_slice(&p.salt);
        buf.extend_from_slice(&p.expiration.to_be_bytes());
        buf.extend_from_slice(&p.probability.to_be_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&sha(&buf)[..20]);
        out
    }

    impl CovenantBuilder for TestCovenant {
        fn redeem_script_hash(&self, p: &CovenantParams) -> Result<[u8; 20], LedgerError> {
            Ok(test_redeem_hash(p))
        }

        fn probability_from_ratio(&self, ratio: f64) -> i64 {
            ratio as i64 * 1_000 + 7
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn make_engine() -> (tempfile::TempDir, Arc<TestChain>, Arc<LedgerEngine>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(LedgerDb::open(dir.path().join("db")).expect("open db"));
        let chain_client = Arc::new(TestChain::new());
        let engine = LedgerEngine::new(
            db,
            chain_client.clone(),
            Arc::new(TestCovenant),
            Arc::new(TestRecover),
            MasterKey::new(vec![0x42; 32]),
            RECEIVER_PKH,
            dir.path().join("work"),
        )
        .expect("engine");
        (dir, chain_client, Arc::new(engine))
    }

    fn raw_tx(outputs: Vec<(u64, ScriptBuf)>) -> Vec<u8> {
        let tx = bitcoin::Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs
                .into_iter()
                .map(|(v, s)| TxOut {
                    value: Amount::from_sat(v),
                    script_pubkey: s,
                })
                .collect(),
        };
        bitcoin::consensus::serialize(&tx)
    }

    fn normal_buy(addr: Address, sat: u64) -> BuyPointsParam {
        BuyPointsParam {
            timestamp: now_ns(),
            is_mainnet_tx: true,
            tx: raw_tx(vec![(sat, chain::receiver_script(RECEIVER_PKH))]),
            password_hash: [0xaa; 32],
            salt: [0; 4],
            sender_pkh: [0; 20],
            expiration: 0,
            probability: 0,
            friend: Address::ZERO,
            signature: sig_for(addr),
        }
    }

    /// Covenant purchase whose P2SH output matches what the engine derives.
    fn stochastic_buy(
        engine: &LedgerEngine,
        addr: Address,
        sat: u64,
        expiration: i64,
        probability: i64,
        timestamp: i64,
    ) -> BuyPointsParam {
        let secret_hash = stochastic_secret_hash(&engine.master_key, timestamp);
        let redeem = test_redeem_hash(&CovenantParams {
            sender_pkh: [0x33; 20],
            receiver_pkh: RECEIVER_PKH,
            secret_hash,
            salt: [1, 2, 3, 4],
            expiration,
            probability,
        });
        BuyPointsParam {
            timestamp,
            is_mainnet_tx: true,
            tx: raw_tx(vec![(
                sat,
                ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(redeem)),
            )]),
            password_hash: [0xbb; 32],
            salt: [1, 2, 3, 4],
            sender_pkh: [0x33; 20],
            expiration,
            probability,
            friend: Address::ZERO,
            signature: sig_for(addr),
        }
    }

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn new_user_purchase_pends_then_finalizes() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x11);

        engine.buy_points(&normal_buy(a, 200_000)).await.unwrap();

        let uid = engine.db.get_uid(&a).unwrap().expect("user created");
        let pending = engine.db.pending_credits().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, 20_000_000_000_000);
        assert_eq!(engine.pending.read().unwrap().len(), 1);
        // Locked by the access fee until the credit confirms.
        assert_eq!(engine.db.get_points(uid).unwrap(), -10);
        assert!(engine.db.is_locked(uid).unwrap().0);

        chain_client.confirmations.store(1, Ordering::Relaxed);
        crate::watcher::sweep(&engine).await.unwrap();

        assert_eq!(engine.db.get_points(uid).unwrap(), 19_999_999_999_990);
        assert!(engine.db.pending_credits().unwrap().is_empty());
        assert!(engine.pending.read().unwrap().is_empty());
        let recs = engine.db.credits_in_range(uid, 0, i64::MAX).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, CreditStatus::Finalized);
    }

    #[tokio::test]
    async fn unconfirmed_credit_dies_after_the_window() {
        let (_d, _chain, engine) = make_engine();
        let a = addr(0x12);
        let uid = 77;
        engine.db.add_new_user(&a, uid, [0; 32]).unwrap();

        let old_ts = now_ns() - paydisk_core::TIME_TO_DEAD_NS - 1;
        let txid = Txid::from_bytes([9; 32]);
        engine.db.add_pending_credit(uid, old_ts, 500, &txid).unwrap();
        engine.pending.write().unwrap().push(PendingCredit {
            uid,
            txid,
            ts: old_ts,
            value: 500,
        });

        crate::watcher::sweep(&engine).await.unwrap();

        let recs = engine.db.credits_in_range(uid, 0, i64::MAX).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, CreditStatus::Dead);
        // Dead credits never touch the balance.
        assert_eq!(engine.db.get_points(uid).unwrap(), 0);
        assert!(engine.pending.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_submit_leaves_no_state() {
        let (_d, chain_client, engine) = make_engine();
        chain_client.reject_send.store(true, Ordering::Relaxed);
        let a = addr(0x13);

        let err = engine.buy_points(&normal_buy(a, 1_000)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ChainSubmitFailed(_)));
        assert_eq!(engine.db.get_uid(&a).unwrap(), None);
        assert!(engine.db.pending_credits().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tx_without_receiver_output_is_rejected() {
        let (_d, _chain, engine) = make_engine();
        let mut param = normal_buy(addr(0x14), 5_000);
        param.tx = raw_tx(vec![(5_000, chain::receiver_script([0x99; 20]))]);
        let err = engine.buy_points(&param).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoPaymentToReceiver));
    }

    #[tokio::test]
    async fn pay_on_behalf_credits_the_friend() {
        let (_d, _chain, engine) = make_engine();
        let caller = addr(0x15);
        let friend = addr(0x16);

        let mut param = normal_buy(caller, 200_000);
        param.friend = friend;
        engine.buy_points(&param).await.unwrap();

        assert_eq!(engine.db.get_uid(&caller).unwrap(), None);
        let fuid = engine.db.get_uid(&friend).unwrap().expect("friend created");
        assert_eq!(engine.db.get_points(fuid).unwrap(), -10);
        assert_eq!(
            engine.db.get_password_hash(&friend).unwrap(),
            Some([0xaa; 32])
        );
    }

    #[tokio::test]
    async fn locked_user_is_rejected_on_control_endpoints() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x17);
        engine.buy_points(&normal_buy(a, 200_000)).await.unwrap();
        // Still pending: balance −10, locked.

        let vh = ViewHistoryParam {
            begin_timestamp: 0,
            end_timestamp: i64::MAX,
            signature: sig_for(a),
        };
        assert!(matches!(
            engine.view_history(&vh).unwrap_err(),
            LedgerError::UserLocked
        ));

        let sp = SetPasswordHashParam {
            new_password_hash: [1; 32],
            signature: sig_for(a),
        };
        assert!(matches!(
            engine.set_password(&sp).unwrap_err(),
            LedgerError::UserLocked
        ));

        let sd = ShareDirParam {
            friend: addr(0x18),
            password_hash: [2; 32],
            dir: "/x".into(),
            expired_time: i64::MAX,
            signature: sig_for(a),
        };
        assert!(matches!(
            engine.share_dir(&sd).unwrap_err(),
            LedgerError::UserLocked
        ));

        // Finalization unlocks every endpoint again.
        chain_client.confirmations.store(1, Ordering::Relaxed);
        crate::watcher::sweep(&engine).await.unwrap();
        assert!(engine.view_history(&vh).is_ok());
        assert!(engine.set_password(&sp).is_ok());
    }

    #[tokio::test]
    async fn stochastic_replay_is_rejected_without_touching_state() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x21);
        let height = chain_client.height.load(Ordering::Relaxed) as i64;
        let ts = now_ns();
        let param = stochastic_buy(&engine, a, 10_000_000, height + 20, 7, ts);

        engine.buy_points(&param).await.unwrap();
        assert_eq!(engine.db.pending_credits().unwrap().len(), 1);

        let err = engine.buy_points(&param).await.unwrap_err();
        assert!(matches!(err, LedgerError::ReplayedStochastic));
        assert_eq!(engine.db.pending_credits().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_stochastic_request_is_rejected() {
        let (_d, chain_client, engine) = make_engine();
        let height = chain_client.height.load(Ordering::Relaxed) as i64;
        let stale_ts = now_ns() - STOCHASTIC_FRESHNESS_NS - 1;
        let param = stochastic_buy(&engine, addr(0x22), 10_000_000, height + 20, 7, stale_ts);
        assert!(matches!(
            engine.buy_points(&param).await.unwrap_err(),
            LedgerError::StaleStochastic
        ));
    }

    #[tokio::test]
    async fn near_expiration_covenant_is_rejected() {
        let (_d, chain_client, engine) = make_engine();
        let height = chain_client.height.load(Ordering::Relaxed) as i64;
        let param = stochastic_buy(&engine, addr(0x23), 10_000_000, height + 5, 7, now_ns());
        assert!(matches!(
            engine.buy_points(&param).await.unwrap_err(),
            LedgerError::ExpirationTooSoon { .. }
        ));
    }

    #[tokio::test]
    async fn locked_stochastic_buy_must_match_the_forced_policy() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x24);
        let uid = 900;
        engine.db.add_new_user(&a, uid, [0; 32]).unwrap();
        // Drive the balance to −50.
        engine.db.credit_finalized(uid, 10).unwrap();
        let _ = engine.db.consume(uid, 60, "Write to '/f' for 61440 bytes");
        assert_eq!(engine.db.get_points(uid).unwrap(), -50);

        let height = chain_client.height.load(Ordering::Relaxed) as i64;
        let forced = TestCovenant.probability_from_ratio(0.0);

        // Wrong probability.
        let param = stochastic_buy(&engine, a, 10_000_000, height + 20, forced + 1, now_ns());
        assert!(matches!(
            engine.buy_points(&param).await.unwrap_err(),
            LedgerError::PolicyMismatchOnLocked
        ));

        // Right probability, wrong value.
        let param = stochastic_buy(&engine, a, 5_000_000, height + 20, forced, now_ns());
        assert!(matches!(
            engine.buy_points(&param).await.unwrap_err(),
            LedgerError::PolicyMismatchOnLocked
        ));

        // The forced package is accepted.
        let param = stochastic_buy(&engine, a, 10_000_000, height + 20, forced, now_ns());
        engine.buy_points(&param).await.unwrap();
        assert_eq!(engine.db.pending_credits().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn share_on_unknown_friend_creates_the_friend() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x31);
        engine.buy_points(&normal_buy(a, 200_000)).await.unwrap();
        chain_client.confirmations.store(1, Ordering::Relaxed);
        crate::watcher::sweep(&engine).await.unwrap();

        let uid = engine.db.get_uid(&a).unwrap().unwrap();
        let before = engine.db.get_points(uid).unwrap();

        let friend = addr(0x32);
        let sd = ShareDirParam {
            friend,
            password_hash: [0x77; 32],
            dir: "/x".into(),
            expired_time: now_ns() + 1_000_000_000,
            signature: sig_for(a),
        };
        engine.share_dir(&sd).unwrap();

        let fuid = engine.db.get_uid(&friend).unwrap().expect("friend created");
        assert_eq!(
            engine.db.get_password_hash(&friend).unwrap(),
            Some([0x77; 32])
        );
        assert!(engine
            .db
            .shared_dir_expiry(uid, fuid, "/x")
            .unwrap()
            .is_some());
        assert_eq!(engine.db.get_points(uid).unwrap(), before - 10);
    }

    #[tokio::test]
    async fn view_history_lists_credits_and_deductions() {
        let (_d, chain_client, engine) = make_engine();
        let a = addr(0x41);
        engine.buy_points(&normal_buy(a, 200_000)).await.unwrap();
        chain_client.confirmations.store(1, Ordering::Relaxed);
        crate::watcher::sweep(&engine).await.unwrap();

        let uid = engine.db.get_uid(&a).unwrap().unwrap();
        engine
            .db
            .consume(uid, 3, "Write to '/A/file' for 3072 bytes")
            .unwrap();

        let res = engine
            .view_history(&ViewHistoryParam {
                begin_timestamp: 0,
                end_timestamp: i64::MAX,
                signature: sig_for(a),
            })
            .unwrap();

        // One credit, one write deduction, one viewHistory fee.
        assert!(res
            .records
            .iter()
            .any(|r| r.amount == 20_000_000_000_000 && r.operation.contains("finalized")));
        assert!(res
            .records
            .iter()
            .any(|r| r.amount == -3 && r.operation.starts_with("Write to '/A/file'")));
        assert!(res.records.iter().any(|r| r.operation == "viewHistory"));
        // Newest first.
        assert!(res.records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn secret_hash_matches_the_derivation() {
        let (_d, _c, engine) = make_engine();
        let res = engine.get_secret_hash();
        assert_eq!(
            res.hash,
            stochastic_secret_hash(&engine.master_key, res.uniq_timestamp).to_vec()
        );
        assert_eq!(res.hash.len(), 20);
    }
}
