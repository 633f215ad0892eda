//! ─── Paydisk ledger constants ───────────────────────────────────────────────
//!
//! Every file operation and control call costs points; 1 satoshi of the
//! underlying chain currency mints 100_000_000 points.

// ── Operation prices (points) ────────────────────────────────────────────────

/// Price of one file-info lookup (stat, and per entry of a readdir).
pub const POINTS_PER_FILE_INFO: i64 = 30;

pub const POINTS_OF_MKDIR: i64 = 200;

pub const POINTS_OF_RENAME: i64 = 150;

/// Flat fee charged on every control-plane access (buypoints, viewhistory, …).
pub const POINTS_OF_USER_MANAGER_ACCESS: i64 = 10;

/// Fee charged when a path wins the per-block storage lottery.
pub const POINTS_FOR_STORAGE: i64 = 1000;

// ── Purchases ────────────────────────────────────────────────────────────────

/// Points minted per satoshi credited.
pub const POINTS_PER_SATOSHI: i64 = 100_000_000;

/// A first purchase must mint at least this many points.
pub const MIN_POINTS_FIRST_BUY: i64 = 10_000_000;

/// A stochastic covenant must expire at least this many blocks in the future.
pub const MIN_EXPIRATION_BLOCKS: u64 = 10;

/// Exact output value (satoshis) required on a locked user's stochastic buy.
pub const LOCKED_STOCHASTIC_VALUE_SAT: i64 = 10_000_000;

// ── Durations (nanoseconds unless noted) ─────────────────────────────────────

/// Deduction journal entries expire after 30 days.
pub const CONSUME_LOG_DURATION_NS: i64 = 30 * 24 * 3600 * 1_000_000_000;

/// A stochastic buy request older than this is rejected as stale.
pub const STOCHASTIC_FRESHNESS_NS: i64 = 5 * 60 * 1_000_000_000;

/// How long a stochastic txid stays in the replay cache.
pub const STOCHASTIC_CACHE_TTL_NS: i64 = 5 * 60 * 1_000_000_000;

/// A pending credit unconfirmed for this long is marked dead.
/// Roughly the expected time of 200 chain blocks (120_000 seconds).
pub const TIME_TO_DEAD_NS: i64 = 200 * 10 * 60 * 1_000_000_000;

/// Payment watcher sweep period (seconds).
pub const PAYMENT_WATCHER_PERIOD_SECS: u64 = 30;

/// Storage charger poll period (seconds).
pub const DIR_SCAN_PERIOD_SECS: u64 = 30;

/// The balance merge operator must be flushed within this window (milliseconds).
pub const MERGE_FLUSH_WINDOW_MS: u64 = 200;

// ── Storage lottery ──────────────────────────────────────────────────────────

/// Default Bernoulli threshold of the per-block storage fee sampler.
pub const DIR_FEE_THRESHOLD: i64 = 1_000_000;

/// Storage fees are assessed per started mebibyte.
pub const MEGA: i64 = 1024 * 1024;
