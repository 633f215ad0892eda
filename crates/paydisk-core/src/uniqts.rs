//! Process-wide unique timestamps.
//!
//! Deduction-journal keys are suffixed with a nanosecond timestamp; two
//! concurrent charges for the same uid must never collide, so the counter
//! returns `max(now_ns, prev + 1)`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// How far the counter may lag behind wall-clock before it resynchronizes.
const RESYNC_GAP_NS: i64 = 200_000_000;

/// Lock-free monotone timestamp source. One instance per process.
pub struct UniqueTimestamp {
    t: AtomicI64,
}

impl UniqueTimestamp {
    pub const fn new() -> Self {
        Self {
            t: AtomicI64::new(0),
        }
    }

    /// Strictly monotone across any interleaving of concurrent callers.
    pub fn next(&self) -> i64 {
        let now = now_ns();
        let prev = self.t.load(Ordering::Relaxed);
        if prev + RESYNC_GAP_NS < now {
            // Counter fell behind wall-clock; try to jump forward. Only one
            // contending caller wins the swap, the rest fall through to +1.
            if self
                .t
                .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return now;
            }
        }
        self.t.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for UniqueTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

static UNIQ_TS: UniqueTimestamp = UniqueTimestamp::new();

/// The process-wide unique timestamp (nanoseconds since the Unix epoch).
pub fn get_timestamp() -> i64 {
    UNIQ_TS.next()
}

/// Wall-clock nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
