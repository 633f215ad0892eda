use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    // ── Authentication / authorization ───────────────────────────────────────
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unknown user")]
    UnknownUser,

    #[error("user is locked (negative balance); only buypoints is allowed")]
    UserLocked,

    #[error("not enough points after operation: {0}")]
    InsufficientPoints(String),

    #[error("shared directories are read-only")]
    ReadOnlyShare,

    #[error("missing or expired share grant")]
    PermissionDenied,

    #[error("in the root directory, a hex address cannot be used as a name")]
    ReservedName,

    // ── Payment ingest policy ────────────────────────────────────────────────
    #[error("no output pays the service receiver")]
    NoPaymentToReceiver,

    #[error("stochastic payment request is older than the freshness window")]
    StaleStochastic,

    #[error("stochastic txid was already submitted within the cache window")]
    ReplayedStochastic,

    #[error("covenant expiration too soon: height {got}, need at least {min}")]
    ExpirationTooSoon { got: i64, min: i64 },

    #[error("locked user must buy with the forced probability and fixed value")]
    PolicyMismatchOnLocked,

    #[error("first purchase must mint at least {min} points; got {got}")]
    MinFirstBuy { got: i64, min: i64 },

    #[error("chain rejected the raw transaction: {0}")]
    ChainSubmitFailed(String),

    // ── Collaborators / plumbing ─────────────────────────────────────────────
    #[error("chain RPC error: {0}")]
    Chain(String),

    #[error("covenant builder error: {0}")]
    Covenant(String),

    #[error("transaction decode error: {0}")]
    TxDecode(String),

    #[error("inconsistent database: {0}")]
    InconsistentDatabase(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
