pub mod constants;
pub mod error;
pub mod keys;
pub mod params;
pub mod types;
pub mod uniqts;

pub use constants::*;
pub use error::LedgerError;
pub use keys::CreditStatus;
pub use params::*;
pub use types::*;
pub use uniqts::{get_timestamp, now_ns, UniqueTimestamp};
