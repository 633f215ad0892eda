pub mod db;

pub use db::{CreditRecord, DeductionRecord, LedgerDb, PendingCredit};
