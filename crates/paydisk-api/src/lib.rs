//! paydisk-api
//!
//! HTTP control API (JSON in/out):
//!   GET  /getsecrethash — secret-hash input for building a stochastic covenant
//!   POST /buypoints     — ingest an on-chain purchase; credit lands pending
//!   POST /viewhistory   — credit + deduction records in a timestamp range
//!   POST /setpassword   — overwrite the caller's password hash
//!   POST /sharedir      — grant a friend read-only access on a directory
//!
//! Failure strings are informational; clients key off the HTTP status.

pub mod server;

pub use server::{router, serve};
