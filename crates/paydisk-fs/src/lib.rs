//! paydisk-fs
//!
//! The metered filesystem surface a file-operation protocol front-end talks
//! to: basic-auth resolution, URL-path routing onto owner/friend mounts, and
//! per-operation point charging over a directory-rooted backend.

pub mod auth;
pub mod metered;
pub mod route;

pub use auth::authenticate;
pub use metered::{DirEntryInfo, MeteredDir, MeteredFile, OpenFlags};
pub use route::{route, Mount};
