mod atomic;
mod error;
mod queries;
mod sql;
mod store;
mod transfer_tx;

pub use atomic::*;
pub use error::*;
pub use queries::*;
pub use store::*;
pub use transfer_tx::*;

/// SQL migration for the accounts / entries / transfers schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
