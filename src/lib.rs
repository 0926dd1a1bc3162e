pub mod application;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod storage;
pub mod telemetry;

pub use context::Context;
pub use domain::*;
pub use storage::Store;
