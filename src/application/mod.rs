// Application layer - the caller-side collaborator of the transfer core.
// Validates requests, checks currencies, and translates store failures
// into errors a front-end (CLI today) can map to user-facing messages.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
