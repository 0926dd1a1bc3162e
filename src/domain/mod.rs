mod account;
mod currency;
mod entry;
mod ledger;
mod money;
mod transfer;

pub use account::*;
pub use currency::*;
pub use entry::*;
pub use ledger::*;
pub use money::*;
pub use transfer::*;
