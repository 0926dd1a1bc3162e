use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Currency, MinorUnits};

/// Server-assigned account identifier. Valid ids are always >= 1.
pub type AccountId = i64;

/// A balance-holding account. The balance only ever changes through a
/// locked update inside an atomic scope; accounts are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: MinorUnits,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}
