use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, MinorUnits};

pub type TransferId = i64;

/// Immutable audit record of a single movement of funds between two accounts.
/// The amount is always positive; direction is given by from/to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}
