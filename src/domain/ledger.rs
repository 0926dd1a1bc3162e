use serde::Serialize;

use super::{AccountId, Entry, MinorUnits};

/// Net effect of a set of entries on one account's balance.
pub fn net_change(account_id: AccountId, entries: &[Entry]) -> MinorUnits {
    entries
        .iter()
        .filter(|e| e.account_id == account_id)
        .map(|e| e.amount)
        .sum()
}

/// An account whose balance is not its opening balance plus its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account_id: AccountId,
    pub balance: MinorUnits,
    pub expected: MinorUnits,
}

/// Raw counters gathered from storage for an integrity check.
#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub account_count: i64,
    pub transfer_count: i64,
    pub entry_count: i64,
    pub entry_total: MinorUnits,
    pub total_balance: MinorUnits,
    pub invalid_amounts: i64,
    pub dangling_references: i64,
    pub drifted_accounts: Vec<BalanceDrift>,
}

/// Result of a ledger integrity check.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub transfer_count: i64,
    pub entry_count: i64,
    pub total_balance: MinorUnits,
    /// Entries sum to zero and there are exactly two per transfer.
    pub is_balanced: bool,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.is_balanced && self.issues.is_empty()
    }
}

pub fn build_integrity_report(stats: &IntegrityStats) -> IntegrityReport {
    let mut issues = Vec::new();

    if stats.entry_total != 0 {
        issues.push(format!(
            "Entries sum to {} instead of zero",
            stats.entry_total
        ));
    }

    if stats.entry_count != stats.transfer_count * 2 {
        issues.push(format!(
            "Found {} entries for {} transfers (expected {})",
            stats.entry_count,
            stats.transfer_count,
            stats.transfer_count * 2
        ));
    }

    if stats.invalid_amounts > 0 {
        issues.push(format!(
            "{} transfer(s) with non-positive amount",
            stats.invalid_amounts
        ));
    }

    if stats.dangling_references > 0 {
        issues.push(format!(
            "{} row(s) referencing missing accounts",
            stats.dangling_references
        ));
    }

    for drift in &stats.drifted_accounts {
        issues.push(format!(
            "Account {} has balance {}, expected {} from its opening balance and entries",
            drift.account_id, drift.balance, drift.expected
        ));
    }

    IntegrityReport {
        account_count: stats.account_count,
        transfer_count: stats.transfer_count,
        entry_count: stats.entry_count,
        total_balance: stats.total_balance,
        is_balanced: stats.entry_total == 0 && stats.entry_count == stats.transfer_count * 2,
        issues,
    }
}
