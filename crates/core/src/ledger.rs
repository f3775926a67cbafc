//! # Ledger Module
//!
//! Immutable audit records. Every balance change writes exactly one
//! `LedgerEntry` inside the same transaction, so the running sum of
//! `points` for a customer always equals their balance.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    /// Points accrued from a purchase (positive)
    Earn,
    /// Points spent (negative)
    Redeem,
    /// Points retired after their validity window (negative)
    Expiry,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earn => "EARN",
            EntryKind::Redeem => "REDEEM",
            EntryKind::Expiry => "EXPIRY",
        }
    }

    pub fn all() -> [EntryKind; 3] {
        [EntryKind::Earn, EntryKind::Redeem, EntryKind::Expiry]
    }
}

impl FromStr for EntryKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EARN" => Ok(EntryKind::Earn),
            "REDEEM" => Ok(EntryKind::Redeem),
            "EXPIRY" => Ok(EntryKind::Expiry),
            _ => Err(CoreError::InvalidEntryKind(s.to_string())),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record of one balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: i64,
    pub customer_id: String,
    pub kind: EntryKind,
    /// Signed: positive for EARN, negative for REDEEM / EXPIRY
    pub points: i64,
    /// Customer balance immediately after this entry
    pub balance_after: i64,
    /// Only set for EARN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_amount: Option<Decimal>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_parse() {
        assert_eq!("earn".parse::<EntryKind>().unwrap(), EntryKind::Earn);
        assert_eq!(" REDEEM ".parse::<EntryKind>().unwrap(), EntryKind::Redeem);
        assert_eq!("Expiry".parse::<EntryKind>().unwrap(), EntryKind::Expiry);
        assert!("refund".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_entry_kind_serde() {
        let json = serde_json::to_string(&EntryKind::Expiry).unwrap();
        assert_eq!(json, "\"EXPIRY\"");
    }
}
