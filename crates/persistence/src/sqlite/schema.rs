//! Database schema definitions
//!
//! Row types for sqlx mapping from SQLite tables.
//! The schema lives in migrations/20261016_init.sql

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, NaiveDate, Utc};
use loyalty_core::{Customer, EntryKind, LedgerEntry, LedgerRecord, MessageType, PointsBatch};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Row type for table `customers`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CustomerRow {
    pub customer_id: String,
    pub name: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub balance: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `point_batches`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BatchRow {
    pub batch_id: i64,
    pub customer_id: String,
    pub earned_points: i64,
    pub remaining_points: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Row type for table `ledger_entries`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    pub entry_id: i64,
    pub customer_id: String,
    pub kind: String,
    pub points: i64,
    pub balance_after: i64,
    pub purchase_amount: Option<String>, // Decimal stored as TEXT
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry joined with `customers` for listings
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRecordRow {
    #[sqlx(flatten)]
    pub entry: LedgerEntryRow,
    pub customer_name: String,
    pub phone_number: String,
}

/// Entry to append; ids are assigned by SQLite
#[derive(Debug, Clone)]
pub struct NewLedgerEntry<'a> {
    pub customer_id: &'a str,
    pub kind: EntryKind,
    pub points: i64,
    pub balance_after: i64,
    pub purchase_amount: Option<Decimal>,
    pub description: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Per-customer totals of overdue batches (sweep phase A)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpiredGroupRow {
    pub customer_id: String,
    pub batch_count: i64,
    pub points: i64,
}

/// Per-customer totals of batches about to expire (sweep phase B)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpiringGroupRow {
    pub customer_id: String,
    pub name: String,
    pub phone_number: String,
    pub batch_count: i64,
    pub points: i64,
    pub earliest_expiry: DateTime<Utc>,
}

/// Sum and count of ledger points per kind
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KindTotalsRow {
    pub kind: String,
    pub points: i64,
    pub entries: i64,
}

/// Row type for table `message_logs`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MessageLogRow {
    pub log_id: i64,
    pub customer_id: String,
    pub message_type: String,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `daily_reports`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct DailyReportRow {
    pub report_date: NaiveDate,
    pub new_customers: i64,
    pub total_customers: i64,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub points_expired: i64,
    pub transaction_count: i64,
    pub total_purchase_amount: String, // Decimal stored as TEXT
    pub generated_at: DateTime<Utc>,
}

// === Conversion implementations ===

/// Parse a decimal stored as TEXT
pub fn parse_decimal(value: &str) -> PersistenceResult<Decimal> {
    Decimal::from_str(value).map_err(|e| PersistenceError::InvalidDecimal(format!("{value}: {e}")))
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            customer_id: row.customer_id,
            name: row.name,
            phone_number: row.phone_number,
            address: row.address,
            balance: row.balance,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl From<BatchRow> for PointsBatch {
    fn from(row: BatchRow) -> Self {
        Self {
            batch_id: row.batch_id,
            customer_id: row.customer_id,
            earned_points: row.earned_points,
            remaining_points: row.remaining_points,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = PersistenceError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        let kind = EntryKind::from_str(&row.kind).map_err(|_| PersistenceError::InvalidEnumValue {
            field: "kind".to_string(),
            value: row.kind.clone(),
        })?;
        let purchase_amount = row.purchase_amount.as_deref().map(parse_decimal).transpose()?;

        Ok(Self {
            entry_id: row.entry_id,
            customer_id: row.customer_id,
            kind,
            points: row.points,
            balance_after: row.balance_after,
            purchase_amount,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<LedgerRecordRow> for LedgerRecord {
    type Error = PersistenceError;

    fn try_from(row: LedgerRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entry: row.entry.try_into()?,
            customer_name: row.customer_name,
            phone_number: row.phone_number,
        })
    }
}

impl MessageLogRow {
    pub fn message_type(&self) -> PersistenceResult<MessageType> {
        match self.message_type.as_str() {
            "WELCOME" => Ok(MessageType::Welcome),
            "TXN" => Ok(MessageType::Txn),
            "EXPIRY" => Ok(MessageType::Expiry),
            "DAILY_REPORT" => Ok(MessageType::DailyReport),
            other => Err(PersistenceError::InvalidEnumValue {
                field: "message_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl DailyReportRow {
    pub fn total_purchase_amount(&self) -> PersistenceResult<Decimal> {
        parse_decimal(&self.total_purchase_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_row(kind: &str, purchase: Option<&str>) -> LedgerEntryRow {
        LedgerEntryRow {
            entry_id: 1,
            customer_id: "10000001".into(),
            kind: kind.into(),
            points: 50,
            balance_after: 50,
            purchase_amount: purchase.map(str::to_string),
            description: "Purchase".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_row_conversion() {
        let entry = LedgerEntry::try_from(entry_row("EARN", Some("500.00"))).unwrap();
        assert_eq!(entry.kind, EntryKind::Earn);
        assert_eq!(entry.purchase_amount, Some(Decimal::new(50000, 2)));
    }

    #[test]
    fn test_entry_row_rejects_bad_values() {
        let err = LedgerEntry::try_from(entry_row("BONUS", None)).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidEnumValue { .. }));

        let err = LedgerEntry::try_from(entry_row("EARN", Some("12,5"))).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidDecimal(_)));
    }
}
