//! # Event Module
//!
//! Outbound events emitted after a ledger unit of work commits. They feed
//! collaborators (customer messaging, stats cache) and never feed back into
//! the ledger itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an outbound customer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Welcome,
    /// Earn / redeem receipt
    Txn,
    /// Expiry warning or notice
    Expiry,
    DailyReport,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Welcome => "WELCOME",
            MessageType::Txn => "TXN",
            MessageType::Expiry => "EXPIRY",
            MessageType::DailyReport => "DAILY_REPORT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event published after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    CustomerRegistered {
        customer_id: String,
        name: String,
        phone_number: String,
    },
    PointsEarned {
        customer_id: String,
        phone_number: String,
        purchase_amount: Decimal,
        points: i64,
        new_balance: i64,
        expires_at: DateTime<Utc>,
    },
    PointsRedeemed {
        customer_id: String,
        phone_number: String,
        points: i64,
        new_balance: i64,
        batches_consumed: usize,
    },
    /// Lazy or swept expiry; no customer message is sent for it
    PointsExpired {
        customer_id: String,
        points: i64,
        batches: usize,
        new_balance: i64,
    },
}

impl LedgerEvent {
    pub fn customer_id(&self) -> &str {
        match self {
            LedgerEvent::CustomerRegistered { customer_id, .. }
            | LedgerEvent::PointsEarned { customer_id, .. }
            | LedgerEvent::PointsRedeemed { customer_id, .. }
            | LedgerEvent::PointsExpired { customer_id, .. } => customer_id,
        }
    }

    /// Whether the event changed a balance (and so stale aggregate stats).
    pub fn affects_balance(&self) -> bool {
        !matches!(self, LedgerEvent::CustomerRegistered { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::CustomerRegistered { .. } => "customer_registered",
            LedgerEvent::PointsEarned { .. } => "points_earned",
            LedgerEvent::PointsRedeemed { .. } => "points_redeemed",
            LedgerEvent::PointsExpired { .. } => "points_expired",
        }
    }
}
