//! # Error Module
//!
//! Domain errors raised by the pure ledger rules, using thiserror.

use rust_decimal::Decimal;
use thiserror::Error;

/// Core domain errors.
///
/// These never involve storage: they are produced by validation and by the
/// points arithmetic before any unit of work is opened.
#[derive(Debug, Error)]
pub enum CoreError {
    // === Amount errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Purchase too small: {purchase} earns no points")]
    PurchaseTooSmall { purchase: Decimal },

    // === Customer errors ===
    #[error("Invalid phone number: {0} (must be exactly 10 digits)")]
    InvalidPhone(String),

    #[error("Invalid customer name: {0}")]
    InvalidName(String),

    #[error("Invalid entry kind: {0}")]
    InvalidEntryKind(String),

    // === Ledger errors ===
    #[error("Batches exhausted: requested {requested}, short by {shortfall}")]
    BatchesExhausted { requested: i64, shortfall: i64 },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Business-rule rejections, as opposed to malformed input.
    pub fn is_business_rule(&self) -> bool {
        matches!(self, CoreError::PurchaseTooSmall { .. })
    }

    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, CoreError::BatchesExhausted { .. })
    }
}
