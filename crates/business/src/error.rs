//! Business layer errors
//!
//! Every failure of a ledger operation falls into one [`ErrorKind`].
//! Validation and business-rule rejections carry a stable reason code for
//! callers; consistency violations and storage failures are reported
//! generically but stay distinguishable for alerting.

use loyalty_core::CoreError;
use loyalty_persistence::PersistenceError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure taxonomy of the ledger engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or unknown customer; nothing was touched
    Validation,
    /// Well-formed request the rules refuse (insufficient balance, tiny purchase)
    BusinessRule,
    /// Balance and batches disagree; the invariant was broken before this call
    Consistency,
    /// The unit of work could not complete; safe to retry
    Storage,
}

/// Business operation errors
#[derive(Debug, Error)]
pub enum BusinessError {
    // === Validation errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Phone number already registered: {0}")]
    DuplicatePhone(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // === Business rule rejections ===
    #[error("Purchase too small: {purchase} earns no points")]
    PurchaseTooSmall { purchase: Decimal },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    // === Fatal ===
    #[error("Consistency violation for customer {customer_id}: {detail}")]
    ConsistencyViolation { customer_id: String, detail: String },

    #[error("Storage failure: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias for business operations
pub type BusinessResult<T> = Result<T, BusinessError>;

impl BusinessError {
    pub fn insufficient_balance(requested: i64, available: i64) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn consistency(customer_id: &str, detail: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            customer_id: customer_id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidInput(_)
            | Self::CustomerNotFound(_)
            | Self::DuplicatePhone(_)
            | Self::Config(_) => ErrorKind::Validation,
            Self::PurchaseTooSmall { .. } | Self::InsufficientBalance { .. } => {
                ErrorKind::BusinessRule
            }
            Self::ConsistencyViolation { .. } => ErrorKind::Consistency,
            Self::Persistence(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable reason
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidInput(_) => "invalid_input",
            Self::CustomerNotFound(_) => "customer_not_found",
            Self::DuplicatePhone(_) => "duplicate_phone",
            Self::Config(_) => "invalid_config",
            Self::PurchaseTooSmall { .. } => "purchase_too_small",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::ConsistencyViolation { .. } => "consistency_violation",
            Self::Persistence(_) => "storage_failure",
        }
    }

    /// Message safe to show a caller. Fatal kinds are reported generically.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::BusinessRule => self.to_string(),
            ErrorKind::Consistency | ErrorKind::Storage => {
                "Operation failed; no changes were applied".to_string()
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Consistency | ErrorKind::Storage)
    }
}

impl From<CoreError> for BusinessError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            CoreError::PurchaseTooSmall { purchase } => Self::PurchaseTooSmall { purchase },
            CoreError::InvalidPhone(_) | CoreError::InvalidName(_) | CoreError::InvalidEntryKind(_) => {
                Self::InvalidInput(err.to_string())
            }
            CoreError::BatchesExhausted { .. } => Self::ConsistencyViolation {
                customer_id: String::new(),
                detail: err.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for BusinessError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}
