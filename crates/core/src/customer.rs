//! # Customer Module
//!
//! Loyalty programme members. The `balance` field is owned by the ledger
//! engine: it is created at zero and only accrual, redemption and expiry
//! move it.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered loyalty customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// 8-digit membership number shown at billing
    pub customer_id: String,
    pub name: String,
    /// Exactly 10 digits, unique across customers
    pub phone_number: String,
    pub address: Option<String>,
    /// Spendable points; never negative
    pub balance: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Build a new customer with a zero balance after validating name and phone.
    pub fn register(
        customer_id: String,
        name: &str,
        phone_number: &str,
        address: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidName("name is required".to_string()));
        }
        validate_phone(phone_number)?;

        Ok(Self {
            customer_id,
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            address: address
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            balance: 0,
            is_active: true,
            created_at,
        })
    }
}

/// Phone numbers are exactly ten ASCII digits.
pub fn validate_phone(phone: &str) -> CoreResult<()> {
    if phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CoreError::InvalidPhone(phone.to_string()))
    }
}

/// Random 8-digit membership number in `10000000..=99999999`.
pub fn generate_membership_id() -> String {
    let n = Uuid::new_v4().as_u128() % 90_000_000;
    format!("{}", 10_000_000 + n)
}
