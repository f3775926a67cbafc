//! # Policy Module
//!
//! Earn rate and validity window. Points are whole numbers:
//! `floor(purchase * earn_rate)`, and a batch lives for a fixed number of
//! calendar months.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Months, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accrual and expiry rules of the programme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsPolicy {
    /// Points per unit of purchase (0.10 = 10%)
    pub earn_rate: Decimal,
    /// Validity of a batch in calendar months
    pub validity_months: u32,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            earn_rate: Decimal::new(10, 2),
            validity_months: 6,
        }
    }
}

impl PointsPolicy {
    pub fn new(earn_rate: Decimal, validity_months: u32) -> Self {
        Self {
            earn_rate,
            validity_months,
        }
    }

    /// Points earned for a purchase, rounded down.
    ///
    /// Non-positive purchases are invalid input; purchases that round down to
    /// zero points are rejected so no empty batch is ever created.
    pub fn points_for_purchase(&self, purchase: Decimal) -> CoreResult<i64> {
        if purchase <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "Purchase amount must be positive: {}",
                purchase
            )));
        }

        let points = (purchase * self.earn_rate)
            .floor()
            .to_i64()
            .ok_or_else(|| CoreError::InvalidAmount(format!("Purchase amount too large: {}", purchase)))?;

        if points <= 0 {
            return Err(CoreError::PurchaseTooSmall { purchase });
        }
        Ok(points)
    }

    /// Deadline for a batch created at `created_at`.
    pub fn expiry_for(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at
            .checked_add_months(Months::new(self.validity_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
