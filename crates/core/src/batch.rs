//! # Batch Module
//!
//! `PointsBatch` is the spendable remainder of one accrual. Redemption drains
//! batches soonest-to-expire first; [`plan_redemption`] computes that walk
//! without touching storage so the engine only has to apply it.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accrual event's still-spendable points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBatch {
    pub batch_id: i64,
    pub customer_id: String,
    /// Fixed at creation
    pub earned_points: i64,
    /// 0 <= remaining_points <= earned_points
    pub remaining_points: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PointsBatch {
    /// A batch is expired once its deadline is reached (`expires_at <= now`).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.remaining_points > 0 && !self.is_expired(now)
    }
}

/// What a redemption takes from a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: i64,
    pub taken: i64,
    pub remaining_after: i64,
}

impl BatchDraw {
    /// Fully drained batches are deleted rather than kept at zero.
    pub fn exhausts_batch(&self) -> bool {
        self.remaining_after == 0
    }
}

/// Ordered list of draws that together cover the requested amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedemptionPlan {
    pub draws: Vec<BatchDraw>,
}

impl RedemptionPlan {
    pub fn total(&self) -> i64 {
        self.draws.iter().map(|d| d.taken).sum()
    }

    pub fn batches_consumed(&self) -> usize {
        self.draws.len()
    }
}

/// Walk `batches` in order, taking `min(remaining, still_needed)` from each.
///
/// The caller supplies batches already sorted by `expires_at` ascending.
/// Running out of batches before `requested` is covered means the balance
/// and the batches disagree; that is reported as
/// [`CoreError::BatchesExhausted`] and never partially applied.
pub fn plan_redemption(batches: &[PointsBatch], requested: i64) -> CoreResult<RedemptionPlan> {
    if requested <= 0 {
        return Err(CoreError::InvalidAmount(format!(
            "Redemption amount must be positive: {}",
            requested
        )));
    }

    let mut still_needed = requested;
    let mut draws = Vec::new();

    for batch in batches {
        if still_needed == 0 {
            break;
        }
        if batch.remaining_points <= 0 {
            continue;
        }
        let taken = batch.remaining_points.min(still_needed);
        draws.push(BatchDraw {
            batch_id: batch.batch_id,
            taken,
            remaining_after: batch.remaining_points - taken,
        });
        still_needed -= taken;
    }

    if still_needed > 0 {
        return Err(CoreError::BatchesExhausted {
            requested,
            shortfall: still_needed,
        });
    }

    Ok(RedemptionPlan { draws })
}
