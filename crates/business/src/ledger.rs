//! Ledger read side - listing, history and invariant checks

use crate::error::{BusinessError, BusinessResult};
use crate::services::ServiceContext;
use loyalty_core::{LedgerEntry, LedgerPage, LedgerQuery};
use loyalty_persistence::{BatchRepo, CustomerRepo, LedgerEntryRow, LedgerQueryRepo, LedgerRepo};
use serde::Serialize;

/// Largest page a caller may ask for
pub const MAX_PAGE_SIZE: u32 = 500;

/// Both ledger invariants for one customer, as stored right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub customer_id: String,
    pub balance: i64,
    /// Sum of every ledger entry of the customer
    pub ledger_sum: i64,
    /// Sum of remaining points over unexpired batches
    pub live_batch_sum: i64,
    /// Points in overdue batches not yet reconciled
    pub pending_expiry: i64,
}

impl VerifyReport {
    /// balance == Σ ledger entries
    pub fn audit_ok(&self) -> bool {
        self.balance == self.ledger_sum
    }

    /// balance == Σ live batches, counting overdue batches until they are reconciled
    pub fn batches_ok(&self) -> bool {
        self.balance == self.live_batch_sum + self.pending_expiry
    }

    pub fn is_consistent(&self) -> bool {
        self.audit_ok() && self.batches_ok()
    }
}

pub struct LedgerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> LedgerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Filtered, sorted, paginated listing with a summary over all matches.
    pub async fn list(&self, query: &LedgerQuery) -> BusinessResult<LedgerPage> {
        if query.page.limit == 0 || query.page.limit > MAX_PAGE_SIZE {
            return Err(BusinessError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if let (Some(min), Some(max)) = (query.filter.min_points, query.filter.max_points) {
            if min > max {
                return Err(BusinessError::InvalidInput(format!(
                    "min_points {} exceeds max_points {}",
                    min, max
                )));
            }
        }

        let mut conn = self.ctx.pool().acquire().await?;
        let page = LedgerQueryRepo::page(&mut conn, query, self.ctx.now()).await?;
        Ok(page)
    }

    /// Full history of one customer, oldest first
    pub async fn history(&self, customer_id: &str) -> BusinessResult<Vec<LedgerEntry>> {
        if CustomerRepo::find_by_id(self.ctx.pool(), customer_id).await?.is_none() {
            return Err(BusinessError::CustomerNotFound(customer_id.to_string()));
        }
        let rows = LedgerRepo::by_customer(self.ctx.pool(), customer_id).await?;
        rows.into_iter()
            .map(|row: LedgerEntryRow| LedgerEntry::try_from(row).map_err(BusinessError::from))
            .collect()
    }

    /// Read-only operator check of both invariants
    pub async fn verify(&self, customer_id: &str) -> BusinessResult<VerifyReport> {
        let now = self.ctx.now();
        let mut tx = self.ctx.pool().begin().await?;

        let customer = CustomerRepo::find_by_id(&mut *tx, customer_id)
            .await?
            .ok_or_else(|| BusinessError::CustomerNotFound(customer_id.to_string()))?;
        let ledger_sum = LedgerRepo::sum_for_customer(&mut *tx, customer_id).await?;
        let live_batch_sum = BatchRepo::sum_live_for_customer(&mut *tx, customer_id, now).await?;
        let pending_expiry: i64 = BatchRepo::expired_for_customer(&mut *tx, customer_id, now)
            .await?
            .iter()
            .map(|b| b.remaining_points)
            .sum();
        tx.rollback().await?;

        let report = VerifyReport {
            customer_id: customer_id.to_string(),
            balance: customer.balance,
            ledger_sum,
            live_batch_sum,
            pending_expiry,
        };

        if !report.is_consistent() {
            tracing::error!(
                customer_id,
                balance = report.balance,
                ledger_sum,
                live_batch_sum,
                pending_expiry,
                "Ledger invariant broken"
            );
        }
        Ok(report)
    }
}
