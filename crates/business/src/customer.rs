//! Customer operations - register, lookup, points summary
//!
//! CustomerService owns registration and the read paths that show a
//! customer their balance.

use crate::error::{BusinessError, BusinessResult};
use crate::expiry::{ExpiryReconciler, LAZY_EXPIRY_DESCRIPTION};
use crate::services::{load_customer, ServiceContext};
use loyalty_core::{generate_membership_id, Customer, LedgerEvent, PointsBatch};
use loyalty_persistence::{BatchRepo, CustomerRepo};
use serde::Serialize;

/// Membership ids are random; retry this many times on a collision.
const MAX_ID_ATTEMPTS: usize = 5;

/// Listing size for customer search
pub const SEARCH_LIMIT: i64 = 20;

/// Balance with the batches behind it, soonest-to-expire first
#[derive(Debug, Clone, Serialize)]
pub struct PointsSummary {
    pub customer: Customer,
    pub batches: Vec<PointsBatch>,
    /// Points retired by the reconciliation that ran for this read
    pub expired_points: i64,
}

impl PointsSummary {
    pub fn next_expiry(&self) -> Option<&PointsBatch> {
        self.batches.first()
    }
}

pub struct CustomerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CustomerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Register a new customer with a zero balance
    pub async fn register(
        &self,
        name: &str,
        phone_number: &str,
        address: Option<&str>,
    ) -> BusinessResult<Customer> {
        let phone_number = phone_number.trim();
        let now = self.ctx.now();

        // Validate before touching storage
        let mut customer =
            Customer::register(generate_membership_id(), name, phone_number, address, now)?;

        if CustomerRepo::find_by_phone(self.ctx.pool(), phone_number)
            .await?
            .is_some()
        {
            return Err(BusinessError::DuplicatePhone(phone_number.to_string()));
        }

        let mut attempts = 1;
        while CustomerRepo::find_by_id(self.ctx.pool(), &customer.customer_id)
            .await?
            .is_some()
        {
            if attempts == MAX_ID_ATTEMPTS {
                return Err(BusinessError::InvalidInput(
                    "could not allocate a unique membership number".to_string(),
                ));
            }
            customer.customer_id = generate_membership_id();
            attempts += 1;
        }

        CustomerRepo::insert(self.ctx.pool(), &customer)
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    BusinessError::DuplicatePhone(phone_number.to_string())
                } else {
                    e.into()
                }
            })?;

        tracing::info!(
            customer_id = %customer.customer_id,
            phone = %customer.phone_number,
            "Customer registered"
        );

        self.ctx.publish(LedgerEvent::CustomerRegistered {
            customer_id: customer.customer_id.clone(),
            name: customer.name.clone(),
            phone_number: customer.phone_number.clone(),
        });

        Ok(customer)
    }

    pub async fn get(&self, customer_id: &str) -> BusinessResult<Customer> {
        CustomerRepo::find_by_id(self.ctx.pool(), customer_id)
            .await?
            .map(Customer::from)
            .ok_or_else(|| BusinessError::CustomerNotFound(customer_id.to_string()))
    }

    /// Most recent customers, or those whose phone, id or name contains `query`
    pub async fn search(&self, query: Option<&str>) -> BusinessResult<Vec<Customer>> {
        let rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => CustomerRepo::search(self.ctx.pool(), q, SEARCH_LIMIT).await?,
            None => CustomerRepo::recent(self.ctx.pool(), SEARCH_LIMIT).await?,
        };
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    /// Current balance and live batches.
    ///
    /// Reconciles expiry first in its own unit of work so the balance shown
    /// equals the sum of the batches listed.
    pub async fn points_summary(&self, customer_id: &str) -> BusinessResult<PointsSummary> {
        let _guard = self.ctx.locks().acquire(customer_id).await;
        let now = self.ctx.now();

        let mut tx = self.ctx.pool().begin().await?;
        load_customer(&mut tx, customer_id).await?;
        let expiry =
            ExpiryReconciler::reconcile_in(&mut tx, customer_id, now, LAZY_EXPIRY_DESCRIPTION)
                .await?;
        let customer = load_customer(&mut tx, customer_id).await?;
        let batches = BatchRepo::live_for_customer(&mut *tx, customer_id, now).await?;
        tx.commit().await?;

        if let Some(event) = expiry.event(customer_id) {
            self.ctx.publish(event);
        }

        Ok(PointsSummary {
            customer: customer.into(),
            batches: batches.into_iter().map(PointsBatch::from).collect(),
            expired_points: expiry.expired_points,
        })
    }
}
