//! Outbound customer messaging
//!
//! The ledger only needs "send this text to this phone". Delivery is
//! best-effort: a failed send is logged by the caller and never fails the
//! ledger operation that triggered it.

use async_trait::async_trait;
use loyalty_core::{validate_phone, Clock, MessageType};
use loyalty_persistence::{MessageLogRepo, PersistenceError};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

/// Recipient id used in `message_logs` for operator messages
pub const ADMIN_RECIPIENT: &str = "ADMIN";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery to {phone} failed: {reason}")]
    Delivery { phone: String, reason: String },

    #[error("Message log error: {0}")]
    Log(#[from] PersistenceError),
}

/// Message delivery collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        customer_id: &str,
        phone_number: &str,
        message_type: MessageType,
        body: &str,
    ) -> Result<(), NotifyError>;
}

/// Logs messages instead of sending them and records each attempt in
/// `message_logs`.
pub struct SimulatedNotifier {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SimulatedNotifier {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl Notifier for SimulatedNotifier {
    async fn notify(
        &self,
        customer_id: &str,
        phone_number: &str,
        message_type: MessageType,
        body: &str,
    ) -> Result<(), NotifyError> {
        // A malformed number is the one failure a simulated gateway can have
        let delivered = validate_phone(phone_number).is_ok();

        MessageLogRepo::insert(
            &self.pool,
            customer_id,
            message_type,
            body,
            delivered,
            self.clock.now(),
        )
        .await?;

        if !delivered {
            return Err(NotifyError::Delivery {
                phone: phone_number.to_string(),
                reason: "invalid phone number".to_string(),
            });
        }

        tracing::info!(
            customer_id,
            phone = phone_number,
            message_type = %message_type,
            "Message sent: {}",
            body
        );
        Ok(())
    }
}
