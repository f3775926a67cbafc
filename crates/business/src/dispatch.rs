//! Post-commit event fan-out
//!
//! The engine publishes a [`LedgerEvent`] only after its transaction has
//! committed. Each subscriber runs on its own tokio task; failures are
//! logged and never reach the ledger operation's caller.

use crate::cache::StatsCache;
use crate::notify::{Notifier, NotifyError};
use async_trait::async_trait;
use loyalty_core::{LedgerEvent, MessageType};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Subscriber '{name}' failed: {reason}")]
    SubscriberFailed { name: String, reason: String },

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Consumer of committed ledger events
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Get the subscriber name (for logging)
    fn name(&self) -> &str;

    async fn handle(&self, event: &LedgerEvent) -> Result<(), DispatchError>;
}

/// Fire-and-forget fan-out to registered subscribers
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Hand the event to every subscriber without waiting for them.
    pub fn publish(&self, event: LedgerEvent) {
        let event = Arc::new(event);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());

        for subscriber in &self.subscribers {
            let subscriber = Arc::clone(subscriber);
            let event = Arc::clone(&event);
            pending.push(tokio::spawn(async move {
                match subscriber.handle(&event).await {
                    Ok(()) => tracing::debug!(
                        subscriber = subscriber.name(),
                        event = event.name(),
                        "Event delivered"
                    ),
                    Err(e) => tracing::warn!(
                        subscriber = subscriber.name(),
                        event = event.name(),
                        customer_id = event.customer_id(),
                        error = %e,
                        "Event subscriber failed"
                    ),
                }
            }));
        }
    }

    /// Wait for every delivery published so far.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Event delivery task panicked");
            }
        }
    }
}

/// Renders customer messages for earn, redeem and welcome events
pub struct NotificationSubscriber {
    notifier: Arc<dyn Notifier>,
}

impl NotificationSubscriber {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Message for an event, or `None` when the customer is not told.
    pub fn render(event: &LedgerEvent) -> Option<(&str, MessageType, String)> {
        match event {
            LedgerEvent::CustomerRegistered {
                customer_id,
                name,
                phone_number,
            } => Some((
                phone_number.as_str(),
                MessageType::Welcome,
                format!(
                    "Welcome {}! Your membership number is {}. Earn points on every purchase.",
                    name, customer_id
                ),
            )),
            LedgerEvent::PointsEarned {
                phone_number,
                purchase_amount,
                points,
                new_balance,
                expires_at,
                ..
            } => Some((
                phone_number.as_str(),
                MessageType::Txn,
                format!(
                    "You earned {} points on a purchase of {}. Balance: {} points. These points expire on {}.",
                    points,
                    purchase_amount,
                    new_balance,
                    expires_at.format("%Y-%m-%d")
                ),
            )),
            LedgerEvent::PointsRedeemed {
                phone_number,
                points,
                new_balance,
                ..
            } => Some((
                phone_number.as_str(),
                MessageType::Txn,
                format!(
                    "You redeemed {} points. Remaining balance: {} points.",
                    points, new_balance
                ),
            )),
            LedgerEvent::PointsExpired { .. } => None,
        }
    }
}

#[async_trait]
impl EventSubscriber for NotificationSubscriber {
    fn name(&self) -> &str {
        "notification"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<(), DispatchError> {
        if let Some((phone, message_type, body)) = Self::render(event) {
            self.notifier
                .notify(event.customer_id(), phone, message_type, &body)
                .await?;
        }
        Ok(())
    }
}

/// Drops cached statistics after balance-affecting events
pub struct CacheInvalidationSubscriber {
    cache: Arc<dyn StatsCache>,
}

impl CacheInvalidationSubscriber {
    pub fn new(cache: Arc<dyn StatsCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventSubscriber for CacheInvalidationSubscriber {
    fn name(&self) -> &str {
        "stats_cache"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<(), DispatchError> {
        if event.affects_balance() {
            self.cache.invalidate_aggregates();
        }
        Ok(())
    }
}
