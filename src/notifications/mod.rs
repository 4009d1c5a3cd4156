//! Post-commit notification jobs.
//!
//! Core operations never talk to a mail transport. They return the jobs they
//! want delivered alongside their committed result ([`Committed`]); handlers
//! hand those jobs to a [`NotificationDispatcher`] once the transaction is
//! durable. Delivery is best-effort: failures are logged and counted, never
//! surfaced to the caller.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{order, return_request};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmed,
    OrderShipped {
        carrier: Option<String>,
        tracking_number: Option<String>,
    },
    OrderDelivered,
    RefundIssued {
        return_request_id: Uuid,
    },
}

/// One delivery job produced by a committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub order_id: Uuid,
    pub order_number: Option<i32>,
    pub email: Option<String>,
}

impl Notification {
    fn for_order(kind: NotificationKind, order: &order::Model) -> Self {
        Self {
            kind,
            order_id: order.id,
            order_number: order.order_number,
            email: order.contact_email.clone(),
        }
    }

    pub fn order_confirmed(order: &order::Model) -> Self {
        Self::for_order(NotificationKind::OrderConfirmed, order)
    }

    pub fn order_shipped(order: &order::Model) -> Self {
        Self::for_order(
            NotificationKind::OrderShipped {
                carrier: order.carrier.clone(),
                tracking_number: order.tracking_number.clone(),
            },
            order,
        )
    }

    pub fn order_delivered(order: &order::Model) -> Self {
        Self::for_order(NotificationKind::OrderDelivered, order)
    }

    pub fn refund_issued(request: &return_request::Model, order: &order::Model) -> Self {
        Self::for_order(
            NotificationKind::RefundIssued {
                return_request_id: request.id,
            },
            order,
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NotificationKind::OrderConfirmed => "order_confirmed",
            NotificationKind::OrderShipped { .. } => "order_shipped",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::RefundIssued { .. } => "refund_issued",
        }
    }
}

/// A committed result together with the jobs to attempt after commit.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Committed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            notifications: Vec::new(),
        }
    }

    pub fn with(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Committed<U> {
        Committed {
            value: f(self.value),
            notifications: self.notifications,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification has no recipient")]
    MissingRecipient,
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Delivers a single notification job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes jobs to the log; the default when no mail transport is wired in.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let email = notification
            .email
            .as_deref()
            .ok_or(NotificationError::MissingRecipient)?;
        info!(
            kind = notification.kind_name(),
            order_id = %notification.order_id,
            order_number = ?notification.order_number,
            to = email,
            "notification delivered"
        );
        Ok(())
    }
}

/// Runs post-commit jobs with bounded concurrency, swallowing failures.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, concurrency: usize) -> Self {
        Self {
            notifier,
            concurrency: concurrency.max(1),
        }
    }

    /// Attempts every job and returns how many were delivered.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn dispatch_all(&self, jobs: Vec<Notification>) -> usize {
        let delivered = AtomicUsize::new(0);
        stream::iter(jobs)
            .for_each_concurrent(self.concurrency, |job| {
                let delivered = &delivered;
                async move {
                    match self.notifier.deliver(&job).await {
                        Ok(()) => {
                            delivered.fetch_add(1, Ordering::Relaxed);
                            counter!("storefront.notifications.delivered", 1);
                        }
                        Err(e) => {
                            warn!(
                                kind = job.kind_name(),
                                order_id = %job.order_id,
                                error = %e,
                                "notification delivery failed"
                            );
                            counter!("storefront.notifications.failed", 1);
                        }
                    }
                }
            })
            .await;
        delivered.into_inner()
    }

    /// Unwraps a committed result after attempting its jobs.
    pub async fn settle<T>(&self, committed: Committed<T>) -> T {
        if !committed.notifications.is_empty() {
            self.dispatch_all(committed.notifications).await;
        }
        committed.value
    }
}
