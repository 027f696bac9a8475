//! # Notifications
//!
//! Fire-and-forget messages to platform users. Delivery (email, push) is an
//! external concern; the engine only hands events to a [`Notifier`] via the
//! dispatcher. A failed delivery is retried by the dispatcher and otherwise
//! logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rights_core::{ApplicationId, AssetId, Money, ProductId, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    ApplicationSubmitted {
        application_id: ApplicationId,
        asset_id: AssetId,
        applicant_id: UserId,
    },
    ApplicationApproved {
        application_id: ApplicationId,
        asset_id: AssetId,
    },
    ApplicationRejected {
        application_id: ApplicationId,
        reason: String,
    },
    LicenseRevoked {
        application_id: ApplicationId,
        reason: String,
    },
    ProductPurchased {
        transaction_id: TransactionId,
        product_id: ProductId,
        quantity: u32,
        amount: Money,
    },
    ProductSold {
        transaction_id: TransactionId,
        product_id: ProductId,
        quantity: u32,
        share: Money,
    },
    Refunded {
        transaction_id: TransactionId,
        amount: Money,
        reason: String,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplicationSubmitted { .. } => "application_submitted",
            Self::ApplicationApproved { .. } => "application_approved",
            Self::ApplicationRejected { .. } => "application_rejected",
            Self::LicenseRevoked { .. } => "license_revoked",
            Self::ProductPurchased { .. } => "product_purchased",
            Self::ProductSold { .. } => "product_sold",
            Self::Refunded { .. } => "refunded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: UserId,
    pub event: NotificationEvent,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: UserId, event: NotificationEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            event,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            notification_id = %notification.id,
            recipient = %notification.recipient,
            event = notification.event.kind(),
            "notification sent"
        );
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Event kinds delivered to `recipient`, oldest first.
    pub fn kinds_for(&self, recipient: UserId) -> Vec<&'static str> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.recipient == recipient)
            .map(|n| n.event.kind())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_notifier_filters_by_recipient() {
        let notifier = RecordingNotifier::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let event = NotificationEvent::LicenseRevoked {
            application_id: ApplicationId::new(),
            reason: "breach".into(),
        };
        notifier.notify(&Notification::new(alice, event.clone())).await.unwrap();
        notifier.notify(&Notification::new(bob, event)).await.unwrap();

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.kinds_for(alice), vec!["license_revoked"]);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = NotificationEvent::ApplicationRejected {
            application_id: ApplicationId::new(),
            reason: "incomplete".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.kind());
        assert_eq!(json["reason"], "incomplete");
    }
}
