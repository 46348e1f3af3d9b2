use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::PaymentMethod;

/// Checkout lifecycle events, emitted for observers such as analytics or an
/// activity log. Consumers receive them over an mpsc channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckoutEvent {
    PaymentPageEntered {
        identity: String,
    },
    SummaryFetched {
        identity: String,
        item_count: usize,
        total_amount: Decimal,
    },
    CouponApplied {
        code: String,
        discount: Decimal,
    },
    CouponRejected {
        code: String,
    },
    MethodSelected {
        method: PaymentMethod,
    },
    PaymentPhaseChanged {
        attempt_id: Uuid,
        phase: String,
    },
    PaymentConfirmed {
        attempt_id: Uuid,
        order_id: String,
        amount: Decimal,
        confirmed_at: DateTime<Utc>,
    },
    PaymentFailed {
        attempt_id: Uuid,
        reason: String,
    },
    PaymentAbandoned {
        attempt_id: Uuid,
    },
    CheckoutCleared,
}

/// Event sender wrapper for publishing checkout events
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<CheckoutEvent>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<CheckoutEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving half.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CheckoutEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: CheckoutEvent) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of erroring when the receiving half
    /// is gone. Event delivery never fails a checkout operation.
    pub async fn send_or_log(&self, event: CheckoutEvent) {
        if let Err(err) = self.send(event).await {
            warn!("{err}");
        }
    }
}
