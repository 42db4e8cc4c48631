//! Fire-and-forget domain events.
//!
//! Publishing never blocks a request: events go onto a bounded channel with
//! `try_send` and are dropped with a warning when the dispatcher falls behind.
//! The dispatcher stands in for notification hooks (email, analytics).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{PayoutMethod, Processor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PaymentCaptured {
        transaction_id: Uuid,
        fundraiser_id: Uuid,
        processor: Processor,
        gross_amount: i64,
        net_amount: i64,
        currency: String,
    },
    PaymentFailed {
        transaction_id: Uuid,
        fundraiser_id: Uuid,
        processor: Processor,
        reason: String,
    },
    PaymentRefunded {
        transaction_id: Uuid,
        fundraiser_id: Uuid,
        processor: Processor,
        gross_amount: i64,
        currency: String,
    },
    PayoutRequested {
        payout_id: Uuid,
        fundraiser_id: Uuid,
        requested_by: Uuid,
        method: PayoutMethod,
    },
    PayoutCompleted {
        payout_id: Uuid,
        fundraiser_id: Uuid,
        total_net: i64,
        currency: String,
        payout_date: DateTime<Utc>,
    },
    PayoutFailed {
        payout_id: Uuid,
        fundraiser_id: Uuid,
        notes: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PaymentCaptured { .. } => "payment_captured",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::PaymentRefunded { .. } => "payment_refunded",
            Event::PayoutRequested { .. } => "payout_requested",
            Event::PayoutCompleted { .. } => "payout_completed",
            Event::PayoutFailed { .. } => "payout_failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving half for the dispatcher.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Publishes without waiting. A full or closed channel drops the event.
    pub fn publish(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(event) => ("channel full", event),
                mpsc::error::TrySendError::Closed(event) => ("channel closed", event),
            };
            warn!(event = event.name(), reason, "Dropping domain event");
        }
    }
}

/// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentCaptured {
                transaction_id,
                fundraiser_id,
                net_amount,
                currency,
                ..
            } => info!(
                event = event.name(),
                %transaction_id,
                %fundraiser_id,
                net_amount,
                currency = %currency,
                "Payment captured"
            ),
            Event::PaymentFailed {
                transaction_id,
                reason,
                ..
            } => info!(event = event.name(), %transaction_id, reason = %reason, "Payment failed"),
            Event::PaymentRefunded { transaction_id, .. } => {
                info!(event = event.name(), %transaction_id, "Payment refunded")
            }
            Event::PayoutRequested {
                payout_id,
                fundraiser_id,
                requested_by,
                method,
            } => info!(
                event = event.name(),
                %payout_id,
                %fundraiser_id,
                %requested_by,
                method = %method,
                "Payout requested"
            ),
            Event::PayoutCompleted {
                payout_id,
                total_net,
                currency,
                ..
            } => info!(
                event = event.name(),
                %payout_id,
                total_net,
                currency = %currency,
                "Payout completed"
            ),
            Event::PayoutFailed { payout_id, .. } => {
                info!(event = event.name(), %payout_id, "Payout failed")
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(id: Uuid) -> Event {
        Event::PaymentFailed {
            transaction_id: id,
            fundraiser_id: Uuid::new_v4(),
            processor: Processor::Stripe,
            reason: "card_declined".into(),
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_receiver() {
        let (sender, mut rx) = EventSender::channel(4);
        let id = Uuid::new_v4();
        sender.publish(failed(id));
        assert_eq!(rx.recv().await, Some(failed(id)));
    }

    #[tokio::test]
    async fn publish_drops_when_full_instead_of_blocking() {
        let (sender, mut rx) = EventSender::channel(1);
        let first = Uuid::new_v4();
        sender.publish(failed(first));
        sender.publish(failed(Uuid::new_v4()));

        assert_eq!(rx.recv().await, Some(failed(first)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(failed(Uuid::nil())).unwrap();
        assert_eq!(json["type"], "payment_failed");
        assert_eq!(json["processor"], "stripe");
    }
}
