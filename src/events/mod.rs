use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{OrderStatus, PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is closed.
    /// Events are notifications only; a committed order must never be
    /// reported as failed because nobody was listening.
    pub async fn send_or_log(&self, event: Event) {
        let kind = event.kind();
        if let Err(e) = self.send(event).await {
            warn!(event = kind, error = %e, "Dropping domain event");
        }
    }
}

// Domain events emitted after the owning transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
        restored_units: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    StockAdjusted {
        perfume_id: Uuid,
        delta: i32,
        new_stock: i32,
    },
    LowStock {
        perfume_id: Uuid,
        remaining: i32,
        threshold: i32,
    },
    CartCleared {
        user_id: Uuid,
        lines_removed: u64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentStatusChanged { .. } => "payment_status_changed",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::LowStock { .. } => "low_stock",
            Event::CartCleared { .. } => "cart_cleared",
        }
    }
}

/// Event envelope as written to the log
#[derive(Debug, Serialize)]
struct LoggedEvent<'a> {
    kind: &'static str,
    received_at: DateTime<Utc>,
    event: &'a Event,
}

// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let envelope = LoggedEvent {
            kind: event.kind(),
            received_at: Utc::now(),
            event: &event,
        };
        let payload = serde_json::to_string(&envelope).unwrap_or_else(|_| format!("{:?}", event));

        match &event {
            Event::LowStock {
                perfume_id,
                remaining,
                threshold,
            } => {
                warn!(
                    perfume_id = %perfume_id,
                    remaining = remaining,
                    threshold = threshold,
                    "Perfume stock at or below threshold"
                );
            }
            Event::OrderPlaced {
                order_id,
                order_number,
                ..
            } => {
                info!(order_id = %order_id, order_number = %order_number, payload = %payload, "Order placed");
            }
            _ => {
                info!(event = envelope.kind, payload = %payload, "Domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::CartCleared {
                user_id: Uuid::new_v4(),
                lines_removed: 2,
            })
            .await;
    }

    #[tokio::test]
    async fn process_events_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let handle = tokio::spawn(process_events(rx));

        sender
            .send(Event::StockAdjusted {
                perfume_id: Uuid::new_v4(),
                delta: 5,
                new_stock: 12,
            })
            .await
            .unwrap();
        drop(sender);

        handle.await.unwrap();
    }
}
