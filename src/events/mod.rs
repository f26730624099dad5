use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::services::notifications::NotificationDispatcher;

/// Domain events emitted by the checkout, order, and payment services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderCancelled(Uuid),
    OrderFulfilled(Uuid),
    CouponRedeemed { code: String, order_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Consumes domain events and drives the notification dispatcher.
///
/// Runs as a background task decoupled from the request/response cycle;
/// notification failures are logged here and never reach the request path.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<NotificationDispatcher>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                match load_order_with_items(&db, order_id).await {
                    Some((order, items)) => {
                        if let Err(e) = dispatcher.order_confirmed(&order, &items).await {
                            error!(
                                order_id = %order_id,
                                "Failed to send order confirmation: {}", e
                            );
                        }
                    }
                    None => warn!(order_id = %order_id, "OrderCreated event for unknown order"),
                }
            }
            Event::OrderPaid(order_id) => match load_order(&db, order_id).await {
                Some(order) => {
                    if let Err(e) = dispatcher.payment_received(&order).await {
                        error!(
                            order_id = %order_id,
                            "Failed to send payment notification: {}", e
                        );
                    }
                }
                None => warn!(order_id = %order_id, "OrderPaid event for unknown order"),
            },
            Event::OrderFulfilled(order_id) => match load_order(&db, order_id).await {
                Some(order) => {
                    if let Err(e) = dispatcher.order_shipped(&order).await {
                        error!(
                            order_id = %order_id,
                            "Failed to send shipped notification: {}", e
                        );
                    }
                }
                None => warn!(order_id = %order_id, "OrderFulfilled event for unknown order"),
            },
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "Order cancelled");
            }
            Event::CouponRedeemed { code, order_id } => {
                info!(code = %code, order_id = %order_id, "Coupon redeemed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

async fn load_order(db: &DatabaseConnection, order_id: Uuid) -> Option<order::Model> {
    match order::Entity::find_by_id(order_id).one(db).await {
        Ok(order) => order,
        Err(e) => {
            error!(order_id = %order_id, "Failed to load order for event: {}", e);
            None
        }
    }
}

async fn load_order_with_items(
    db: &DatabaseConnection,
    order_id: Uuid,
) -> Option<(order::Model, Vec<order_item::Model>)> {
    let order = load_order(db, order_id).await?;
    match order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await
    {
        Ok(items) => Some((order, items)),
        Err(e) => {
            error!(order_id = %order_id, "Failed to load order items for event: {}", e);
            Some((order, Vec::new()))
        }
    }
}
