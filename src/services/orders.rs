use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{
    self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
    PaymentMethod,
};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub slug: String,
    pub title: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub currency: String,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub payment_reference: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Owns the order aggregate after checkout: reads and state machine
/// transitions. `paid` is only ever set by the payment bridge; the
/// client-facing surface never transitions status directly.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Retrieves an order with its line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = self.load_items(order_id).await?;
        Ok(Self::model_to_response(order, items))
    }

    /// Retrieves an order by its human-readable order number.
    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order '{}' not found", order_number))
            })?;

        let items = self.load_items(order.id).await?;
        Ok(Self::model_to_response(order, items))
    }

    /// Lists non-archived orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::IsArchived.eq(false))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(Self::model_to_response(order, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            per_page,
        })
    }

    /// Transitions an order to `paid` on an external confirmation signal.
    ///
    /// Idempotent: an already-`paid` order is returned unchanged, so
    /// webhook retries and duplicate confirm calls are no-ops. Terminal
    /// states reject the transition.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        payment_reference: Option<String>,
        provider_session_id: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_model(order_id).await?;

        if order.status == OrderStatus::Paid {
            info!(order_id = %order_id, "Order already paid; confirmation is a no-op");
            let items = self.load_items(order_id).await?;
            return Ok(Self::model_to_response(order, items));
        }

        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from '{}' to 'paid'",
                order_id,
                order.status.as_str()
            )));
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(OrderStatus::Paid);
        if payment_reference.is_some() {
            active.payment_reference = Set(payment_reference);
        }
        if provider_session_id.is_some() {
            active.provider_session_id = Set(provider_session_id);
        }
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(order_id = %order_id, "Order marked paid");
        self.emit(Event::OrderPaid(order_id)).await;

        let items = self.load_items(order_id).await?;
        Ok(Self::model_to_response(updated, items))
    }

    /// Cancels an order from `awaiting_payment` or `paid`.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let updated = self
            .transition(order_id, OrderStatus::Cancelled)
            .await?;

        self.emit(Event::OrderCancelled(order_id)).await;

        let items = self.load_items(order_id).await?;
        Ok(Self::model_to_response(updated, items))
    }

    /// Marks a paid order as shipped (`paid -> fulfilled`).
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_shipped(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let updated = self
            .transition(order_id, OrderStatus::Fulfilled)
            .await?;

        self.emit(Event::OrderFulfilled(order_id)).await;

        let items = self.load_items(order_id).await?;
        Ok(Self::model_to_response(updated, items))
    }

    /// Soft-deletes an order; the row is retained forever.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn archive_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.find_model(order_id).await?;

        let mut active: OrderActiveModel = order.into();
        active.is_archived = Set(true);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(order_id = %order_id, "Order archived");
        let items = self.load_items(order_id).await?;
        Ok(Self::model_to_response(updated, items))
    }

    /// Finds the order holding the given provider payment reference.
    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .one(&*self.db)
            .await?)
    }

    /// Finds the order holding the given provider checkout-session reference.
    pub async fn find_by_provider_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::ProviderSessionId.eq(session_id))
            .one(&*self.db)
            .await?)
    }

    pub(crate) async fn find_model(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        self.find_model_opt(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub(crate) async fn find_model_opt(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find_by_id(order_id).one(&*self.db).await?)
    }

    /// Records the provider payment reference on an order without
    /// touching its status (used when an intent is created).
    pub(crate) async fn attach_payment_reference(
        &self,
        order_id: Uuid,
        reference: String,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.find_model(order_id).await?;
        let mut active: OrderActiveModel = order.into();
        active.payment_reference = Set(Some(reference));
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.find_model(order_id).await?;
        let current = order.status;

        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from '{}' to '{}'",
                order_id,
                current.as_str(),
                next.as_str()
            )));
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(next);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(
            order_id = %order_id,
            old_status = current.as_str(),
            new_status = next.as_str(),
            "Order status updated"
        );
        Ok(updated)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to send order event: {}", e);
            }
        }
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    pub(crate) fn model_to_response(
        model: OrderModel,
        items: Vec<OrderItemModel>,
    ) -> OrderResponse {
        OrderResponse {
            id: model.id,
            order_number: model.order_number,
            status: model.status,
            payment_method: model.payment_method,
            currency: model.currency,
            subtotal: model.subtotal,
            shipping: model.shipping,
            tax: model.tax,
            discount_amount: model.discount_amount,
            total: model.total,
            coupon_code: model.coupon_code,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            address: model.address,
            city: model.city,
            state: model.state,
            zip_code: model.zip_code,
            country: model.country,
            payment_reference: model.payment_reference,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    slug: item.slug,
                    title: item.title,
                    image: item.image,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    line_total: item.line_total,
                })
                .collect(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_fixture(status: OrderStatus) -> OrderModel {
        let now = Utc::now();
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "ORD-DEADBEEF".into(),
            status,
            payment_method: PaymentMethod::Card,
            currency: "USD".into(),
            subtotal: dec!(20.00),
            shipping: dec!(10.00),
            tax: dec!(1.60),
            discount_amount: dec!(0.00),
            total: dec!(31.60),
            coupon_code: None,
            customer_name: "Test Customer".into(),
            customer_email: "customer@example.com".into(),
            customer_phone: None,
            address: "1 Main St".into(),
            city: None,
            state: None,
            zip_code: None,
            country: None,
            payment_reference: None,
            provider_session_id: None,
            is_archived: false,
            created_at: now,
            updated_at: Some(now),
        }
    }

    #[test]
    fn model_to_response_carries_pricing_breakdown() {
        let model = order_fixture(OrderStatus::AwaitingPayment);
        let id = model.id;
        let response = OrderService::model_to_response(model, Vec::new());

        assert_eq!(response.id, id);
        assert_eq!(response.status, OrderStatus::AwaitingPayment);
        assert_eq!(response.total, dec!(31.60));
        assert!(response.items.is_empty());
    }

    #[test]
    fn model_to_response_maps_line_items() {
        let model = order_fixture(OrderStatus::Paid);
        let order_id = model.id;
        let items = vec![OrderItemModel {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            slug: "widget".into(),
            title: "Widget".into(),
            image: None,
            unit_price: dec!(10.00),
            quantity: 2,
            line_total: dec!(20.00),
            created_at: Utc::now(),
        }];

        let response = OrderService::model_to_response(model, items);
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].slug, "widget");
        assert_eq!(response.items[0].line_total, dec!(20.00));
    }
}
