use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::order::{self, OrderStatus, PaymentMethod};
use crate::entities::{order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog::ProductCatalogService;
use crate::services::coupons::CouponService;
use crate::services::inventory::InventoryService;

const MIN_LINE_QUANTITY: i32 = 1;
const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CartItemInput {
    pub slug: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CustomerInput {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub name: String,
    #[validate(email(message = "A valid customer email is required"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Cart cannot be empty"))]
    pub items: Vec<CartItemInput>,
    #[validate]
    pub customer: CustomerInput,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    /// Overrides the configured flat shipping fee.
    pub shipping: Option<Decimal>,
    /// Overrides the configured tax rate (decimal, e.g. 0.08).
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
}

/// Pricing defaults applied when the caller does not override them.
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub shipping_flat_rate: Decimal,
    pub tax_rate: Decimal,
    pub currency: String,
}

impl From<&AppConfig> for CheckoutConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            shipping_flat_rate: Decimal::try_from(cfg.shipping_flat_rate)
                .unwrap_or(Decimal::from(10)),
            tax_rate: Decimal::try_from(cfg.default_tax_rate)
                .unwrap_or_else(|_| Decimal::new(8, 2)),
            currency: cfg.currency.to_uppercase(),
        }
    }
}

/// Orchestrates checkout: validates the cart against the catalog, prices
/// it, applies a coupon, reserves inventory, and persists the order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<ProductCatalogService>,
    coupons: Arc<CouponService>,
    inventory: InventoryService,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<ProductCatalogService>,
        coupons: Arc<CouponService>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            coupons,
            inventory: InventoryService::new(),
            config,
        }
    }

    /// Creates a priced, stock-checked order from a cart.
    ///
    /// Validation (empty cart, unknown slugs, stock) happens before any
    /// write. The order document and its stock reservation commit in one
    /// transaction; the coupon usage counter is incremented best-effort
    /// after the commit.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;

        for item in &request.items {
            if item.slug.trim().is_empty() {
                return Err(ServiceError::InvalidInput(
                    "Cart item slug cannot be empty".to_string(),
                ));
            }
        }

        // Batch-load the catalog rows backing this cart.
        let slugs: Vec<String> = request.items.iter().map(|i| i.slug.clone()).collect();
        let products = self.catalog.find_by_slugs(&slugs).await?;

        for slug in &slugs {
            if !products.contains_key(slug) {
                return Err(ServiceError::NotFound(format!(
                    "Product '{}' not found",
                    slug
                )));
            }
        }

        // Clamp quantities and snapshot prices. Quantities for the same
        // slug are summed for the stock check so duplicate lines cannot
        // slip past validation.
        let mut lines = Vec::with_capacity(request.items.len());
        let mut requested: HashMap<&str, i32> = HashMap::new();
        for item in &request.items {
            let product = &products[&item.slug];
            let quantity = clamp_quantity(item.quantity);
            *requested.entry(product.slug.as_str()).or_insert(0) += quantity;
            lines.push(OrderLine {
                product: product.clone(),
                quantity,
            });
        }

        for (slug, quantity) in &requested {
            let available = products[*slug].count_in_stock;
            if *quantity > available {
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}': requested {}, available {}",
                    slug, quantity, available
                )));
            }
        }

        // Price the cart from the snapshots taken above.
        let subtotal: Decimal = lines
            .iter()
            .map(|line| line_total(line.product.price, line.quantity))
            .sum();
        let shipping = request.shipping.unwrap_or(self.config.shipping_flat_rate);
        let tax_rate = request.tax_rate.unwrap_or(self.config.tax_rate);
        let tax = (subtotal * tax_rate).round_dp(2);

        // Invalid or inapplicable coupons degrade to a zero discount;
        // they never fail the checkout.
        let (discount_amount, coupon_code) = match &request.coupon_code {
            Some(code) => {
                let evaluation = self.coupons.evaluate(code, subtotal, Utc::now()).await?;
                (evaluation.discount_amount, evaluation.canonical_code)
            }
            None => (Decimal::ZERO, None),
        };

        let total = order_total(subtotal, shipping, tax, discount_amount);

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            status: Set(OrderStatus::AwaitingPayment),
            payment_method: Set(request.payment_method),
            currency: Set(self.config.currency.clone()),
            subtotal: Set(subtotal),
            shipping: Set(shipping),
            tax: Set(tax),
            discount_amount: Set(discount_amount),
            total: Set(total),
            coupon_code: Set(coupon_code.clone()),
            customer_name: Set(request.customer.name.clone()),
            customer_email: Set(request.customer.email.clone()),
            customer_phone: Set(request.customer.phone.clone()),
            address: Set(request.customer.address.clone()),
            city: Set(request.customer.city.clone()),
            state: Set(request.customer.state.clone()),
            zip_code: Set(request.customer.zip_code.clone()),
            country: Set(request.customer.country.clone()),
            payment_reference: Set(None),
            provider_session_id: Set(None),
            is_archived: Set(false),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let txn = self.db.begin().await?;

        let order_model = order_model.insert(&txn).await?;

        for line in &lines {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id),
                slug: Set(line.product.slug.clone()),
                title: Set(line.product.title.clone()),
                image: Set(line.product.image.clone()),
                unit_price: Set(line.product.price),
                quantity: Set(line.quantity),
                line_total: Set(line_total(line.product.price, line.quantity)),
                created_at: Set(now),
            };
            item_model.insert(&txn).await?;
        }

        // Conditional atomic decrements; a zero row count means a
        // concurrent checkout won the race and this one rolls back.
        for line in &lines {
            let updated = self
                .inventory
                .deduct(&txn, line.product.id, line.quantity)
                .await?;
            if updated == 0 {
                let available = self.inventory.available(&txn, line.product.id).await?;
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}': requested {}, available {}",
                    line.product.slug, line.quantity, available
                )));
            }
        }

        txn.commit().await?;

        if let Some(code) = &coupon_code {
            match self.coupons.redeem(code).await {
                Ok(true) => {
                    let _ = self
                        .event_sender
                        .send(Event::CouponRedeemed {
                            code: code.clone(),
                            order_id,
                        })
                        .await;
                }
                Ok(false) => warn!(code = %code, order_id = %order_id, "Coupon was not redeemed"),
                Err(e) => warn!(code = %code, order_id = %order_id, "Coupon redeem failed: {}", e),
            }
        }

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(order_id = %order_id, "Failed to send order created event: {}", e);
        }

        info!(
            order_id = %order_id,
            order_number = %order_model.order_number,
            total = %total,
            "Order created"
        );

        Ok(CheckoutResponse {
            order_id,
            order_number: order_model.order_number,
            status: order_model.status,
            subtotal,
            shipping,
            tax,
            discount_amount,
            total,
            coupon_code,
        })
    }
}

struct OrderLine {
    product: product::Model,
    quantity: i32,
}

/// Quantities outside [1, 99] are clamped, not rejected.
pub fn clamp_quantity(quantity: i32) -> i32 {
    quantity.clamp(MIN_LINE_QUANTITY, MAX_LINE_QUANTITY)
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    (unit_price * Decimal::from(quantity)).round_dp(2)
}

/// `total = max(0, subtotal + shipping + tax - discount)`
pub fn order_total(
    subtotal: Decimal,
    shipping: Decimal,
    tax: Decimal,
    discount: Decimal,
) -> Decimal {
    (subtotal + shipping + tax - discount)
        .max(Decimal::ZERO)
        .round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_clamping() {
        assert_eq!(clamp_quantity(0), 1);
        assert_eq!(clamp_quantity(-5), 1);
        assert_eq!(clamp_quantity(1), 1);
        assert_eq!(clamp_quantity(42), 42);
        assert_eq!(clamp_quantity(99), 99);
        assert_eq!(clamp_quantity(500), 99);
    }

    #[test]
    fn widget_cart_prices_to_31_60() {
        // Cart of two $10 widgets, default shipping and 8% tax.
        let subtotal = line_total(dec!(10.00), 2);
        assert_eq!(subtotal, dec!(20.00));

        let tax = (subtotal * dec!(0.08)).round_dp(2);
        assert_eq!(tax, dec!(1.60));

        let total = order_total(subtotal, dec!(10.00), tax, Decimal::ZERO);
        assert_eq!(total, dec!(31.60));
    }

    #[test]
    fn widget_cart_with_ten_percent_coupon_prices_to_29_60() {
        let subtotal = dec!(20.00);
        let tax = (subtotal * dec!(0.08)).round_dp(2);
        let discount = (subtotal * dec!(10) / dec!(100)).round_dp(2);
        assert_eq!(discount, dec!(2.00));

        let total = order_total(subtotal, dec!(10.00), tax, discount);
        assert_eq!(total, dec!(29.60));
    }

    #[test]
    fn total_is_floored_at_zero() {
        let total = order_total(dec!(5.00), dec!(0.00), dec!(0.40), dec!(100.00));
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn checkout_config_from_app_config() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        let checkout_cfg = CheckoutConfig::from(&cfg);
        assert_eq!(checkout_cfg.shipping_flat_rate, dec!(10));
        assert_eq!(checkout_cfg.tax_rate, Decimal::try_from(0.08).unwrap());
        assert_eq!(checkout_cfg.currency, "USD");
    }
}
