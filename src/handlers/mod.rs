pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod products;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::catalog::ProductCatalogService;
use crate::services::checkout::{CheckoutConfig, CheckoutService};
use crate::services::coupons::CouponService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<ProductCatalogService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let http = reqwest::Client::new();

        let catalog = Arc::new(ProductCatalogService::new(db.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let orders = Arc::new(OrderService::new(db.clone(), Some(event_sender.clone())));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender,
            catalog.clone(),
            coupons.clone(),
            CheckoutConfig::from(config),
        ));
        let payments = Arc::new(PaymentService::new(orders.clone(), http, config.clone()));

        Self {
            catalog,
            coupons,
            checkout,
            orders,
            payments,
        }
    }
}
