#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db,
    entities::coupon::{self, CouponKind, CouponStatus},
    entities::product,
    events::{self, EventSender},
    handlers::AppServices,
    services::notifications::{NoopEmailSender, NoopSmsSender, NotificationDispatcher},
    AppState,
};

/// Helper harness spinning up an application state backed by an
/// in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Box::new(NoopEmailSender),
            Box::new(NoopSmsSender),
        ));
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            db_arc.clone(),
            dispatcher,
        ));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);
        let redis_client =
            Arc::new(redis::Client::open(cfg.redis_url.clone()).expect("redis client"));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            redis: redis_client,
        };

        let router = Router::new()
            .route(
                "/health",
                get(storefront_api::handlers::health::health_check),
            )
            .nest("/api/v1", storefront_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Issue a request against the in-process router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Seed one catalog product.
    pub async fn seed_product(&self, slug: &str, price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(slug.to_string()),
            title: Set(format!("Product {slug}")),
            description: Set(None),
            price: Set(price),
            count_in_stock: Set(stock),
            category: Set(Some("test".to_string())),
            brand: Set(None),
            image: Set(Some(format!("/images/{slug}.jpg"))),
            rating: Set(0.0),
            num_reviews: Set(0),
            tags: Set(serde_json::json!([])),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Seed one active coupon valid for the next 30 days.
    pub async fn seed_coupon(
        &self,
        code: &str,
        kind: CouponKind,
        value: Decimal,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            kind: Set(kind),
            value: Set(value),
            min_purchase: Set(None),
            max_discount: Set(None),
            usage_limit: Set(None),
            used_count: Set(0),
            valid_from: Set(now - Duration::days(1)),
            valid_until: Set(now + Duration::days(30)),
            status: Set(CouponStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon")
    }

    pub async fn product_stock(&self, slug: &str) -> i32 {
        use sea_orm::{ColumnTrait, QueryFilter};
        product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .count_in_stock
    }

    pub async fn coupon_used_count(&self, code: &str) -> i32 {
        use sea_orm::{ColumnTrait, QueryFilter};
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code.to_uppercase()))
            .one(&*self.state.db)
            .await
            .expect("query coupon")
            .expect("coupon exists")
            .used_count
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
