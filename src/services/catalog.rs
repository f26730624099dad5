use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub count_in_stock: i32,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub rating: f32,
    pub num_reviews: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Read side of the product catalog. Catalog management lives elsewhere;
/// checkout only ever reads from here.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a single product by slug.
    #[instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<ProductResponse, ServiceError> {
        let product = ProductEntity::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product '{}' not found", slug)))?;

        Ok(Self::model_to_response(product))
    }

    /// Batch-loads all referenced products by slug, keyed by slug.
    /// Missing slugs are simply absent from the map; the caller decides
    /// whether that is an error.
    #[instrument(skip(self, slugs))]
    pub async fn find_by_slugs(
        &self,
        slugs: &[String],
    ) -> Result<HashMap<String, product::Model>, ServiceError> {
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let products = ProductEntity::find()
            .filter(product::Column::Slug.is_in(slugs.iter().cloned()))
            .all(&*self.db)
            .await?;

        Ok(products.into_iter().map(|p| (p.slug.clone(), p)).collect())
    }

    /// Lists catalog products with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, per_page: u64) -> Result<ProductListResponse, ServiceError> {
        let paginator = ProductEntity::find()
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(ProductListResponse {
            products: products.into_iter().map(Self::model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    fn model_to_response(model: product::Model) -> ProductResponse {
        let tags = serde_json::from_value::<Vec<String>>(model.tags.clone()).unwrap_or_default();
        ProductResponse {
            id: model.id,
            slug: model.slug,
            title: model.title,
            description: model.description,
            price: model.price,
            count_in_stock: model.count_in_stock,
            category: model.category,
            brand: model.brand,
            image: model.image,
            rating: model.rating,
            num_reviews: model.num_reviews,
            tags,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn model_to_response_parses_tags() {
        let now = Utc::now();
        let model = product::Model {
            id: Uuid::new_v4(),
            slug: "widget".into(),
            title: "Widget".into(),
            description: None,
            price: dec!(10.00),
            count_in_stock: 5,
            category: Some("gadgets".into()),
            brand: None,
            image: None,
            rating: 4.5,
            num_reviews: 12,
            tags: serde_json::json!(["sale", "featured"]),
            created_at: now,
            updated_at: now,
        };

        let response = ProductCatalogService::model_to_response(model);
        assert_eq!(response.tags, vec!["sale".to_string(), "featured".to_string()]);
        assert_eq!(response.price, dec!(10.00));
    }

    #[test]
    fn model_to_response_tolerates_malformed_tags() {
        let now = Utc::now();
        let model = product::Model {
            id: Uuid::new_v4(),
            slug: "widget".into(),
            title: "Widget".into(),
            description: None,
            price: dec!(10.00),
            count_in_stock: 5,
            category: None,
            brand: None,
            image: None,
            rating: 0.0,
            num_reviews: 0,
            tags: serde_json::json!({"not": "a list"}),
            created_at: now,
            updated_at: now,
        };

        let response = ProductCatalogService::model_to_response(model);
        assert!(response.tags.is_empty());
    }
}
