use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;

/// Stock reservation for checkout.
///
/// Stock is only ever mutated through conditional atomic deltas executed
/// by the database engine; two concurrent checkouts racing for the last
/// unit resolve at the store, not in application code.
#[derive(Clone, Default)]
pub struct InventoryService;

impl InventoryService {
    pub fn new() -> Self {
        Self
    }

    /// Decrements `count_in_stock` for one product by `quantity`, guarded
    /// by `count_in_stock >= quantity`. Returns the number of rows updated:
    /// zero means the stock moved underneath us since validation.
    #[instrument(skip(self, conn))]
    pub async fn deduct<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<u64, ServiceError> {
        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::CountInStock,
                Expr::col(product::Column::CountInStock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::CountInStock.gte(quantity))
            .exec(conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Current available stock, re-read for error reporting after a
    /// failed deduction.
    pub async fn available<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        Ok(product.count_in_stock)
    }
}
