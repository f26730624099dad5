use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::entities::coupon::{self, CouponKind, CouponStatus, Entity as CouponEntity};
use crate::errors::ServiceError;

/// Outcome of evaluating a coupon code against a cart subtotal.
///
/// Non-applicability is not an error: an unknown, expired, or exhausted
/// code evaluates to a zero discount and checkout proceeds without it.
#[derive(Debug, Clone, Serialize)]
pub struct CouponEvaluation {
    pub applicable: bool,
    pub discount_amount: Decimal,
    /// The coupon's stored canonical (uppercase) code, for the audit trail.
    pub canonical_code: Option<String>,
}

impl CouponEvaluation {
    fn not_applicable() -> Self {
        Self {
            applicable: false,
            discount_amount: Decimal::ZERO,
            canonical_code: None,
        }
    }
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up an active coupon by code (case-insensitive) and computes
    /// the discount it grants against `subtotal` at `now`.
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CouponEvaluation, ServiceError> {
        let canonical = code.trim().to_uppercase();
        if canonical.is_empty() {
            return Ok(CouponEvaluation::not_applicable());
        }

        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(canonical.as_str()))
            .filter(coupon::Column::Status.eq(CouponStatus::Active))
            .one(&*self.db)
            .await?;

        let Some(coupon) = coupon else {
            debug!(code = %canonical, "Coupon not found or not active");
            return Ok(CouponEvaluation::not_applicable());
        };

        match discount_for(&coupon, subtotal, now) {
            Some(discount_amount) => Ok(CouponEvaluation {
                applicable: true,
                discount_amount,
                canonical_code: Some(coupon.code),
            }),
            None => Ok(CouponEvaluation::not_applicable()),
        }
    }

    /// Increments `used_count` for a redeemed coupon as a store-level
    /// atomic delta, guarded against exceeding the usage limit. Returns
    /// whether a row was actually updated.
    #[instrument(skip(self))]
    pub async fn redeem(&self, canonical_code: &str) -> Result<bool, ServiceError> {
        let result = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(canonical_code))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(code = %canonical_code, "Coupon redeem did not update any row");
        }
        Ok(result.rows_affected > 0)
    }
}

/// Pure applicability and discount computation for one coupon.
///
/// Checks run in order: date window, minimum purchase, usage limit.
/// Returns `None` when the coupon does not apply. Percentage discounts
/// are clamped to `max_discount`; fixed discounts never exceed the
/// subtotal itself.
pub fn discount_for(
    coupon: &coupon::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Option<Decimal> {
    if coupon.status != CouponStatus::Active {
        return None;
    }
    if now < coupon.valid_from || now > coupon.valid_until {
        return None;
    }
    if let Some(min_purchase) = coupon.min_purchase {
        if subtotal < min_purchase {
            return None;
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return None;
        }
    }

    let discount = match coupon.kind {
        CouponKind::Percentage => {
            let raw = subtotal * coupon.value / Decimal::from(100);
            match coupon.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        CouponKind::Fixed => coupon.value.min(subtotal),
    };

    Some(discount.max(Decimal::ZERO).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon_fixture(kind: CouponKind, value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            kind,
            value,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            status: CouponStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount() {
        let coupon = coupon_fixture(CouponKind::Percentage, dec!(10));
        let discount = discount_for(&coupon, dec!(20.00), Utc::now()).unwrap();
        assert_eq!(discount, dec!(2.00));
    }

    #[test]
    fn percentage_discount_clamped_to_cap() {
        let mut coupon = coupon_fixture(CouponKind::Percentage, dec!(50));
        coupon.max_discount = Some(dec!(5.00));
        let discount = discount_for(&coupon, dec!(100.00), Utc::now()).unwrap();
        assert_eq!(discount, dec!(5.00));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let coupon = coupon_fixture(CouponKind::Fixed, dec!(25.00));
        let discount = discount_for(&coupon, dec!(12.50), Utc::now()).unwrap();
        assert_eq!(discount, dec!(12.50));
    }

    #[test]
    fn minimum_purchase_floor() {
        let mut coupon = coupon_fixture(CouponKind::Percentage, dec!(10));
        coupon.min_purchase = Some(dec!(50.00));
        assert!(discount_for(&coupon, dec!(49.99), Utc::now()).is_none());
        assert!(discount_for(&coupon, dec!(50.00), Utc::now()).is_some());
    }

    #[test]
    fn exhausted_usage_limit() {
        let mut coupon = coupon_fixture(CouponKind::Percentage, dec!(10));
        coupon.usage_limit = Some(100);
        coupon.used_count = 100;
        assert!(discount_for(&coupon, dec!(20.00), Utc::now()).is_none());

        coupon.used_count = 99;
        assert!(discount_for(&coupon, dec!(20.00), Utc::now()).is_some());
    }

    #[test]
    fn outside_date_window() {
        let coupon = coupon_fixture(CouponKind::Percentage, dec!(10));
        let too_early = coupon.valid_from - Duration::seconds(1);
        let too_late = coupon.valid_until + Duration::seconds(1);
        assert!(discount_for(&coupon, dec!(20.00), too_early).is_none());
        assert!(discount_for(&coupon, dec!(20.00), too_late).is_none());
        assert!(discount_for(&coupon, dec!(20.00), coupon.valid_from).is_some());
        assert!(discount_for(&coupon, dec!(20.00), coupon.valid_until).is_some());
    }

    #[test]
    fn inactive_coupon_does_not_apply() {
        let mut coupon = coupon_fixture(CouponKind::Percentage, dec!(10));
        coupon.status = CouponStatus::Inactive;
        assert!(discount_for(&coupon, dec!(20.00), Utc::now()).is_none());

        coupon.status = CouponStatus::Expired;
        assert!(discount_for(&coupon, dec!(20.00), Utc::now()).is_none());
    }
}
