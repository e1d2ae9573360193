use crate::{
    entities::{campaign, coupon, Campaign, Coupon, CouponKind, CouponModel},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Coupon service: validation for the storefront, CRUD for the admin panel,
/// and the atomic redemption used inside the order transaction.
///
/// Validation alone never reserves a usage slot. The slot is taken by
/// `redeem_on`, a conditional `used_count` increment that runs inside the
/// same transaction that creates the order, so two checkouts racing for the
/// last slot cannot both win.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a code for a prospective checkout and returns its terms.
    #[instrument(skip(self))]
    pub async fn validate_coupon(
        &self,
        code: &str,
        customer_email: Option<&str>,
    ) -> Result<CouponSummary, ServiceError> {
        let coupon = find_by_code(&*self.db, code).await?;
        check_validity(&coupon, customer_email, Utc::now())?;

        Ok(CouponSummary {
            code: coupon.code,
            kind: coupon.kind,
            value: coupon.value,
        })
    }

    /// Creates a coupon (admin). Codes are stored uppercased.
    #[instrument(skip(self, input))]
    pub async fn create_coupon(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        if input.value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Coupon value must be positive".to_string(),
            ));
        }
        if input.kind == CouponKind::Percentage && input.value > Decimal::from(100) {
            return Err(ServiceError::ValidationError(
                "Percentage coupons cannot exceed 100".to_string(),
            ));
        }

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.trim().to_uppercase()),
            kind: Set(input.kind),
            value: Set(input.value),
            is_active: Set(true),
            starts_at: Set(input.starts_at),
            ends_at: Set(input.ends_at),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            customer_email: Set(input.customer_email),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let coupon = coupon.insert(&*self.db).await?;
        info!(code = %coupon.code, "created coupon");
        Ok(coupon)
    }

    /// Lists coupons newest-first (admin).
    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponModel>, u64), ServiceError> {
        let paginator = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((coupons, total))
    }

    /// Campaigns currently inside their window, with the attached coupon code.
    pub async fn list_active_campaigns(&self) -> Result<Vec<CampaignWithCoupon>, ServiceError> {
        let now = Utc::now();
        let campaigns = Campaign::find()
            .filter(
                Condition::any()
                    .add(campaign::Column::StartsAt.is_null())
                    .add(campaign::Column::StartsAt.lte(now)),
            )
            .filter(
                Condition::any()
                    .add(campaign::Column::EndsAt.is_null())
                    .add(campaign::Column::EndsAt.gte(now)),
            )
            .order_by_desc(campaign::Column::CreatedAt)
            .find_also_related(Coupon)
            .all(&*self.db)
            .await?;

        Ok(campaigns
            .into_iter()
            .map(|(campaign, coupon)| CampaignWithCoupon {
                coupon_code: coupon.map(|c| c.code),
                campaign,
            })
            .collect())
    }
}

/// Looks a coupon up by its (case-insensitive) code. Inactive codes are
/// indistinguishable from absent ones.
pub(crate) async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<CouponModel, ServiceError> {
    let coupon = Coupon::find()
        .filter(coupon::Column::Code.eq(code.trim().to_uppercase()))
        .one(conn)
        .await?
        .ok_or(ServiceError::CouponNotFound)?;

    if !coupon.is_active {
        return Err(ServiceError::CouponNotFound);
    }

    Ok(coupon)
}

/// Window, usage and per-customer checks for a coupon at `now`.
pub(crate) fn check_validity(
    coupon: &CouponModel,
    customer_email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if let Some(starts_at) = coupon.starts_at {
        if now < starts_at {
            return Err(ServiceError::CouponNotStarted);
        }
    }
    if let Some(ends_at) = coupon.ends_at {
        if now > ends_at {
            return Err(ServiceError::CouponExpired);
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(ServiceError::CouponExhausted);
        }
    }
    if let Some(restricted_to) = &coupon.customer_email {
        let matches = customer_email
            .map(|email| email.eq_ignore_ascii_case(restricted_to))
            .unwrap_or(false);
        if !matches {
            return Err(ServiceError::CouponNotEligible);
        }
    }
    Ok(())
}

/// Discount a coupon grants on `subtotal`; never exceeds the subtotal.
pub(crate) fn discount_for(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
    let raw = match coupon.kind {
        CouponKind::Percentage => (subtotal * coupon.value / Decimal::from(100)).round_dp(2),
        CouponKind::FixedAmount => coupon.value,
    };
    raw.min(subtotal).max(Decimal::ZERO)
}

/// Redeems a coupon inside an open transaction: validates, then takes a usage
/// slot with a conditional increment. Zero rows affected means another
/// transaction took the last slot first.
pub(crate) async fn redeem_on<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    customer_email: Option<&str>,
    subtotal: Decimal,
) -> Result<(CouponModel, Decimal), ServiceError> {
    let coupon = find_by_code(conn, code).await?;
    check_validity(&coupon, customer_email, Utc::now())?;

    let result = Coupon::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupon::Column::Id.eq(coupon.id))
        .filter(
            Condition::any()
                .add(coupon::Column::UsageLimit.is_null())
                .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit))),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::CouponExhausted);
    }

    let discount = discount_for(&coupon, subtotal);
    Ok((coupon, discount))
}

/// Validated coupon terms returned to the storefront
#[derive(Debug, Serialize)]
pub struct CouponSummary {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
}

/// Input for creating a coupon (admin)
#[derive(Debug, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub customer_email: Option<String>,
}

/// Campaign with the attached coupon code resolved
#[derive(Debug, Serialize)]
pub struct CampaignWithCoupon {
    pub campaign: campaign::Model,
    pub coupon_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn sample(kind: CouponKind, value: Decimal) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            kind,
            value,
            is_active: true,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            used_count: 0,
            customer_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn future_start_date_is_not_started() {
        let mut coupon = sample(CouponKind::Percentage, dec!(10));
        coupon.starts_at = Some(Utc::now() + Duration::days(1));

        assert_matches!(
            check_validity(&coupon, None, Utc::now()),
            Err(ServiceError::CouponNotStarted)
        );
    }

    #[test]
    fn past_end_date_is_expired() {
        let mut coupon = sample(CouponKind::Percentage, dec!(10));
        coupon.ends_at = Some(Utc::now() - Duration::days(1));

        assert_matches!(
            check_validity(&coupon, None, Utc::now()),
            Err(ServiceError::CouponExpired)
        );
    }

    #[test]
    fn used_count_at_limit_is_exhausted() {
        let mut coupon = sample(CouponKind::Percentage, dec!(10));
        coupon.usage_limit = Some(5);
        coupon.used_count = 5;

        assert_matches!(
            check_validity(&coupon, None, Utc::now()),
            Err(ServiceError::CouponExhausted)
        );
    }

    #[rstest]
    #[case(Some("alice@example.com"), true)]
    #[case(Some("ALICE@EXAMPLE.COM"), true)]
    #[case(Some("bob@example.com"), false)]
    #[case(None, false)]
    fn customer_restriction_matches_by_email(
        #[case] email: Option<&str>,
        #[case] expected_ok: bool,
    ) {
        let mut coupon = sample(CouponKind::FixedAmount, dec!(50));
        coupon.customer_email = Some("alice@example.com".to_string());

        let result = check_validity(&coupon, email, Utc::now());
        if expected_ok {
            assert!(result.is_ok());
        } else {
            assert_matches!(result, Err(ServiceError::CouponNotEligible));
        }
    }

    #[test]
    fn percentage_discount_rounds_to_cents() {
        let coupon = sample(CouponKind::Percentage, dec!(10));
        assert_eq!(discount_for(&coupon, dec!(333.33)), dec!(33.33));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let coupon = sample(CouponKind::FixedAmount, dec!(500));
        assert_eq!(discount_for(&coupon, dec!(120)), dec!(120));
        assert_eq!(discount_for(&coupon, dec!(900)), dec!(500));
    }
}
