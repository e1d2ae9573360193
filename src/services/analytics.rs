use crate::{
    entities::{
        activity_log, order, ActivityEventType, ActivityLog, ActivityLogModel, Order, OrderModel,
        OrderStatus, PaymentStatus, Product,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

const ABANDONED_LOOKBACK_DAYS: i64 = 7;
const TOP_PRODUCT_COUNT: usize = 5;

/// Read-only reporting over the activity log and committed orders.
///
/// The funnel (views, cart adds, checkout starts, purchases) comes from the
/// behavior log; order counts and revenue come from the orders table, which
/// is the books of record. The two are never mixed for the same figure.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Storefront stats for a period.
    #[instrument(skip(self))]
    pub async fn stats(&self, period: StatsPeriod) -> Result<StatsResponse, ServiceError> {
        let since = period.start_date();

        let mut activity_query = ActivityLog::find();
        if let Some(since) = since {
            activity_query = activity_query.filter(activity_log::Column::CreatedAt.gte(since));
        }
        let activity = activity_query.all(&*self.db).await?;

        let mut order_query = Order::find()
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .filter(
                order::Column::PaymentStatus
                    .is_in([PaymentStatus::Paid, PaymentStatus::Refunded]),
            );
        if let Some(since) = since {
            order_query = order_query.filter(order::Column::CreatedAt.gte(since));
        }
        let orders = order_query
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let funnel = summarize_funnel(&activity);
        let revenue = summarize_revenue(&orders);
        let chart = bucket_daily(&orders);

        let ranked = top_viewed(&activity, TOP_PRODUCT_COUNT);
        let product_ids: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
        let titles: HashMap<Uuid, String> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            Product::find()
                .filter(crate::entities::product::Column::Id.is_in(product_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p.title))
                .collect()
        };
        let top_products = ranked
            .into_iter()
            .map(|(product_id, views)| TopProduct {
                title: titles.get(&product_id).cloned(),
                product_id,
                views,
            })
            .collect();

        Ok(StatsResponse {
            period,
            funnel,
            revenue,
            top_products,
            chart,
        })
    }

    /// Sessions that added to a cart in the lookback window but never
    /// purchased in it.
    #[instrument(skip(self))]
    pub async fn abandoned_carts(&self) -> Result<Vec<AbandonedSession>, ServiceError> {
        let cutoff = Utc::now() - Duration::days(ABANDONED_LOOKBACK_DAYS);

        let rows = ActivityLog::find()
            .filter(activity_log::Column::CreatedAt.gte(cutoff))
            .filter(activity_log::Column::EventType.is_in([
                ActivityEventType::AddToCart,
                ActivityEventType::Purchase,
            ]))
            .all(&*self.db)
            .await?;

        Ok(abandoned_sessions(&rows))
    }
}

/// Funnel counts from behavior rows.
fn summarize_funnel(rows: &[ActivityLogModel]) -> FunnelSummary {
    let mut funnel = FunnelSummary::default();
    for row in rows {
        match row.event_type {
            ActivityEventType::View => funnel.views += 1,
            ActivityEventType::AddToCart => funnel.cart_adds += 1,
            ActivityEventType::CheckoutStart => funnel.checkout_starts += 1,
            ActivityEventType::Purchase => funnel.purchases += 1,
        }
    }
    funnel
}

/// Order count and per-currency revenue from committed orders.
fn summarize_revenue(orders: &[OrderModel]) -> RevenueSummary {
    let mut by_currency: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();
    for order in orders {
        let entry = by_currency
            .entry(order.currency.clone())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += order.total_amount;
    }

    RevenueSummary {
        order_count: orders.len() as u64,
        by_currency: by_currency
            .into_iter()
            .map(|(currency, (order_count, revenue))| {
                let average_order_value = if order_count > 0 {
                    (revenue / Decimal::from(order_count)).round_dp(2)
                } else {
                    Decimal::ZERO
                };
                RevenueByCurrency {
                    currency,
                    order_count,
                    revenue,
                    average_order_value,
                }
            })
            .collect(),
    }
}

/// Calendar-date buckets of committed orders, ascending.
fn bucket_daily(orders: &[OrderModel]) -> Vec<DailyPoint> {
    let mut days: BTreeMap<String, DailyPoint> = BTreeMap::new();
    for order in orders {
        let date = order.created_at.format("%Y-%m-%d").to_string();
        let point = days.entry(date.clone()).or_insert(DailyPoint {
            date,
            orders: 0,
            revenue_try: Decimal::ZERO,
            revenue_usd: Decimal::ZERO,
        });
        point.orders += 1;
        match order.currency.as_str() {
            "TRY" => point.revenue_try += order.total_amount,
            _ => point.revenue_usd += order.total_amount,
        }
    }
    days.into_values().collect()
}

/// Most-viewed products, by view count descending.
fn top_viewed(rows: &[ActivityLogModel], limit: usize) -> Vec<(Uuid, u64)> {
    let mut views: HashMap<Uuid, u64> = HashMap::new();
    for row in rows {
        if row.event_type == ActivityEventType::View {
            if let Some(product_id) = row.product_id {
                *views.entry(product_id).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(Uuid, u64)> = views.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Sessions with cart adds but no purchase among the given rows.
fn abandoned_sessions(rows: &[ActivityLogModel]) -> Vec<AbandonedSession> {
    let purchased: HashSet<&str> = rows
        .iter()
        .filter(|r| r.event_type == ActivityEventType::Purchase)
        .filter_map(|r| r.session_id.as_deref())
        .collect();

    let mut sessions: HashMap<&str, AbandonedSession> = HashMap::new();
    for row in rows {
        if row.event_type != ActivityEventType::AddToCart {
            continue;
        }
        let Some(session_id) = row.session_id.as_deref() else {
            continue;
        };
        if purchased.contains(session_id) {
            continue;
        }

        let entry = sessions
            .entry(session_id)
            .or_insert_with(|| AbandonedSession {
                session_id: session_id.to_string(),
                cart_adds: 0,
                last_activity: row.created_at,
                product_ids: Vec::new(),
            });
        entry.cart_adds += 1;
        entry.last_activity = entry.last_activity.max(row.created_at);
        if let Some(product_id) = row.product_id {
            if !entry.product_ids.contains(&product_id) {
                entry.product_ids.push(product_id);
            }
        }
    }

    let mut result: Vec<AbandonedSession> = sessions.into_values().collect();
    result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    result
}

/// Reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsPeriod {
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "all")]
    All,
}

impl StatsPeriod {
    fn start_date(&self) -> Option<DateTime<Utc>> {
        match self {
            StatsPeriod::SevenDays => Some(Utc::now() - Duration::days(7)),
            StatsPeriod::ThirtyDays => Some(Utc::now() - Duration::days(30)),
            StatsPeriod::All => None,
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct FunnelSummary {
    pub views: u64,
    pub cart_adds: u64,
    pub checkout_starts: u64,
    pub purchases: u64,
}

#[derive(Debug, Serialize)]
pub struct RevenueByCurrency {
    pub currency: String,
    pub order_count: u64,
    pub revenue: Decimal,
    pub average_order_value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RevenueSummary {
    pub order_count: u64,
    pub by_currency: Vec<RevenueByCurrency>,
}

#[derive(Debug, Serialize)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub title: Option<String>,
    pub views: u64,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub orders: u64,
    pub revenue_try: Decimal,
    pub revenue_usd: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub period: StatsPeriod,
    pub funnel: FunnelSummary,
    pub revenue: RevenueSummary,
    pub top_products: Vec<TopProduct>,
    pub chart: Vec<DailyPoint>,
}

/// A session that added to a cart but never purchased
#[derive(Debug, Serialize)]
pub struct AbandonedSession {
    pub session_id: String,
    pub cart_adds: u64,
    pub last_activity: DateTime<Utc>,
    pub product_ids: Vec<Uuid>,
}
