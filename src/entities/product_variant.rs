use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sellable variant of a product: a concrete size/material combination with
/// per-region prices and its own stock level.
///
/// Stock is only authoritative when `track_quantity` is set; untracked
/// variants (made-to-order pieces) never fail availability checks.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub size: String,
    pub material: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price_try: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price_usd: Decimal,
    /// Volumetric weight used by the shipping estimate.
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub desi: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 3)))", nullable)]
    pub weight_kg: Option<Decimal>,
    pub stock: i32,
    pub track_quantity: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
