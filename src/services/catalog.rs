use crate::{
    entities::{product, product_variant, Product, ProductModel, ProductVariant},
    errors::ServiceError,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Read-only catalog surface for the storefront.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active products, newest first, with their variants.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductWithVariants>, u64), ServiceError> {
        let paginator = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut result = Vec::with_capacity(products.len());
        for product in products {
            let variants = self.active_variants(&product).await?;
            result.push(ProductWithVariants { product, variants });
        }

        Ok((result, total))
    }

    /// A single active product by slug.
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductWithVariants, ServiceError> {
        let product = Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product '{}' not found", slug)))?;

        let variants = self.active_variants(&product).await?;
        Ok(ProductWithVariants { product, variants })
    }

    async fn active_variants(
        &self,
        product: &ProductModel,
    ) -> Result<Vec<VariantSummary>, ServiceError> {
        let variants = product
            .find_related(ProductVariant)
            .filter(product_variant::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;

        Ok(variants.into_iter().map(VariantSummary::from).collect())
    }
}

/// Storefront view of a variant; stock is exposed only as availability.
#[derive(Debug, Serialize)]
pub struct VariantSummary {
    pub id: uuid::Uuid,
    pub sku: String,
    pub size: String,
    pub material: String,
    pub price_try: rust_decimal::Decimal,
    pub price_usd: rust_decimal::Decimal,
    pub desi: rust_decimal::Decimal,
    pub in_stock: bool,
}

impl From<product_variant::Model> for VariantSummary {
    fn from(variant: product_variant::Model) -> Self {
        Self {
            id: variant.id,
            sku: variant.sku,
            size: variant.size,
            material: variant.material,
            price_try: variant.price_try,
            price_usd: variant.price_usd,
            desi: variant.desi,
            in_stock: !variant.track_quantity || variant.stock > 0,
        }
    }
}

/// Product with its sellable variants
#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    pub product: ProductModel,
    pub variants: Vec<VariantSummary>,
}
