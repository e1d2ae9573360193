use crate::{
    entities::{
        activity_log, cart, cart_item, ActivityEventType, Cart, CartItem, CartModel, CartStatus,
        ProductVariant, Region,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// The cart is the server-authoritative list of lines a storefront session is
/// assembling. Lines are keyed by variant: adding a variant that is already
/// in the cart merges quantities instead of appending a second line. Totals
/// are a pure function over the lines in the cart's price region.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new cart for a storefront session.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<CartModel, ServiceError> {
        let cart_id = Uuid::new_v4();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            session_id: Set(input.session_id),
            customer_email: Set(input.customer_email),
            region: Set(input.region),
            status: Set(CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!(%cart_id, "created cart");
        Ok(cart)
    }

    /// Retrieves a cart with its items and computed totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let items = cart.find_related(CartItem).all(&*self.db).await?;
        Ok(CartWithItems::build(cart, items))
    }

    /// Adds a variant to the cart, merging into an existing line when the
    /// variant is already present. The line's price snapshot is refreshed
    /// from the live variant on every add.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = Self::active_cart(&txn, cart_id).await?;

        let variant = ProductVariant::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
            })?;

        if !variant.is_active {
            return Err(ServiceError::InvalidOperation(
                "Variant is no longer available".to_string(),
            ));
        }

        let product = variant
            .find_related(crate::entities::Product)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product for variant {} not found", variant.id))
            })?;

        let now = Utc::now();
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let merged = item.quantity + input.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(merged);
            item.price_try = Set(variant.price_try);
            item.price_usd = Set(variant.price_usd);
            item.desi = Set(variant.desi);
            item.updated_at = Set(now);
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                variant_id: Set(variant.id),
                title: Set(product.title.clone()),
                size: Set(variant.size.clone()),
                material: Set(variant.material.clone()),
                price_try: Set(variant.price_try),
                price_usd: Set(variant.price_usd),
                desi: Set(variant.desi),
                quantity: Set(input.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        // Behavioral trail for the analytics funnel.
        activity_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(Some(cart.session_id.clone())),
            customer_email: Set(cart.customer_email.clone()),
            product_id: Set(Some(product.id)),
            event_type: Set(ActivityEventType::AddToCart),
            metadata: Set(Some(serde_json::json!({
                "variant_id": variant.id,
                "quantity": input.quantity,
            }))),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        Self::touch_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                variant_id: input.variant_id,
            })
            .await;

        info!(%cart_id, variant_id = %input.variant_id, quantity = input.quantity, "added cart line");
        self.get_cart(cart_id).await
    }

    /// Overwrites a line's quantity; zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Self::active_cart(&txn, cart_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        if quantity <= 0 {
            item.delete(&txn).await?;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        Self::touch_cart(&txn, cart).await?;
        txn.commit().await?;

        if quantity <= 0 {
            self.event_sender
                .send_or_log(Event::CartItemRemoved { cart_id, item_id })
                .await;
        }

        self.get_cart(cart_id).await
    }

    /// Removes a line outright.
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        self.update_item_quantity(cart_id, item_id, 0).await
    }

    /// Deletes every line from the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Self::active_cart(&txn, cart_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;

        Self::touch_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        info!(%cart_id, "cleared cart");
        Ok(())
    }

    async fn active_cart<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        if cart.status != CartStatus::Active {
            return Err(ServiceError::InvalidOperation(
                "Cart is not active".to_string(),
            ));
        }

        Ok(cart)
    }

    async fn touch_cart<C: ConnectionTrait>(conn: &C, cart: CartModel) -> Result<(), ServiceError> {
        let mut cart: cart::ActiveModel = cart.into();
        cart.updated_at = Set(Utc::now());
        cart.update(conn).await?;
        Ok(())
    }
}

/// Region-priced unit price of a cart line.
pub fn unit_price(region: Region, item: &cart_item::Model) -> Decimal {
    match region {
        Region::Tr => item.price_try,
        Region::Global => item.price_usd,
    }
}

/// Pure totals over a cart's lines in the cart's region.
pub fn cart_totals(region: Region, items: &[cart_item::Model]) -> CartTotals {
    let subtotal = items
        .iter()
        .map(|item| unit_price(region, item) * Decimal::from(item.quantity))
        .sum();
    let total_desi = items
        .iter()
        .map(|item| item.desi * Decimal::from(item.quantity))
        .sum();
    let item_count = items.iter().map(|item| item.quantity).sum();

    CartTotals {
        currency: region.currency().to_string(),
        item_count,
        subtotal,
        total_desi,
    }
}

/// Input for creating a cart
#[derive(Debug, Deserialize)]
pub struct CreateCartInput {
    pub session_id: String,
    pub customer_email: Option<String>,
    pub region: Region,
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartTotals {
    pub currency: String,
    pub item_count: i32,
    pub subtotal: Decimal,
    pub total_desi: Decimal,
}

/// Cart with items and computed totals
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
    pub totals: CartTotals,
}

impl CartWithItems {
    fn build(cart: CartModel, items: Vec<cart_item::Model>) -> Self {
        let totals = cart_totals(cart.region, &items);
        Self {
            cart,
            items,
            totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price_try: Decimal, price_usd: Decimal, desi: Decimal, quantity: i32) -> cart_item::Model {
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            title: "Sunset over the Bosphorus".to_string(),
            size: "50x70".to_string(),
            material: "canvas".to_string(),
            price_try,
            price_usd,
            desi,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn domestic_totals_use_try_prices() {
        let items = vec![line(dec!(1500), dec!(85), dec!(2.5), 2)];
        let totals = cart_totals(Region::Tr, &items);

        assert_eq!(totals.subtotal, dec!(3000));
        assert_eq!(totals.currency, "TRY");
        assert_eq!(totals.item_count, 2);
    }

    #[test]
    fn global_totals_use_usd_prices() {
        let items = vec![line(dec!(1500), dec!(85), dec!(2.5), 2)];
        let totals = cart_totals(Region::Global, &items);

        assert_eq!(totals.subtotal, dec!(170));
        assert_eq!(totals.currency, "USD");
    }

    #[test]
    fn totals_sum_across_lines() {
        let items = vec![
            line(dec!(1500), dec!(85), dec!(2.0), 1),
            line(dec!(900), dec!(45), dec!(1.5), 3),
        ];
        let totals = cart_totals(Region::Tr, &items);

        assert_eq!(totals.subtotal, dec!(4200));
        assert_eq!(totals.total_desi, dec!(6.5));
        assert_eq!(totals.item_count, 4);
    }

    #[test]
    fn empty_cart_totals_are_zero() {
        let totals = cart_totals(Region::Tr, &[]);
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.total_desi, Decimal::ZERO);
        assert_eq!(totals.item_count, 0);
    }
}
