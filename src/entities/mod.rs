//! SeaORM entities for the storefront and back-office domain.

pub mod activity_log;
pub mod campaign;
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod fulfillment;
pub mod fulfillment_item;
pub mod order;
pub mod order_event;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod refund;
pub mod refund_item;

// Re-export entities
pub use activity_log::{ActivityEventType, Entity as ActivityLog, Model as ActivityLogModel};
pub use campaign::{Entity as Campaign, Model as CampaignModel};
pub use cart::{CartStatus, Entity as Cart, Model as CartModel, Region};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{CouponKind, Entity as Coupon, Model as CouponModel};
pub use fulfillment::{Entity as Fulfillment, Model as FulfillmentModel};
pub use fulfillment_item::{Entity as FulfillmentItem, Model as FulfillmentItemModel};
pub use order::{
    Entity as Order, FulfillmentStatus, Model as OrderModel, OrderStatus, PaymentStatus,
};
pub use order_event::{Entity as OrderEvent, Model as OrderEventModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use refund::{Entity as Refund, Model as RefundModel};
pub use refund_item::{Entity as RefundItem, Model as RefundItemModel};
