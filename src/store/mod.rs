//! Persistence seam.
//!
//! Services talk to storage only through the traits below. Two backends exist:
//! [`postgres::PgStore`] for deployments and [`memory::MemoryStore`] for tests and
//! local runs without a database. Operations that must be atomic across several
//! rows (placing an order, confirming its payment) are single trait calls so each
//! backend can run them inside one transaction or critical section.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{
    CartItem, Category, ComboItem, Offer, OfferKind, Order, OrderStatus, PaymentStatus, Product, ProductVariant, Review,
    ReviewSettings, WishlistItem,
};
use crate::domain::value_objects::OfferCode;
use crate::EcommerceError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("Insufficient stock for {name}. Available: {available}")]
    InsufficientStock { name: String, available: i32 },

    #[error("Offer usage limit reached")]
    OfferExhausted,

    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for EcommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(what) => EcommerceError::Conflict(format!("{} already exists", what)),
            StoreError::InsufficientStock { .. } | StoreError::OfferExhausted | StoreError::InvalidQuantity(_) => {
                EcommerceError::BadRequest(e.to_string())
            }
            StoreError::Corrupt(_) | StoreError::Database(_) => EcommerceError::Storage(e.to_string()),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub combo: Option<bool>,
    pub active_only: bool,
    pub page: u32,
    pub per_page: u32,
}

impl ProductFilter {
    pub fn offset(&self) -> i64 { (self.page.max(1) as i64 - 1) * self.per_page as i64 }
}

/// Partial product update; `None` leaves a column untouched.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    pub compare_price_usd: Option<Decimal>,
    pub compare_price_mns: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub is_combo: Option<bool>,
    /// Replaces the component list when the product is (still) a combo.
    pub combo_items: Option<Vec<ComboItem>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub position: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub position: Option<i32>,
}

/// What happens to a removed category's products.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryRemoval {
    DeleteProducts,
    /// Products move to this category and are deactivated.
    MoveProductsTo(Uuid),
}

#[derive(Clone, Debug, Default)]
pub struct OfferFilter { pub search: Option<String>, pub page: u32, pub limit: u32 }

impl OfferFilter {
    pub fn offset(&self) -> i64 { (self.page.max(1) as i64 - 1) * self.limit as i64 }
}

/// Absent field is `None`, an explicit `null` is `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial offer update. `min_purchase` and `usage_limit` can be cleared with `Some(None)`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPatch {
    pub name: Option<String>,
    pub code: Option<OfferCode>,
    #[serde(rename = "type")]
    pub kind: Option<OfferKind>,
    pub value: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_purchase: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub usage_limit: Option<Option<i32>>,
    pub usage_count: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl OfferPatch {
    /// The offer as it would look after the patch, used to validate before writing.
    pub fn apply_to(&self, offer: &Offer) -> Offer {
        let mut next = offer.clone();
        if let Some(v) = &self.name { next.name = v.clone(); }
        if let Some(v) = &self.code { next.code = v.clone(); }
        if let Some(v) = self.kind { next.kind = v; }
        if let Some(v) = self.value { next.value = v; }
        if let Some(v) = self.min_purchase { next.min_purchase = v; }
        if let Some(v) = self.usage_limit { next.usage_limit = v; }
        if let Some(v) = self.usage_count { next.usage_count = v; }
        if let Some(v) = self.start_date { next.start_date = v; }
        if let Some(v) = self.end_date { next.end_date = v; }
        if let Some(v) = self.is_active { next.is_active = v; }
        next
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReviewFilter {
    pub product_id: Option<Uuid>,
    pub is_approved: Option<bool>,
    /// Matches author, email, title, body, and the product's name or slug.
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl ReviewFilter {
    pub fn offset(&self) -> i64 { (self.page.max(1) as i64 - 1) * self.limit as i64 }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPatch {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub rating: Option<i32>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_approved: Option<bool>,
}

/// Outcome of the payment-confirmation transition.
#[derive(Clone, Debug)]
pub enum Confirmation {
    /// PENDING → PROCESSING/PAID happened here: stock committed, cart cleared.
    Confirmed(Order),
    /// The order had already left PENDING; only the payment reference was stored.
    AlreadyProcessed(Order),
    NotFound,
}

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;
    /// Fails with `Conflict("slug")` when the slug is taken.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> StoreResult<Option<Product>>;
    async fn insert_variant(&self, variant: &ProductVariant) -> StoreResult<()>;
    async fn update_variant(&self, id: Uuid, patch: &VariantPatch) -> StoreResult<Option<ProductVariant>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;
    /// Fails with `Conflict("slug")` when the slug is taken.
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn update_category(&self, id: Uuid, patch: &CategoryPatch) -> StoreResult<Option<Category>>;
    /// Deletes the category and deletes or moves its products in one unit. Returns the
    /// number of products affected, or `None` when the category does not exist.
    async fn remove_category(&self, id: Uuid, removal: CategoryRemoval) -> StoreResult<Option<u64>>;
    /// Moves products into `category_id`. Products leaving `uncategorized` are activated,
    /// products entering it are deactivated, everything else keeps its active flag.
    async fn assign_products(&self, category_id: Uuid, product_ids: &[Uuid], uncategorized: Uuid) -> StoreResult<u64>;
    /// Cart lines, wishlist entries, reviews and combo memberships go with the product.
    /// Order snapshots stay.
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;
    /// Active products whose own stock is at or below `threshold`, lowest first.
    async fn low_stock_products(&self, threshold: i32) -> StoreResult<Vec<Product>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_items(&self, user_id: Uuid) -> StoreResult<Vec<CartItem>>;
    async fn find_cart_line(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> StoreResult<Option<CartItem>>;
    async fn get_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<Option<CartItem>>;
    /// Fails with `Conflict("cart line")` when the (user, product, variant) line exists.
    /// Quantities below 1 are `InvalidQuantity` on every backend.
    async fn insert_cart_item(&self, item: &CartItem) -> StoreResult<()>;
    async fn set_cart_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>>;
    async fn delete_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<bool>;
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn find_offer_by_code(&self, code: &OfferCode) -> StoreResult<Option<Offer>>;
    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>>;
    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<(Vec<Offer>, i64)>;
    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()>;
    async fn update_offer(&self, id: Uuid, patch: &OfferPatch) -> StoreResult<Option<Offer>>;
    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and its items in one unit. When the order carries an offer,
    /// the offer's usage counter is bumped in the same unit only while it is below
    /// its limit (`OfferExhausted` otherwise). A taken order number is `Conflict("order number")`.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Newest first; all orders when `user_id` is `None`.
    async fn list_orders(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Order>>;
    /// Compare-and-set PENDING → PROCESSING/PAID, conditional stock decrement per
    /// line, and cart clearing, all or nothing.
    async fn confirm_payment(&self, id: Uuid, payment_reference: &str) -> StoreResult<Confirmation>;
    /// Overwrites the given fields; returns the previous status with the updated order.
    async fn update_order_status(
        &self, id: Uuid, status: Option<OrderStatus>, payment_status: Option<PaymentStatus>,
    ) -> StoreResult<Option<(OrderStatus, Order)>>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    /// Newest first.
    async fn wishlist_items(&self, user_id: Uuid) -> StoreResult<Vec<WishlistItem>>;
    /// Inserts unless the (user, product) pair is already saved; returns the stored row either way.
    async fn add_wishlist_item(&self, item: &WishlistItem) -> StoreResult<WishlistItem>;
    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Approved reviews of one product, newest first.
    async fn approved_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>>;
    async fn get_review(&self, id: Uuid) -> StoreResult<Option<Review>>;
    async fn list_reviews(&self, filter: &ReviewFilter) -> StoreResult<(Vec<Review>, i64)>;
    async fn insert_review(&self, review: &Review) -> StoreResult<()>;
    async fn update_review(&self, id: Uuid, patch: &ReviewPatch) -> StoreResult<Option<Review>>;
    async fn delete_review(&self, id: Uuid) -> StoreResult<bool>;
    /// Defaults when nothing was ever saved.
    async fn review_settings(&self) -> StoreResult<ReviewSettings>;
    async fn save_review_settings(&self, settings: &ReviewSettings) -> StoreResult<()>;
}

pub trait Store: CatalogStore + CartStore + OfferStore + OrderStore + WishlistStore + ReviewStore {}

impl<T> Store for T where T: CatalogStore + CartStore + OfferStore + OrderStore + WishlistStore + ReviewStore {}
