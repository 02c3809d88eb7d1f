//! In-process store backed by a single mutex.
//!
//! Every trait call takes the lock once, so multi-row operations are atomic with
//! respect to each other the same way a transaction is on Postgres.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::domain::aggregates::product::normalize_combo_items;
use crate::domain::aggregates::{
    CartItem, Category, Offer, Order, OrderStatus, PaymentStatus, Product, ProductVariant, Review, ReviewSettings,
    WishlistItem,
};
use crate::domain::value_objects::OfferCode;
use super::*;

#[derive(Default)]
struct Inner {
    products: Vec<Product>,
    categories: Vec<Category>,
    cart: Vec<CartItem>,
    offers: Vec<Offer>,
    orders: Vec<Order>,
    wishlist: Vec<WishlistItem>,
    reviews: Vec<Review>,
    review_settings: ReviewSettings,
}

impl Inner {
    fn product_mut(&mut self, id: Uuid) -> Option<&mut Product> { self.products.iter_mut().find(|p| p.id == id) }

    fn variant_mut(&mut self, id: Uuid) -> Option<&mut ProductVariant> {
        self.products.iter_mut().flat_map(|p| p.variants.iter_mut()).find(|v| v.id == id)
    }

    /// Drops products and every row that hangs off them, like the cascading foreign keys on Postgres.
    fn purge_products(&mut self, ids: &[Uuid]) -> u64 {
        let before = self.products.len();
        self.products.retain(|p| !ids.contains(&p.id));
        for p in &mut self.products {
            p.combo_items.retain(|c| !ids.contains(&c.product_id));
        }
        self.cart.retain(|i| !ids.contains(&i.product_id));
        self.wishlist.retain(|i| !ids.contains(&i.product_id));
        self.reviews.retain(|r| !ids.contains(&r.product_id));
        (before - self.products.len()) as u64
    }

    fn stock_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> i32 {
        let Some(product) = self.products.iter().find(|p| p.id == product_id) else { return 0 };
        match variant_id {
            Some(vid) => product.variant(vid).map_or(0, |v| v.stock),
            None => product.stock,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore { inner: Mutex<Inner> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn paginate<T: Clone>(items: &[T], offset: i64, limit: u32) -> Vec<T> {
    items.iter().skip(offset.max(0) as usize).take(limit as usize).cloned().collect()
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        let inner = self.inner.lock().await;
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut matched: Vec<Product> = inner.products.iter()
            .filter(|p| !filter.active_only || p.is_active)
            .filter(|p| filter.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| filter.featured.map_or(true, |f| p.is_featured == f))
            .filter(|p| filter.combo.map_or(true, |c| p.is_combo == c))
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        Ok((paginate(&matched, filter.offset(), filter.per_page), total))
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.inner.lock().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(self.inner.lock().await.products.iter().find(|p| p.slug == slug).cloned())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.products.iter().any(|p| p.slug == product.slug) { return Err(StoreError::Conflict("slug")); }
        inner.products.push(product.clone());
        Ok(())
    }

    async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> StoreResult<Option<Product>> {
        let mut inner = self.inner.lock().await;
        if let Some(slug) = &patch.slug {
            if inner.products.iter().any(|p| &p.slug == slug && p.id != id) { return Err(StoreError::Conflict("slug")); }
        }
        let Some(p) = inner.product_mut(id) else { return Ok(None) };
        if let Some(v) = &patch.name { p.name = v.clone(); }
        if let Some(v) = &patch.slug { p.slug = v.clone(); }
        if let Some(v) = &patch.description { p.description = v.clone(); }
        if let Some(v) = &patch.sku { p.sku = Some(v.clone()); }
        if let Some(v) = patch.category_id { p.category_id = Some(v); }
        if let Some(v) = patch.price_usd { p.price_usd = Some(v); }
        if let Some(v) = patch.price_mns { p.price_mns = Some(v); }
        if let Some(v) = patch.compare_price_usd { p.compare_price_usd = Some(v); }
        if let Some(v) = patch.compare_price_mns { p.compare_price_mns = Some(v); }
        if let Some(v) = patch.stock { p.stock = v; }
        if let Some(v) = patch.is_active { p.is_active = v; }
        if let Some(v) = patch.is_featured { p.is_featured = v; }
        if let Some(v) = patch.is_combo { p.is_combo = v; }
        if !p.is_combo {
            p.combo_items.clear();
        } else if let Some(items) = &patch.combo_items {
            p.combo_items = normalize_combo_items(id, items.clone());
        }
        p.updated_at = Utc::now();
        Ok(Some(p.clone()))
    }

    async fn insert_variant(&self, variant: &ProductVariant) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(p) = inner.product_mut(variant.product_id) else {
            return Err(StoreError::Corrupt(format!("variant for unknown product {}", variant.product_id)));
        };
        p.variants.push(variant.clone());
        p.variants.sort_by_key(|v| v.position);
        Ok(())
    }

    async fn update_variant(&self, id: Uuid, patch: &VariantPatch) -> StoreResult<Option<ProductVariant>> {
        let mut inner = self.inner.lock().await;
        let Some(v) = inner.variant_mut(id) else { return Ok(None) };
        if let Some(x) = &patch.name { v.name = x.clone(); }
        if let Some(x) = &patch.sku { v.sku = Some(x.clone()); }
        if let Some(x) = patch.price_usd { v.price_usd = Some(x); }
        if let Some(x) = patch.price_mns { v.price_mns = Some(x); }
        if let Some(x) = patch.stock { v.stock = x; }
        if let Some(x) = patch.is_active { v.is_active = x; }
        if let Some(x) = patch.position { v.position = x; }
        Ok(Some(v.clone()))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut cats = self.inner.lock().await.categories.clone();
        cats.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        Ok(cats)
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.inner.lock().await.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self.inner.lock().await.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.categories.iter().any(|c| c.slug == category.slug) { return Err(StoreError::Conflict("slug")); }
        inner.categories.push(category.clone());
        Ok(())
    }

    async fn update_category(&self, id: Uuid, patch: &CategoryPatch) -> StoreResult<Option<Category>> {
        let mut inner = self.inner.lock().await;
        if let Some(slug) = &patch.slug {
            if inner.categories.iter().any(|c| &c.slug == slug && c.id != id) { return Err(StoreError::Conflict("slug")); }
        }
        let Some(c) = inner.categories.iter_mut().find(|c| c.id == id) else { return Ok(None) };
        if let Some(v) = &patch.name { c.name = v.clone(); }
        if let Some(v) = &patch.slug { c.slug = v.clone(); }
        if let Some(v) = &patch.description { c.description = Some(v.clone()); }
        if let Some(v) = patch.is_active { c.is_active = v; }
        if let Some(v) = patch.position { c.position = v; }
        Ok(Some(c.clone()))
    }

    async fn remove_category(&self, id: Uuid, removal: CategoryRemoval) -> StoreResult<Option<u64>> {
        let mut inner = self.inner.lock().await;
        if !inner.categories.iter().any(|c| c.id == id) { return Ok(None); }
        let affected = match removal {
            CategoryRemoval::DeleteProducts => {
                let ids: Vec<Uuid> = inner.products.iter().filter(|p| p.category_id == Some(id)).map(|p| p.id).collect();
                inner.purge_products(&ids)
            }
            CategoryRemoval::MoveProductsTo(target) => {
                let now = Utc::now();
                let mut moved = 0;
                for p in inner.products.iter_mut().filter(|p| p.category_id == Some(id)) {
                    p.category_id = Some(target);
                    p.is_active = false;
                    p.updated_at = now;
                    moved += 1;
                }
                moved
            }
        };
        inner.categories.retain(|c| c.id != id);
        Ok(Some(affected))
    }

    async fn assign_products(&self, category_id: Uuid, product_ids: &[Uuid], uncategorized: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut moved = 0;
        for p in inner.products.iter_mut().filter(|p| product_ids.contains(&p.id)) {
            if category_id == uncategorized {
                p.is_active = false;
            } else if p.category_id == Some(uncategorized) {
                p.is_active = true;
            }
            p.category_id = Some(category_id);
            p.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.lock().await.purge_products(&[id]) > 0)
    }

    async fn low_stock_products(&self, threshold: i32) -> StoreResult<Vec<Product>> {
        let inner = self.inner.lock().await;
        let mut low: Vec<Product> = inner.products.iter().filter(|p| p.is_active && p.stock <= threshold).cloned().collect();
        low.sort_by_key(|p| p.stock);
        Ok(low)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_items(&self, user_id: Uuid) -> StoreResult<Vec<CartItem>> {
        Ok(self.inner.lock().await.cart.iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn find_cart_line(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> StoreResult<Option<CartItem>> {
        let inner = self.inner.lock().await;
        Ok(inner.cart.iter()
            .find(|i| i.user_id == user_id && i.product_id == product_id && i.variant_id == variant_id)
            .cloned())
    }

    async fn get_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self.inner.lock().await.cart.iter().find(|i| i.id == item_id && i.user_id == user_id).cloned())
    }

    async fn insert_cart_item(&self, item: &CartItem) -> StoreResult<()> {
        if item.quantity < 1 { return Err(StoreError::InvalidQuantity(item.quantity)); }
        let mut inner = self.inner.lock().await;
        let taken = inner.cart.iter()
            .any(|i| i.user_id == item.user_id && i.product_id == item.product_id && i.variant_id == item.variant_id);
        if taken { return Err(StoreError::Conflict("cart line")); }
        inner.cart.push(item.clone());
        Ok(())
    }

    async fn set_cart_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>> {
        if quantity < 1 { return Err(StoreError::InvalidQuantity(quantity)); }
        let mut inner = self.inner.lock().await;
        Ok(inner.cart.iter_mut().find(|i| i.id == item_id).map(|i| { i.quantity = quantity; i.clone() }))
    }

    async fn delete_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.cart.len();
        inner.cart.retain(|i| !(i.id == item_id && i.user_id == user_id));
        Ok(inner.cart.len() != before)
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.cart.len();
        inner.cart.retain(|i| i.user_id != user_id);
        Ok((before - inner.cart.len()) as u64)
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn find_offer_by_code(&self, code: &OfferCode) -> StoreResult<Option<Offer>> {
        Ok(self.inner.lock().await.offers.iter().find(|o| &o.code == code).cloned())
    }

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        Ok(self.inner.lock().await.offers.iter().find(|o| o.id == id).cloned())
    }

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<(Vec<Offer>, i64)> {
        let inner = self.inner.lock().await;
        let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let mut matched: Vec<Offer> = inner.offers.iter()
            .filter(|o| needle.as_deref().map_or(true, |n| {
                o.name.to_lowercase().contains(n) || o.code.as_str().to_lowercase().contains(n)
            }))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        Ok((paginate(&matched, filter.offset(), filter.limit), total))
    }

    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.offers.iter().any(|o| o.code == offer.code) { return Err(StoreError::Conflict("offer code")); }
        inner.offers.push(offer.clone());
        Ok(())
    }

    async fn update_offer(&self, id: Uuid, patch: &OfferPatch) -> StoreResult<Option<Offer>> {
        let mut inner = self.inner.lock().await;
        if let Some(code) = &patch.code {
            if inner.offers.iter().any(|o| &o.code == code && o.id != id) { return Err(StoreError::Conflict("offer code")); }
        }
        let Some(offer) = inner.offers.iter_mut().find(|o| o.id == id) else { return Ok(None) };
        *offer = patch.apply_to(offer);
        offer.updated_at = Utc::now();
        Ok(Some(offer.clone()))
    }

    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.offers.len();
        inner.offers.retain(|o| o.id != id);
        Ok(inner.offers.len() != before)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict("order number"));
        }
        if let Some(offer_id) = order.offer_id {
            let offer = inner.offers.iter_mut().find(|o| o.id == offer_id).ok_or(StoreError::OfferExhausted)?;
            if !offer.has_uses_left() { return Err(StoreError::OfferExhausted); }
            offer.usage_count += 1;
        }
        inner.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.inner.lock().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.orders.iter()
            .filter(|o| user_id.map_or(true, |u| o.user_id == u))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn confirm_payment(&self, id: Uuid, payment_reference: &str) -> StoreResult<Confirmation> {
        let mut inner = self.inner.lock().await;
        let Some(idx) = inner.orders.iter().position(|o| o.id == id) else { return Ok(Confirmation::NotFound) };
        let order = inner.orders[idx].clone();

        if order.status != OrderStatus::Pending {
            let stored = &mut inner.orders[idx];
            stored.payment_intent_id = Some(payment_reference.to_string());
            stored.updated_at = Utc::now();
            return Ok(Confirmation::AlreadyProcessed(stored.clone()));
        }

        // Check every line before touching anything.
        for item in &order.items {
            let available = inner.stock_of(item.product_id, item.variant_id);
            if available < item.quantity {
                return Err(StoreError::InsufficientStock { name: item.display_name(), available });
            }
        }
        for item in &order.items {
            match item.variant_id {
                Some(vid) => if let Some(v) = inner.variant_mut(vid) { v.stock -= item.quantity; },
                None => if let Some(p) = inner.product_mut(item.product_id) { p.stock -= item.quantity; p.updated_at = Utc::now(); },
            }
        }
        inner.cart.retain(|i| i.user_id != order.user_id);

        let stored = &mut inner.orders[idx];
        stored.status = OrderStatus::Processing;
        stored.payment_status = PaymentStatus::Paid;
        stored.payment_intent_id = Some(payment_reference.to_string());
        stored.updated_at = Utc::now();
        Ok(Confirmation::Confirmed(stored.clone()))
    }

    async fn update_order_status(
        &self, id: Uuid, status: Option<OrderStatus>, payment_status: Option<PaymentStatus>,
    ) -> StoreResult<Option<(OrderStatus, Order)>> {
        let mut inner = self.inner.lock().await;
        let Some(order) = inner.orders.iter_mut().find(|o| o.id == id) else { return Ok(None) };
        let previous = order.status;
        if let Some(s) = status { order.status = s; }
        if let Some(p) = payment_status { order.payment_status = p; }
        order.updated_at = Utc::now();
        Ok(Some((previous, order.clone())))
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn wishlist_items(&self, user_id: Uuid) -> StoreResult<Vec<WishlistItem>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<WishlistItem> = inner.wishlist.iter().filter(|i| i.user_id == user_id).cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn add_wishlist_item(&self, item: &WishlistItem) -> StoreResult<WishlistItem> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.wishlist.iter().find(|i| i.user_id == item.user_id && i.product_id == item.product_id) {
            return Ok(existing.clone());
        }
        inner.wishlist.push(item.clone());
        Ok(item.clone())
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.wishlist.len();
        inner.wishlist.retain(|i| !(i.user_id == user_id && i.product_id == product_id));
        Ok(inner.wishlist.len() != before)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn approved_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let inner = self.inner.lock().await;
        let mut reviews: Vec<Review> = inner.reviews.iter()
            .filter(|r| r.product_id == product_id && r.is_approved)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn get_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self.inner.lock().await.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> StoreResult<(Vec<Review>, i64)> {
        let inner = self.inner.lock().await;
        let needle = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
        let product_matches = |r: &Review, n: &str| {
            inner.products.iter().find(|p| p.id == r.product_id)
                .is_some_and(|p| p.name.to_lowercase().contains(n) || p.slug.contains(n))
        };
        let mut matched: Vec<Review> = inner.reviews.iter()
            .filter(|r| filter.product_id.map_or(true, |id| r.product_id == id))
            .filter(|r| filter.is_approved.map_or(true, |a| r.is_approved == a))
            .filter(|r| needle.as_deref().map_or(true, |n| r.mentions(n) || product_matches(r, n)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        Ok((paginate(&matched, filter.offset(), filter.limit), total))
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.inner.lock().await.reviews.push(review.clone());
        Ok(())
    }

    async fn update_review(&self, id: Uuid, patch: &ReviewPatch) -> StoreResult<Option<Review>> {
        let mut inner = self.inner.lock().await;
        let Some(r) = inner.reviews.iter_mut().find(|r| r.id == id) else { return Ok(None) };
        if let Some(v) = &patch.author_name { r.author_name = v.clone(); }
        if let Some(v) = &patch.author_email { r.author_email = Some(v.clone()); }
        if let Some(v) = patch.rating { r.rating = v; }
        if let Some(v) = &patch.title { r.title = Some(v.clone()); }
        if let Some(v) = &patch.content { r.content = v.clone(); }
        if let Some(v) = patch.is_approved { r.is_approved = v; }
        r.updated_at = Utc::now();
        Ok(Some(r.clone()))
    }

    async fn delete_review(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.reviews.len();
        inner.reviews.retain(|r| r.id != id);
        Ok(inner.reviews.len() != before)
    }

    async fn review_settings(&self) -> StoreResult<ReviewSettings> {
        Ok(self.inner.lock().await.review_settings)
    }

    async fn save_review_settings(&self, settings: &ReviewSettings) -> StoreResult<()> {
        self.inner.lock().await.review_settings = *settings;
        Ok(())
    }
}
