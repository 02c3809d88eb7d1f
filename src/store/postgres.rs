//! PostgreSQL store on sqlx.
//!
//! Stock only ever moves through conditional updates (`... WHERE stock >= $n`) and the
//! order status through a compare-and-set on `status = 'PENDING'`, both inside the
//! transaction that confirms a payment.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use crate::domain::aggregates::product::normalize_combo_items;
use crate::domain::aggregates::{
    Address, CartItem, Category, ComboItem, Offer, OfferKind, Order, OrderItem, OrderStatus, PaymentStatus, Product,
    ProductVariant, Review, ReviewSettings, WishlistItem,
};
use crate::domain::value_objects::{Money, OfferCode};
use super::*;

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn conflict_or(e: sqlx::Error, what: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what),
        _ => StoreError::Database(e),
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, slug: String, name: String, description: String, sku: Option<String>, category_id: Option<Uuid>,
    price_usd: Option<Decimal>, price_mns: Option<Decimal>, compare_price_usd: Option<Decimal>, compare_price_mns: Option<Decimal>,
    stock: i32, is_active: bool, is_featured: bool, is_combo: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid, product_id: Uuid, name: String, sku: Option<String>, price_usd: Option<Decimal>, price_mns: Option<Decimal>,
    stock: i32, is_active: bool, position: i32,
}

#[derive(sqlx::FromRow)]
struct ComboRow { combo_id: Uuid, product_id: Uuid, quantity: i32 }

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid, name: String, slug: String, description: Option<String>, is_active: bool, position: i32, created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow { id: Uuid, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: i32, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid, name: String, code: String, kind: String, value: Decimal, min_purchase: Option<Decimal>,
    usage_limit: Option<i32>, usage_count: i32, start_date: DateTime<Utc>, end_date: DateTime<Utc>, is_active: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, customer_email: Option<String>, status: String, payment_status: String,
    subtotal: Decimal, discount: Decimal, tax: Decimal, shipping: Decimal, total: Decimal,
    shipping_address: Json<Address>, billing_address: Json<Address>, payment_intent_id: Option<String>, notes: Option<String>,
    offer_id: Option<Uuid>, offer_code: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, product_name: String, variant_name: Option<String>,
    quantity: i32, price: Decimal,
}

#[derive(sqlx::FromRow)]
struct WishlistRow { id: Uuid, user_id: Uuid, product_id: Uuid, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid, product_id: Uuid, user_id: Option<Uuid>, author_name: String, author_email: Option<String>, rating: i32,
    title: Option<String>, content: String, is_approved: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<WishlistRow> for WishlistItem {
    fn from(r: WishlistRow) -> Self {
        WishlistItem { id: r.id, user_id: r.user_id, product_id: r.product_id, created_at: r.created_at }
    }
}

impl From<ReviewRow> for Review {
    fn from(r: ReviewRow) -> Self {
        Review {
            id: r.id, product_id: r.product_id, user_id: r.user_id, author_name: r.author_name, author_email: r.author_email,
            rating: r.rating, title: r.title, content: r.content, is_approved: r.is_approved,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

impl From<VariantRow> for ProductVariant {
    fn from(r: VariantRow) -> Self {
        ProductVariant {
            id: r.id, product_id: r.product_id, name: r.name, sku: r.sku, price_usd: r.price_usd, price_mns: r.price_mns,
            stock: r.stock, is_active: r.is_active, position: r.position,
        }
    }
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, slug: r.slug, description: r.description, is_active: r.is_active, position: r.position, created_at: r.created_at }
    }
}

impl From<CartItemRow> for CartItem {
    fn from(r: CartItemRow) -> Self {
        CartItem { id: r.id, user_id: r.user_id, product_id: r.product_id, variant_id: r.variant_id, quantity: r.quantity, created_at: r.created_at }
    }
}

impl TryFrom<OfferRow> for Offer {
    type Error = StoreError;
    fn try_from(r: OfferRow) -> StoreResult<Self> {
        let code = OfferCode::new(&r.code).map_err(|e| StoreError::Corrupt(format!("offer {}: {}", r.id, e)))?;
        let kind = OfferKind::parse(&r.kind).ok_or_else(|| StoreError::Corrupt(format!("offer {}: kind {}", r.id, r.kind)))?;
        Ok(Offer {
            id: r.id, name: r.name, code, kind, value: r.value, min_purchase: r.min_purchase, usage_limit: r.usage_limit,
            usage_count: r.usage_count, start_date: r.start_date, end_date: r.end_date, is_active: r.is_active,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StoreResult<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("order {}: status {}", self.id, self.status)))?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .ok_or_else(|| StoreError::Corrupt(format!("order {}: payment status {}", self.id, self.payment_status)))?;
        Ok(Order {
            id: self.id, order_number: self.order_number, user_id: self.user_id, customer_email: self.customer_email,
            status, payment_status,
            subtotal: Money::usd(self.subtotal), discount: Money::usd(self.discount), tax: Money::usd(self.tax),
            shipping: Money::usd(self.shipping), total: Money::usd(self.total),
            shipping_address: self.shipping_address.0, billing_address: self.billing_address.0,
            payment_intent_id: self.payment_intent_id, notes: self.notes, offer_id: self.offer_id, offer_code: self.offer_code,
            items, created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem {
            id: r.id, product_id: r.product_id, variant_id: r.variant_id, product_name: r.product_name,
            variant_name: r.variant_name, quantity: r.quantity, price: Money::usd(r.price),
        }
    }
}

// =============================================================================
// Loading helpers
// =============================================================================

async fn hydrate_products(conn: &mut PgConnection, rows: Vec<ProductRow>) -> StoreResult<Vec<Product>> {
    if rows.is_empty() { return Ok(vec![]); }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let variants = sqlx::query_as::<_, VariantRow>(
        "SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY position, name")
        .bind(&ids[..]).fetch_all(&mut *conn).await?;
    let combos = sqlx::query_as::<_, ComboRow>(
        "SELECT combo_id, product_id, quantity FROM combo_items WHERE combo_id = ANY($1)")
        .bind(&ids[..]).fetch_all(&mut *conn).await?;

    let mut variants: Vec<ProductVariant> = variants.into_iter().map(Into::into).collect();
    Ok(rows.into_iter().map(|r| {
        let (own, rest): (Vec<_>, Vec<_>) = variants.drain(..).partition(|v| v.product_id == r.id);
        variants = rest;
        let combo_items = combos.iter()
            .filter(|c| c.combo_id == r.id)
            .map(|c| ComboItem { product_id: c.product_id, quantity: c.quantity })
            .collect();
        Product {
            id: r.id, slug: r.slug, name: r.name, description: r.description, sku: r.sku, category_id: r.category_id,
            price_usd: r.price_usd, price_mns: r.price_mns, compare_price_usd: r.compare_price_usd,
            compare_price_mns: r.compare_price_mns, stock: r.stock, is_active: r.is_active, is_featured: r.is_featured,
            is_combo: r.is_combo, combo_items, variants: own, created_at: r.created_at, updated_at: r.updated_at,
        }
    }).collect())
}

async fn load_product(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => Ok(hydrate_products(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn replace_combo_items(conn: &mut PgConnection, combo_id: Uuid, items: &[ComboItem]) -> StoreResult<()> {
    sqlx::query("DELETE FROM combo_items WHERE combo_id = $1").bind(combo_id).execute(&mut *conn).await?;
    for item in normalize_combo_items(combo_id, items.to_vec()) {
        sqlx::query("INSERT INTO combo_items (combo_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(combo_id).bind(item.product_id).bind(item.quantity)
            .execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_variant_row(conn: &mut PgConnection, v: &ProductVariant) -> StoreResult<()> {
    sqlx::query("INSERT INTO product_variants (id, product_id, name, sku, price_usd, price_mns, stock, is_active, position) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
        .bind(v.id).bind(v.product_id).bind(&v.name).bind(&v.sku).bind(v.price_usd).bind(v.price_mns)
        .bind(v.stock).bind(v.is_active).bind(v.position)
        .execute(&mut *conn).await?;
    Ok(())
}

async fn load_orders(conn: &mut PgConnection, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    if rows.is_empty() { return Ok(vec![]); }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY product_name")
        .bind(&ids[..]).fetch_all(&mut *conn).await?;
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item.into());
    }
    rows.into_iter()
        .map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items)
        })
        .collect()
}

async fn load_order(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => Ok(load_orders(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ProductFilter) {
    if f.active_only { qb.push(" AND is_active"); }
    if let Some(c) = f.category_id { qb.push(" AND category_id = ").push_bind(c); }
    if let Some(x) = f.featured { qb.push(" AND is_featured = ").push_bind(x); }
    if let Some(x) = f.combo { qb.push(" AND is_combo = ").push_bind(x); }
    if let Some(s) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND name ILIKE ").push_bind(format!("%{}%", s));
    }
}

fn push_review_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ReviewFilter) {
    if let Some(id) = f.product_id { qb.push(" AND r.product_id = ").push_bind(id); }
    if let Some(a) = f.is_approved { qb.push(" AND r.is_approved = ").push_bind(a); }
    if let Some(s) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", s);
        qb.push(" AND (r.author_name ILIKE ").push_bind(pattern.clone())
            .push(" OR r.author_email ILIKE ").push_bind(pattern.clone())
            .push(" OR r.title ILIKE ").push_bind(pattern.clone())
            .push(" OR r.content ILIKE ").push_bind(pattern.clone())
            .push(" OR p.name ILIKE ").push_bind(pattern.clone())
            .push(" OR p.slug ILIKE ").push_bind(pattern)
            .push(")");
    }
}

fn push_offer_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &OfferFilter) {
    if let Some(s) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", s);
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone()).push(" OR code ILIKE ").push_bind(pattern).push(")");
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM products WHERE TRUE");
        push_product_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(filter.per_page as i64)
            .push(" OFFSET ").push_bind(filter.offset());
        let rows = qb.build_query_as::<ProductRow>().fetch_all(&mut *conn).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_product_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&mut *conn).await?;
        Ok((hydrate_products(&mut conn, rows).await?, total))
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id).await
    }

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1")
            .bind(slug).fetch_optional(&mut *conn).await?;
        match row {
            Some(row) => Ok(hydrate_products(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO products (id, slug, name, description, sku, category_id, price_usd, price_mns, compare_price_usd, compare_price_mns, stock, is_active, is_featured, is_combo, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(p.id).bind(&p.slug).bind(&p.name).bind(&p.description).bind(&p.sku).bind(p.category_id)
            .bind(p.price_usd).bind(p.price_mns).bind(p.compare_price_usd).bind(p.compare_price_mns)
            .bind(p.stock).bind(p.is_active).bind(p.is_featured).bind(p.is_combo).bind(p.created_at).bind(p.updated_at)
            .execute(&mut *tx).await.map_err(|e| conflict_or(e, "slug"))?;
        for v in &p.variants { insert_variant_row(&mut tx, v).await?; }
        if p.is_combo { replace_combo_items(&mut tx, p.id, &p.combo_items).await?; }
        tx.commit().await?;
        Ok(())
    }

    async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> StoreResult<Option<Product>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, (bool,)>(
            "UPDATE products SET name = COALESCE($2, name), slug = COALESCE($3, slug), description = COALESCE($4, description), \
             sku = COALESCE($5, sku), category_id = COALESCE($6, category_id), price_usd = COALESCE($7, price_usd), \
             price_mns = COALESCE($8, price_mns), compare_price_usd = COALESCE($9, compare_price_usd), \
             compare_price_mns = COALESCE($10, compare_price_mns), stock = COALESCE($11, stock), \
             is_active = COALESCE($12, is_active), is_featured = COALESCE($13, is_featured), is_combo = COALESCE($14, is_combo), \
             updated_at = NOW() WHERE id = $1 RETURNING is_combo")
            .bind(id).bind(&patch.name).bind(&patch.slug).bind(&patch.description).bind(&patch.sku).bind(patch.category_id)
            .bind(patch.price_usd).bind(patch.price_mns).bind(patch.compare_price_usd).bind(patch.compare_price_mns)
            .bind(patch.stock).bind(patch.is_active).bind(patch.is_featured).bind(patch.is_combo)
            .fetch_optional(&mut *tx).await.map_err(|e| conflict_or(e, "slug"))?;
        let Some((is_combo,)) = updated else { return Ok(None) };

        if !is_combo {
            sqlx::query("DELETE FROM combo_items WHERE combo_id = $1").bind(id).execute(&mut *tx).await?;
        } else if let Some(items) = &patch.combo_items {
            replace_combo_items(&mut tx, id, items).await?;
        }
        let product = load_product(&mut tx, id).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn insert_variant(&self, variant: &ProductVariant) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_variant_row(&mut conn, variant).await
    }

    async fn update_variant(&self, id: Uuid, patch: &VariantPatch) -> StoreResult<Option<ProductVariant>> {
        let row = sqlx::query_as::<_, VariantRow>(
            "UPDATE product_variants SET name = COALESCE($2, name), sku = COALESCE($3, sku), price_usd = COALESCE($4, price_usd), \
             price_mns = COALESCE($5, price_mns), stock = COALESCE($6, stock), is_active = COALESCE($7, is_active), \
             position = COALESCE($8, position) WHERE id = $1 RETURNING *")
            .bind(id).bind(&patch.name).bind(&patch.sku).bind(patch.price_usd).bind(patch.price_mns)
            .bind(patch.stock).bind(patch.is_active).bind(patch.position)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY position, name")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn get_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE slug = $1")
            .bind(slug).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }
    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, is_active, position, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.is_active).bind(c.position).bind(c.created_at)
            .execute(&self.pool).await.map_err(|e| conflict_or(e, "slug"))?;
        Ok(())
    }

    async fn update_category(&self, id: Uuid, patch: &CategoryPatch) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE categories SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
             description = COALESCE($4, description), is_active = COALESCE($5, is_active), \
             position = COALESCE($6, position) WHERE id = $1 RETURNING *")
            .bind(id).bind(&patch.name).bind(&patch.slug).bind(&patch.description).bind(patch.is_active).bind(patch.position)
            .fetch_optional(&self.pool).await.map_err(|e| conflict_or(e, "slug"))?;
        Ok(row.map(Into::into))
    }

    async fn remove_category(&self, id: Uuid, removal: CategoryRemoval) -> StoreResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?;
        if exists.is_none() { return Ok(None); }

        let affected = match removal {
            CategoryRemoval::DeleteProducts => {
                sqlx::query("DELETE FROM products WHERE category_id = $1").bind(id).execute(&mut *tx).await?
            }
            CategoryRemoval::MoveProductsTo(target) => {
                sqlx::query("UPDATE products SET category_id = $2, is_active = FALSE, updated_at = NOW() WHERE category_id = $1")
                    .bind(id).bind(target).execute(&mut *tx).await?
            }
        };
        sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(affected.rows_affected()))
    }

    async fn assign_products(&self, category_id: Uuid, product_ids: &[Uuid], uncategorized: Uuid) -> StoreResult<u64> {
        let res = sqlx::query(
            "UPDATE products SET is_active = CASE WHEN $1 = $3 THEN FALSE WHEN category_id = $3 THEN TRUE ELSE is_active END, \
             category_id = $1, updated_at = NOW() WHERE id = ANY($2)")
            .bind(category_id).bind(product_ids).bind(uncategorized)
            .execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn low_stock_products(&self, threshold: i32) -> StoreResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE is_active AND stock <= $1 ORDER BY stock ASC")
            .bind(threshold).fetch_all(&mut *conn).await?;
        hydrate_products(&mut conn, rows).await
    }
}

// =============================================================================
// Cart
// =============================================================================

#[async_trait]
impl CartStore for PgStore {
    async fn cart_items(&self, user_id: Uuid) -> StoreResult<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_cart_line(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "SELECT * FROM cart_items WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3")
            .bind(user_id).bind(product_id).bind(variant_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn get_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id).bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn insert_cart_item(&self, i: &CartItem) -> StoreResult<()> {
        if i.quantity < 1 { return Err(StoreError::InvalidQuantity(i.quantity)); }
        sqlx::query("INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(i.id).bind(i.user_id).bind(i.product_id).bind(i.variant_id).bind(i.quantity).bind(i.created_at)
            .execute(&self.pool).await.map_err(|e| conflict_or(e, "cart line"))?;
        Ok(())
    }

    async fn set_cart_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>> {
        if quantity < 1 { return Err(StoreError::InvalidQuantity(quantity)); }
        let row = sqlx::query_as::<_, CartItemRow>("UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING *")
            .bind(item_id).bind(quantity).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn delete_cart_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id).bind(user_id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}

// =============================================================================
// Offers
// =============================================================================

#[async_trait]
impl OfferStore for PgStore {
    async fn find_offer_by_code(&self, code: &OfferCode) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&self.pool).await?;
        row.map(Offer::try_from).transpose()
    }

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Offer::try_from).transpose()
    }

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<(Vec<Offer>, i64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM offers WHERE TRUE");
        push_offer_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(filter.limit as i64).push(" OFFSET ").push_bind(filter.offset());
        let rows = qb.build_query_as::<OfferRow>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM offers WHERE TRUE");
        push_offer_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
        let offers = rows.into_iter().map(Offer::try_from).collect::<StoreResult<Vec<_>>>()?;
        Ok((offers, total))
    }

    async fn insert_offer(&self, o: &Offer) -> StoreResult<()> {
        sqlx::query("INSERT INTO offers (id, name, code, kind, value, min_purchase, usage_limit, usage_count, start_date, end_date, is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(o.id).bind(&o.name).bind(o.code.as_str()).bind(o.kind.as_str()).bind(o.value).bind(o.min_purchase)
            .bind(o.usage_limit).bind(o.usage_count).bind(o.start_date).bind(o.end_date).bind(o.is_active)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&self.pool).await.map_err(|e| conflict_or(e, "offer code"))?;
        Ok(())
    }

    async fn update_offer(&self, id: Uuid, patch: &OfferPatch) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>(
            "UPDATE offers SET name = COALESCE($2, name), code = COALESCE($3, code), kind = COALESCE($4, kind), \
             value = COALESCE($5, value), \
             min_purchase = CASE WHEN $6 THEN $7 ELSE min_purchase END, \
             usage_limit = CASE WHEN $8 THEN $9 ELSE usage_limit END, \
             usage_count = COALESCE($10, usage_count), start_date = COALESCE($11, start_date), end_date = COALESCE($12, end_date), \
             is_active = COALESCE($13, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(&patch.name).bind(patch.code.as_ref().map(|c| c.as_str())).bind(patch.kind.map(|k| k.as_str()))
            .bind(patch.value)
            .bind(patch.min_purchase.is_some()).bind(patch.min_purchase.flatten())
            .bind(patch.usage_limit.is_some()).bind(patch.usage_limit.flatten())
            .bind(patch.usage_count).bind(patch.start_date).bind(patch.end_date).bind(patch.is_active)
            .fetch_optional(&self.pool).await.map_err(|e| conflict_or(e, "offer code"))?;
        row.map(Offer::try_from).transpose()
    }

    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM offers WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }
}

// =============================================================================
// Wishlist
// =============================================================================

#[async_trait]
impl WishlistStore for PgStore {
    async fn wishlist_items(&self, user_id: Uuid) -> StoreResult<Vec<WishlistItem>> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_wishlist_item(&self, i: &WishlistItem) -> StoreResult<WishlistItem> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO wishlist_items (id, user_id, product_id, created_at) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (user_id, product_id) DO NOTHING")
            .bind(i.id).bind(i.user_id).bind(i.product_id).bind(i.created_at)
            .execute(&mut *tx).await?;
        let row = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(i.user_id).bind(i.product_id).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }
}

// =============================================================================
// Reviews
// =============================================================================

#[async_trait]
impl ReviewStore for PgStore {
    async fn approved_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE product_id = $1 AND is_approved ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> StoreResult<(Vec<Review>, i64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT r.* FROM reviews r JOIN products p ON p.id = r.product_id WHERE TRUE");
        push_review_filters(&mut qb, filter);
        qb.push(" ORDER BY r.created_at DESC LIMIT ").push_bind(filter.limit as i64).push(" OFFSET ").push_bind(filter.offset());
        let rows = qb.build_query_as::<ReviewRow>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reviews r JOIN products p ON p.id = r.product_id WHERE TRUE");
        push_review_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn insert_review(&self, r: &Review) -> StoreResult<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, user_id, author_name, author_email, rating, title, content, is_approved, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(r.id).bind(r.product_id).bind(r.user_id).bind(&r.author_name).bind(&r.author_email).bind(r.rating)
            .bind(&r.title).bind(&r.content).bind(r.is_approved).bind(r.created_at).bind(r.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_review(&self, id: Uuid, patch: &ReviewPatch) -> StoreResult<Option<Review>> {
        let row = sqlx::query_as::<_, ReviewRow>(
            "UPDATE reviews SET author_name = COALESCE($2, author_name), author_email = COALESCE($3, author_email), \
             rating = COALESCE($4, rating), title = COALESCE($5, title), content = COALESCE($6, content), \
             is_approved = COALESCE($7, is_approved), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(&patch.author_name).bind(&patch.author_email).bind(patch.rating).bind(&patch.title)
            .bind(&patch.content).bind(patch.is_approved)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(Into::into))
    }

    async fn delete_review(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn review_settings(&self) -> StoreResult<ReviewSettings> {
        let row = sqlx::query_as::<_, (bool,)>("SELECT auto_approve_reviews FROM review_settings WHERE id")
            .fetch_optional(&self.pool).await?;
        Ok(row.map_or_else(ReviewSettings::default, |(auto_approve_reviews,)| ReviewSettings { auto_approve_reviews }))
    }

    async fn save_review_settings(&self, settings: &ReviewSettings) -> StoreResult<()> {
        sqlx::query("INSERT INTO review_settings (id, auto_approve_reviews) VALUES (TRUE, $1) \
                     ON CONFLICT (id) DO UPDATE SET auto_approve_reviews = EXCLUDED.auto_approve_reviews")
            .bind(settings.auto_approve_reviews).execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, o: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(offer_id) = o.offer_id {
            let res = sqlx::query(
                "UPDATE offers SET usage_count = usage_count + 1, updated_at = NOW() \
                 WHERE id = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)")
                .bind(offer_id).execute(&mut *tx).await?;
            if res.rows_affected() == 0 { return Err(StoreError::OfferExhausted); }
        }
        sqlx::query("INSERT INTO orders (id, order_number, user_id, customer_email, status, payment_status, subtotal, discount, tax, shipping, total, shipping_address, billing_address, payment_intent_id, notes, offer_id, offer_code, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)")
            .bind(o.id).bind(&o.order_number).bind(o.user_id).bind(&o.customer_email)
            .bind(o.status.as_str()).bind(o.payment_status.as_str())
            .bind(o.subtotal.amount()).bind(o.discount.amount()).bind(o.tax.amount()).bind(o.shipping.amount()).bind(o.total.amount())
            .bind(Json(&o.shipping_address)).bind(Json(&o.billing_address))
            .bind(&o.payment_intent_id).bind(&o.notes).bind(o.offer_id).bind(&o.offer_code).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await.map_err(|e| conflict_or(e, "order number"))?;
        for i in &o.items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, variant_id, product_name, variant_name, quantity, price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
                .bind(i.id).bind(o.id).bind(i.product_id).bind(i.variant_id).bind(&i.product_name).bind(&i.variant_name)
                .bind(i.quantity).bind(i.price.amount())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, id).await
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&mut *conn).await?;
        load_orders(&mut conn, rows).await
    }

    async fn confirm_payment(&self, id: Uuid, payment_reference: &str) -> StoreResult<Confirmation> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query_as::<_, (Uuid,)>(
            "UPDATE orders SET status = 'PROCESSING', payment_status = 'PAID', payment_intent_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' RETURNING user_id")
            .bind(id).bind(payment_reference).fetch_optional(&mut *tx).await?;

        let Some((user_id,)) = claimed else {
            let res = sqlx::query("UPDATE orders SET payment_intent_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id).bind(payment_reference).execute(&mut *tx).await?;
            if res.rows_affected() == 0 { return Ok(Confirmation::NotFound); }
            let order = load_order(&mut tx, id).await?;
            tx.commit().await?;
            return Ok(order.map_or(Confirmation::NotFound, Confirmation::AlreadyProcessed));
        };

        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = $1")
            .bind(id).fetch_all(&mut *tx).await?;
        for item in items.into_iter().map(OrderItem::from) {
            let (decrement, current) = match item.variant_id {
                Some(vid) => (
                    sqlx::query("UPDATE product_variants SET stock = stock - $2 WHERE id = $1 AND stock >= $2").bind(vid),
                    sqlx::query_as::<_, (i32,)>("SELECT stock FROM product_variants WHERE id = $1").bind(vid),
                ),
                None => (
                    sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2").bind(item.product_id),
                    sqlx::query_as::<_, (i32,)>("SELECT stock FROM products WHERE id = $1").bind(item.product_id),
                ),
            };
            let res = decrement.bind(item.quantity).execute(&mut *tx).await?;
            if res.rows_affected() == 0 {
                let available = current.fetch_optional(&mut *tx).await?.map_or(0, |(s,)| s);
                // Dropping `tx` rolls back the status change and earlier decrements.
                return Err(StoreError::InsufficientStock { name: item.display_name(), available });
            }
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;
        Ok(order.map_or(Confirmation::NotFound, Confirmation::Confirmed))
    }

    async fn update_order_status(
        &self, id: Uuid, status: Option<OrderStatus>, payment_status: Option<PaymentStatus>,
    ) -> StoreResult<Option<(OrderStatus, Order)>> {
        let mut tx = self.pool.begin().await?;
        let previous = sqlx::query_as::<_, (String,)>("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?;
        let Some((previous,)) = previous else { return Ok(None) };
        let previous = OrderStatus::parse(&previous)
            .ok_or_else(|| StoreError::Corrupt(format!("order {}: status {}", id, previous)))?;

        sqlx::query("UPDATE orders SET status = COALESCE($2, status), payment_status = COALESCE($3, payment_status), updated_at = NOW() WHERE id = $1")
            .bind(id).bind(status.map(|s| s.as_str())).bind(payment_status.map(|s| s.as_str()))
            .execute(&mut *tx).await?;
        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;
        Ok(order.map(|o| (previous, o)))
    }
}
