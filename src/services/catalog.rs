//! Catalog reads for the storefront and writes for administrators.

use std::sync::Arc;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::product::{normalize_combo_items, slugify};
use crate::domain::aggregates::{Category, ComboItem, Product, ProductVariant};
use crate::services::Paginated;
use crate::store::{CategoryPatch, CategoryRemoval, ProductFilter, ProductPatch, Store, StoreError, VariantPatch};
use crate::{EcommerceError, Result};

/// Holding category for products whose category was removed; never shown on the storefront.
pub const UNCATEGORIZED_SLUG: &str = "sin-categoria";
const UNCATEGORIZED_NAME: &str = "Sin categoría";

fn default_true() -> bool { true }

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    pub compare_price_usd: Option<Decimal>,
    pub compare_price_mns: Option<Decimal>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_combo: bool,
    #[serde(default)]
    pub combo_items: Vec<ComboItem>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantDraft {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub sku: Option<String>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub position: i32,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDraft {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub position: i32,
}

/// How `remove_category` treats the category's products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode { DeleteWithProducts, MoveProductsToUncategorized }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRemoved {
    pub deleted_products: u64,
    pub moved_products: u64,
    pub moved_to_category_id: Option<Uuid>,
}

fn non_negative(values: &[Option<Decimal>]) -> Result<()> {
    if values.iter().flatten().any(|v| v.is_sign_negative()) {
        return Err(EcommerceError::bad_request("Prices cannot be negative"));
    }
    Ok(())
}

fn slug_for(slug: Option<&str>, name: &str) -> Result<String> {
    let slug = slugify(slug.unwrap_or(name));
    if slug.is_empty() {
        return Err(EcommerceError::bad_request("Slug cannot be empty"));
    }
    Ok(slug)
}

#[derive(Clone)]
pub struct CatalogService { store: Arc<dyn Store> }

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn list_products(&self, filter: ProductFilter) -> Result<Paginated<Product>> {
        let (products, total) = self.store.list_products(&filter).await?;
        Ok(Paginated::new(products, total, filter.page, filter.per_page))
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.store.get_product(id).await?.ok_or_else(|| EcommerceError::not_found("Product"))
    }

    pub async fn get_product_by_slug(&self, slug: &str) -> Result<Product> {
        self.store.get_product_by_slug(slug).await?.ok_or_else(|| EcommerceError::not_found("Product"))
    }

    async fn check_components(&self, combo_id: Uuid, items: &[ComboItem]) -> Result<()> {
        for item in items.iter().filter(|i| i.product_id != combo_id) {
            if self.store.get_product(item.product_id).await?.is_none() {
                return Err(EcommerceError::NotFound(format!("Combo component {} not found", item.product_id)));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        non_negative(&[draft.price_usd, draft.price_mns, draft.compare_price_usd, draft.compare_price_mns])?;

        let id = Uuid::now_v7();
        let combo_items = if draft.is_combo { normalize_combo_items(id, draft.combo_items) } else { vec![] };
        self.check_components(id, &combo_items).await?;

        let now = Utc::now();
        let product = Product {
            id,
            slug: slug_for(draft.slug.as_deref(), &draft.name)?,
            name: draft.name.trim().to_string(),
            description: draft.description,
            sku: draft.sku,
            category_id: draft.category_id,
            price_usd: draft.price_usd,
            price_mns: draft.price_mns,
            compare_price_usd: draft.compare_price_usd,
            compare_price_mns: draft.compare_price_mns,
            stock: draft.stock,
            is_active: draft.is_active,
            is_featured: draft.is_featured,
            is_combo: draft.is_combo,
            combo_items,
            variants: vec![],
            created_at: now,
            updated_at: now,
        };
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, slug = %product.slug, "product created");
        Ok(product)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_product(&self, id: Uuid, mut patch: ProductPatch) -> Result<Product> {
        if patch.stock.is_some_and(|s| s < 0) {
            return Err(EcommerceError::bad_request("Stock cannot be negative"));
        }
        non_negative(&[patch.price_usd, patch.price_mns, patch.compare_price_usd, patch.compare_price_mns])?;
        if let Some(slug) = patch.slug.take() {
            patch.slug = Some(slug_for(Some(slug.as_str()), &slug)?);
        }
        if let Some(items) = &patch.combo_items {
            self.check_components(id, items).await?;
        }
        self.store.update_product(id, &patch).await?.ok_or_else(|| EcommerceError::not_found("Product"))
    }

    #[instrument(skip(self, draft))]
    pub async fn add_variant(&self, product_id: Uuid, draft: VariantDraft) -> Result<ProductVariant> {
        draft.validate()?;
        non_negative(&[draft.price_usd, draft.price_mns])?;
        self.get_product(product_id).await?;

        let variant = ProductVariant {
            id: Uuid::now_v7(),
            product_id,
            name: draft.name.trim().to_string(),
            sku: draft.sku,
            price_usd: draft.price_usd,
            price_mns: draft.price_mns,
            stock: draft.stock,
            is_active: draft.is_active,
            position: draft.position,
        };
        self.store.insert_variant(&variant).await?;
        Ok(variant)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_variant(&self, id: Uuid, patch: VariantPatch) -> Result<ProductVariant> {
        if patch.stock.is_some_and(|s| s < 0) {
            return Err(EcommerceError::bad_request("Stock cannot be negative"));
        }
        non_negative(&[patch.price_usd, patch.price_mns])?;
        self.store.update_variant(id, &patch).await?.ok_or_else(|| EcommerceError::not_found("Product variant"))
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_product(id).await? {
            return Err(EcommerceError::not_found("Product"));
        }
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category> {
        draft.validate()?;
        let category = Category {
            id: Uuid::now_v7(),
            slug: slug_for(draft.slug.as_deref(), &draft.name)?,
            name: draft.name.trim().to_string(),
            description: draft.description,
            is_active: true,
            position: draft.position,
            created_at: Utc::now(),
        };
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.store.get_category(id).await?.ok_or_else(|| EcommerceError::not_found("Category"))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_category(&self, id: Uuid, mut patch: CategoryPatch) -> Result<Category> {
        if let Some(slug) = patch.slug.take() {
            patch.slug = Some(slug_for(Some(slug.as_str()), &slug)?);
        }
        self.store.update_category(id, &patch).await?.ok_or_else(|| EcommerceError::not_found("Category"))
    }

    /// The holding category, created inactive on first use.
    async fn uncategorized(&self) -> Result<Category> {
        if let Some(c) = self.store.get_category_by_slug(UNCATEGORIZED_SLUG).await? {
            return Ok(c);
        }
        let category = Category {
            id: Uuid::now_v7(),
            name: UNCATEGORIZED_NAME.into(),
            slug: UNCATEGORIZED_SLUG.into(),
            description: Some("Products without a category; not published".into()),
            is_active: false,
            position: 9999,
            created_at: Utc::now(),
        };
        match self.store.insert_category(&category).await {
            Ok(()) => Ok(category),
            // Lost a creation race; the winner's row is the one to use.
            Err(StoreError::Conflict(_)) => self.store.get_category_by_slug(UNCATEGORIZED_SLUG).await?
                .ok_or_else(|| EcommerceError::not_found("Category")),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_category(&self, id: Uuid, mode: RemovalMode) -> Result<CategoryRemoved> {
        let category = self.get_category(id).await?;
        if category.slug == UNCATEGORIZED_SLUG {
            return Err(EcommerceError::bad_request("The uncategorized category cannot be deleted"));
        }
        let (removal, target) = match mode {
            RemovalMode::DeleteWithProducts => (CategoryRemoval::DeleteProducts, None),
            RemovalMode::MoveProductsToUncategorized => {
                let holding = self.uncategorized().await?;
                (CategoryRemoval::MoveProductsTo(holding.id), Some(holding.id))
            }
        };
        let affected = self.store.remove_category(id, removal).await?
            .ok_or_else(|| EcommerceError::not_found("Category"))?;
        info!(category_id = %id, affected, ?mode, "category removed");
        Ok(match target {
            None => CategoryRemoved { deleted_products: affected, moved_products: 0, moved_to_category_id: None },
            Some(to) => CategoryRemoved { deleted_products: 0, moved_products: affected, moved_to_category_id: Some(to) },
        })
    }

    /// Moves products into a category; returns how many moved.
    #[instrument(skip(self, product_ids))]
    pub async fn assign_products(&self, category_id: Uuid, product_ids: &[Uuid]) -> Result<u64> {
        self.get_category(category_id).await?;
        if product_ids.is_empty() {
            return Ok(0);
        }
        let holding = self.uncategorized().await?;
        Ok(self.store.assign_products(category_id, product_ids, holding.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;

    fn draft(name: &str) -> ProductDraft {
        ProductDraft {
            name: name.into(), slug: None, description: String::new(), sku: None, category_id: None,
            price_usd: Some(dec!(4)), price_mns: None, compare_price_usd: None, compare_price_mns: None,
            stock: 3, is_active: true, is_featured: false, is_combo: false, combo_items: vec![],
        }
    }

    fn service() -> CatalogService { CatalogService::new(Arc::new(MemoryStore::new())) }

    #[tokio::test]
    async fn test_create_derives_slug_and_rejects_duplicates() {
        let svc = service();
        let p = svc.create_product(draft("Café Cubano 250g")).await.unwrap();
        assert_eq!(p.slug, "café-cubano-250g");
        assert_eq!(svc.get_product_by_slug(&p.slug).await.unwrap().id, p.id);

        let err = svc.create_product(draft("Café Cubano 250g")).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_combo_items_normalized_and_cleared() {
        let svc = service();
        let a = svc.create_product(draft("Arroz")).await.unwrap();
        let mut combo = draft("Combo");
        combo.is_combo = true;
        combo.combo_items = vec![ComboItem { product_id: a.id, quantity: 2 }, ComboItem { product_id: a.id, quantity: 1 }];
        let combo = svc.create_product(combo).await.unwrap();
        assert_eq!(combo.combo_items, vec![ComboItem { product_id: a.id, quantity: 2 }]);

        let patch = ProductPatch { is_combo: Some(false), ..Default::default() };
        assert!(svc.update_product(combo.id, patch).await.unwrap().combo_items.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_combo_component() {
        let mut combo = draft("Combo");
        combo.is_combo = true;
        combo.combo_items = vec![ComboItem { product_id: Uuid::new_v4(), quantity: 1 }];
        assert!(matches!(service().create_product(combo).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_variants() {
        let svc = service();
        let p = svc.create_product(draft("Frijoles")).await.unwrap();
        let v = svc.add_variant(p.id, VariantDraft {
            name: "1kg".into(), sku: None, price_usd: Some(dec!(6)), price_mns: None, stock: 2, is_active: true, position: 0,
        }).await.unwrap();
        assert_eq!(svc.get_product(p.id).await.unwrap().variants.len(), 1);

        let patch = VariantPatch { stock: Some(-1), ..Default::default() };
        assert!(svc.update_variant(v.id, patch).await.is_err());
        let patch = VariantPatch { stock: Some(9), ..Default::default() };
        assert_eq!(svc.update_variant(v.id, patch).await.unwrap().stock, 9);
    }

    fn category(name: &str) -> CategoryDraft {
        CategoryDraft { name: name.into(), slug: None, description: None, position: 0 }
    }

    #[tokio::test]
    async fn test_remove_category_moves_products_to_holding_category() {
        let svc = service();
        let drinks = svc.create_category(category("Bebidas")).await.unwrap();
        let mut d = draft("Malta");
        d.category_id = Some(drinks.id);
        let malta = svc.create_product(d).await.unwrap();

        let removed = svc.remove_category(drinks.id, RemovalMode::MoveProductsToUncategorized).await.unwrap();
        assert_eq!(removed.moved_products, 1);
        let malta = svc.get_product(malta.id).await.unwrap();
        assert_eq!(malta.category_id, removed.moved_to_category_id);
        assert!(!malta.is_active);

        let holding = svc.get_category(malta.category_id.unwrap()).await.unwrap();
        assert_eq!(holding.slug, UNCATEGORIZED_SLUG);
        assert!(matches!(
            svc.remove_category(holding.id, RemovalMode::DeleteWithProducts).await,
            Err(EcommerceError::BadRequest(_))
        ));

        // Leaving the holding category reactivates the product.
        let snacks = svc.create_category(category("Snacks")).await.unwrap();
        assert_eq!(svc.assign_products(snacks.id, &[malta.id]).await.unwrap(), 1);
        let malta = svc.get_product(malta.id).await.unwrap();
        assert_eq!(malta.category_id, Some(snacks.id));
        assert!(malta.is_active);
    }

    #[tokio::test]
    async fn test_remove_category_with_products_and_delete_product() {
        let svc = service();
        let cat = svc.create_category(category("Granos")).await.unwrap();
        let mut d = draft("Lentejas");
        d.category_id = Some(cat.id);
        let lentejas = svc.create_product(d).await.unwrap();
        let arroz = svc.create_product(draft("Arroz")).await.unwrap();

        let removed = svc.remove_category(cat.id, RemovalMode::DeleteWithProducts).await.unwrap();
        assert_eq!(removed.deleted_products, 1);
        assert!(matches!(svc.get_product(lentejas.id).await, Err(EcommerceError::NotFound(_))));
        assert!(svc.list_categories().await.unwrap().is_empty());

        svc.delete_product(arroz.id).await.unwrap();
        assert!(matches!(svc.delete_product(arroz.id).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_category_reslugs() {
        let svc = service();
        let cat = svc.create_category(category("Carnes")).await.unwrap();
        let patch = CategoryPatch { slug: Some("Carnes Frías".into()), ..Default::default() };
        assert_eq!(svc.update_category(cat.id, patch).await.unwrap().slug, "carnes-frías");
    }

    #[tokio::test]
    async fn test_negative_stock_rejected() {
        let mut d = draft("Malanga");
        d.stock = -1;
        assert!(matches!(service().create_product(d).await, Err(EcommerceError::Validation(_))));
    }
}
