//! Cart operations. Lines are priced and checked against live catalog data on every read.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;
use crate::domain::aggregates::cart::{insufficient_stock_message, MAX_LINE_QUANTITY};
use crate::domain::aggregates::{Cart, CartItem, CartLine, CartValidation, Product, ProductVariant};
use crate::domain::value_objects::ExchangeRate;
use crate::store::{Store, StoreError};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    rate: ExchangeRate,
}

fn check_quantity(quantity: i32) -> Result<()> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(EcommerceError::bad_request(format!("Quantity must be between 1 and {}", MAX_LINE_QUANTITY)));
    }
    Ok(())
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, rate: ExchangeRate) -> Self { Self { store, rate } }

    /// Joins a stored row with its product; rows whose product is gone are skipped.
    async fn line(&self, item: CartItem) -> Result<Option<CartLine>> {
        let Some(product) = self.store.get_product(item.product_id).await? else {
            debug!(item_id = %item.id, "cart line without product skipped");
            return Ok(None);
        };
        let variant = item.variant_id.and_then(|id| product.variant(id).cloned());
        Ok(Some(CartLine::new(item, product, variant, &self.rate)))
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Cart> {
        let mut lines = Vec::new();
        for item in self.store.cart_items(user_id).await? {
            if let Some(line) = self.line(item).await? {
                lines.push(line);
            }
        }
        Ok(Cart::from_lines(lines))
    }

    /// Adds `quantity` to the (product, variant) line, creating it when absent.
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: i32,
    ) -> Result<CartLine> {
        check_quantity(quantity)?;
        let product = self.store.get_product(product_id).await?
            .ok_or_else(|| EcommerceError::not_found("Product"))?;
        if !product.is_active {
            return Err(EcommerceError::bad_request(format!("{} is not available", product.name)));
        }
        let variant = match variant_id {
            Some(id) => {
                let v = product.variant(id).cloned().ok_or_else(|| EcommerceError::not_found("Product variant"))?;
                if !v.is_active {
                    return Err(EcommerceError::bad_request(format!("{} is not available", product.display_name(Some(&v)))));
                }
                Some(v)
            }
            None => None,
        };

        // A concurrent add can create the line between our lookup and insert; retry once as a merge.
        for _ in 0..2 {
            let existing = self.store.find_cart_line(user_id, product_id, variant_id).await?;
            let wanted = existing.as_ref().map_or(0, |i| i.quantity).checked_add(quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| EcommerceError::bad_request(format!("A cart line cannot hold more than {} units", MAX_LINE_QUANTITY)))?;
            self.check_stock(&product, variant.as_ref(), wanted)?;

            match existing {
                Some(item) => {
                    let item = self.store.set_cart_quantity(item.id, wanted).await?
                        .ok_or_else(|| EcommerceError::not_found("Cart item"))?;
                    return Ok(CartLine::new(item, product, variant, &self.rate));
                }
                None => {
                    let item = CartItem {
                        id: Uuid::now_v7(), user_id, product_id, variant_id, quantity, created_at: Utc::now(),
                    };
                    match self.store.insert_cart_item(&item).await {
                        Ok(()) => return Ok(CartLine::new(item, product, variant, &self.rate)),
                        Err(StoreError::Conflict(_)) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Err(EcommerceError::Conflict("Cart line was modified concurrently".into()))
    }

    fn check_stock(&self, product: &Product, variant: Option<&ProductVariant>, wanted: i32) -> Result<()> {
        let available = product.stock_for(variant);
        if wanted > available {
            return Err(EcommerceError::bad_request(insufficient_stock_message(&product.display_name(variant), available)));
        }
        Ok(())
    }

    /// Sets a line's quantity. Stock is only checked when the quantity grows, but a
    /// line whose product or variant was deactivated cannot be changed at all.
    #[instrument(skip(self))]
    pub async fn update_cart_item(&self, user_id: Uuid, item_id: Uuid, quantity: i32) -> Result<CartLine> {
        check_quantity(quantity)?;
        let item = self.store.get_cart_item(user_id, item_id).await?
            .ok_or_else(|| EcommerceError::not_found("Cart item"))?;
        let line = self.line(item).await?.ok_or_else(|| EcommerceError::not_found("Product"))?;

        let variant_missing = line.item.variant_id.is_some() && line.variant.is_none();
        if variant_missing || !line.is_purchasable() {
            return Err(EcommerceError::bad_request(insufficient_stock_message(&line.display_name(), 0)));
        }
        if quantity > line.item.quantity {
            self.check_stock(&line.product, line.variant.as_ref(), quantity)?;
        }

        let item = self.store.set_cart_quantity(item_id, quantity).await?
            .ok_or_else(|| EcommerceError::not_found("Cart item"))?;
        Ok(CartLine::new(item, line.product, line.variant, &self.rate))
    }

    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        if !self.store.delete_cart_item(user_id, item_id).await? {
            return Err(EcommerceError::not_found("Cart item"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64> {
        Ok(self.store.clear_cart(user_id).await?)
    }

    pub async fn validate_cart(&self, user_id: Uuid) -> Result<CartValidation> {
        Ok(self.get_cart(user_id).await?.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{product, variant};
    use crate::store::memory::MemoryStore;
    use crate::store::{CartStore, CatalogStore};
    use rust_decimal_macros::dec;

    async fn setup(stock: i32) -> (CartService, Arc<MemoryStore>, Product) {
        let store = Arc::new(MemoryStore::new());
        let p = product("Arroz", Some(dec!(3.50)), stock);
        store.insert_product(&p).await.unwrap();
        (CartService::new(store.clone(), ExchangeRate::default()), store, p)
    }

    #[tokio::test]
    async fn test_add_merges_same_line() {
        let (svc, _, p) = setup(10).await;
        let user = Uuid::new_v4();
        svc.add_to_cart(user, p.id, None, 2).await.unwrap();
        let line = svc.add_to_cart(user, p.id, None, 3).await.unwrap();
        assert_eq!(line.item.quantity, 5);

        let cart = svc.get_cart(user).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.subtotal.amount(), dec!(17.50));
    }

    #[tokio::test]
    async fn test_add_rejects_over_stock_and_keeps_line() {
        let (svc, _, p) = setup(4).await;
        let user = Uuid::new_v4();
        svc.add_to_cart(user, p.id, None, 3).await.unwrap();

        let err = svc.add_to_cart(user, p.id, None, 2).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for Arroz. Available: 4");
        assert_eq!(svc.get_cart(user).await.unwrap().items[0].item.quantity, 3);
    }

    #[tokio::test]
    async fn test_add_variant_must_belong_to_product() {
        let (svc, store, p) = setup(4).await;
        let other = product("Frijoles", Some(dec!(2)), 4);
        let v = variant(&other, "1kg", Some(dec!(4)), 2);
        store.insert_product(&other).await.unwrap();
        store.insert_variant(&v).await.unwrap();

        let err = svc.add_to_cart(Uuid::new_v4(), p.id, Some(v.id), 1).await.unwrap_err();
        assert!(matches!(err, EcommerceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_checks_stock_only_on_increase() {
        let (svc, store, p) = setup(5).await;
        let user = Uuid::new_v4();
        let line = svc.add_to_cart(user, p.id, None, 5).await.unwrap();

        let patch = crate::store::ProductPatch { stock: Some(2), ..Default::default() };
        store.update_product(p.id, &patch).await.unwrap();

        assert_eq!(svc.update_cart_item(user, line.item.id, 4).await.unwrap().item.quantity, 4);
        let err = svc.update_cart_item(user, line.item.id, 6).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for Arroz. Available: 2");
    }

    #[tokio::test]
    async fn test_update_rejects_inactive_product() {
        let (svc, store, p) = setup(5).await;
        let user = Uuid::new_v4();
        let line = svc.add_to_cart(user, p.id, None, 2).await.unwrap();
        let patch = crate::store::ProductPatch { is_active: Some(false), ..Default::default() };
        store.update_product(p.id, &patch).await.unwrap();

        let err = svc.update_cart_item(user, line.item.id, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for Arroz. Available: 0");
    }

    #[tokio::test]
    async fn test_lines_are_private_to_their_user() {
        let (svc, _, p) = setup(5).await;
        let line = svc.add_to_cart(Uuid::new_v4(), p.id, None, 1).await.unwrap();
        let stranger = Uuid::new_v4();
        assert!(matches!(svc.update_cart_item(stranger, line.item.id, 2).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(svc.remove_from_cart(stranger, line.item.id).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_merge_cannot_overflow_line_quantity() {
        let (svc, store, p) = setup(5).await;
        let user = Uuid::new_v4();
        svc.add_to_cart(user, p.id, None, 1).await.unwrap();

        let err = svc.add_to_cart(user, p.id, None, i32::MAX).await.unwrap_err();
        assert!(matches!(err, EcommerceError::BadRequest(_)));
        let patch = crate::store::ProductPatch { stock: Some(i32::MAX), ..Default::default() };
        store.update_product(p.id, &patch).await.unwrap();
        let err = svc.add_to_cart(user, p.id, None, MAX_LINE_QUANTITY).await.unwrap_err();
        assert_eq!(err.to_string(), "A cart line cannot hold more than 10000 units");

        assert_eq!(svc.get_cart(user).await.unwrap().items[0].item.quantity, 1);
        assert!(svc.update_cart_item(user, svc.get_cart(user).await.unwrap().items[0].item.id, 0).await.is_err());
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, i32::MAX);
    }

    #[tokio::test]
    async fn test_store_rejects_non_positive_quantity() {
        let (_, store, p) = setup(5).await;
        let item = CartItem {
            id: Uuid::new_v4(), user_id: Uuid::new_v4(), product_id: p.id, variant_id: None, quantity: -3, created_at: Utc::now(),
        };
        assert!(matches!(store.insert_cart_item(&item).await, Err(StoreError::InvalidQuantity(-3))));
        let item = CartItem { quantity: 2, ..item };
        store.insert_cart_item(&item).await.unwrap();
        assert!(matches!(store.set_cart_quantity(item.id, 0).await, Err(StoreError::InvalidQuantity(0))));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (svc, _, p) = setup(5).await;
        let user = Uuid::new_v4();
        svc.add_to_cart(user, p.id, None, 1).await.unwrap();
        assert_eq!(svc.clear_cart(user).await.unwrap(), 1);
        assert_eq!(svc.clear_cart(user).await.unwrap(), 0);
    }
}
