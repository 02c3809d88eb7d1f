//! Saved products per user.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Wishlist, WishlistEntry, WishlistItem};
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct WishlistService { store: Arc<dyn Store> }

impl WishlistService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn get_wishlist(&self, user_id: Uuid) -> Result<Wishlist> {
        let mut items = Vec::new();
        for item in self.store.wishlist_items(user_id).await? {
            match self.store.get_product(item.product_id).await? {
                Some(product) => items.push(WishlistEntry { item, product }),
                None => debug!(item_id = %item.id, "wishlist entry without product skipped"),
            }
        }
        Ok(Wishlist { items })
    }

    /// Saving an already saved product returns the existing entry.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistEntry> {
        let product = self.store.get_product(product_id).await?
            .ok_or_else(|| EcommerceError::not_found("Product"))?;
        let item = WishlistItem { id: Uuid::now_v7(), user_id, product_id, created_at: Utc::now() };
        let item = self.store.add_wishlist_item(&item).await?;
        Ok(WishlistEntry { item, product })
    }

    /// Removing a product that is not saved is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        self.store.remove_wishlist_item(user_id, product_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::product;
    use crate::store::memory::MemoryStore;
    use crate::store::CatalogStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_add_is_idempotent_and_remove_tolerates_missing() {
        let store = Arc::new(MemoryStore::new());
        let p = product("Guayaba", Some(dec!(2)), 5);
        store.insert_product(&p).await.unwrap();
        let svc = WishlistService::new(store.clone());
        let user = Uuid::new_v4();

        let first = svc.add(user, p.id).await.unwrap();
        let again = svc.add(user, p.id).await.unwrap();
        assert_eq!(first.item.id, again.item.id);
        assert_eq!(svc.get_wishlist(user).await.unwrap().items.len(), 1);
        assert!(svc.get_wishlist(Uuid::new_v4()).await.unwrap().items.is_empty());

        svc.remove(user, p.id).await.unwrap();
        svc.remove(user, p.id).await.unwrap();
        assert!(svc.get_wishlist(user).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_product_and_deleted_product() {
        let store = Arc::new(MemoryStore::new());
        let svc = WishlistService::new(store.clone());
        let user = Uuid::new_v4();
        assert!(matches!(svc.add(user, Uuid::new_v4()).await, Err(EcommerceError::NotFound(_))));

        let p = product("Mango", Some(dec!(1)), 5);
        store.insert_product(&p).await.unwrap();
        svc.add(user, p.id).await.unwrap();
        store.delete_product(p.id).await.unwrap();
        assert!(svc.get_wishlist(user).await.unwrap().items.is_empty());
    }
}
