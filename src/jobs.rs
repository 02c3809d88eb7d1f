//! Background jobs.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use crate::domain::events::{DomainEvent, InventoryEvent, LowStockProduct};
use crate::notify::{dispatch, Notifier};
use crate::store::Store;
use crate::Result;

/// One scan: active products at or below `threshold`, each with its low variants.
/// Returns how many products were reported.
pub async fn scan_low_stock(
    store: &dyn Store, notifier: Arc<dyn Notifier>, threshold: i32, admin_email: Option<&str>,
) -> Result<usize> {
    let Some(admin_email) = admin_email else {
        warn!("ADMIN_EMAIL not set, skipping low stock scan");
        return Ok(0);
    };

    let products: Vec<LowStockProduct> = store.low_stock_products(threshold).await?
        .into_iter()
        .map(|p| LowStockProduct {
            product_id: p.id,
            low_variants: p.variants.iter()
                .filter(|v| v.is_active && v.stock <= threshold)
                .map(|v| (v.name.clone(), v.stock))
                .collect(),
            name: p.name,
            sku: p.sku,
            stock: p.stock,
        })
        .collect();

    if products.is_empty() {
        info!(threshold, "no low stock products");
        return Ok(0);
    }
    let count = products.len();
    info!(threshold, count, "low stock products found");
    dispatch(notifier, DomainEvent::Inventory(InventoryEvent::LowStock {
        admin_email: admin_email.to_string(),
        threshold,
        products,
    }));
    Ok(count)
}

/// Runs [`scan_low_stock`] every `period`, starting one period after boot.
pub fn spawn_low_stock_scan(
    store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, threshold: i32, admin_email: Option<String>, period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = scan_low_stock(store.as_ref(), notifier.clone(), threshold, admin_email.as_deref()).await {
                error!(error = %e, "low stock scan failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{product, variant};
    use crate::notify::tests::ChannelNotifier;
    use crate::store::memory::MemoryStore;
    use crate::store::CatalogStore;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_scan_reports_low_products_and_variants() {
        let store = MemoryStore::new();
        let low = product("Aceite", Some(dec!(3)), 2);
        let ok = product("Azúcar", Some(dec!(2)), 50);
        let mut inactive = product("Viejo", Some(dec!(1)), 0);
        inactive.is_active = false;
        for p in [&low, &ok, &inactive] { store.insert_product(p).await.unwrap(); }
        store.insert_variant(&variant(&low, "1L", Some(dec!(3)), 1)).await.unwrap();
        store.insert_variant(&variant(&low, "5L", Some(dec!(12)), 30)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let count = scan_low_stock(&store, Arc::new(ChannelNotifier(tx)), 10, Some("admin@example.com")).await.unwrap();
        assert_eq!(count, 1);

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let DomainEvent::Inventory(InventoryEvent::LowStock { products, admin_email, .. }) = event else {
            panic!("unexpected event");
        };
        assert_eq!(admin_email, "admin@example.com");
        assert_eq!(products[0].name, "Aceite");
        assert_eq!(products[0].low_variants, vec![("1L".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_scan_skipped_without_admin_email() {
        let store = MemoryStore::new();
        store.insert_product(&product("Aceite", Some(dec!(3)), 2)).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(scan_low_stock(&store, Arc::new(ChannelNotifier(tx)), 10, None).await.unwrap(), 0);
    }
}
