//! Application services: the operations behind the HTTP routes.

pub mod cart;
pub mod catalog;
pub mod offers;
pub mod orders;
pub mod reviews;
pub mod wishlist;

use std::sync::Arc;
use serde::Serialize;
use uuid::Uuid;
use crate::config::Config;
use crate::notify::Notifier;
use crate::store::Store;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use offers::OfferService;
pub use orders::OrderService;
pub use reviews::ReviewService;
pub use wishlist::WishlistService;

/// The authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl Actor {
    pub fn customer(user_id: Uuid) -> Self { Self { user_id, email: None, is_admin: false } }

    pub fn can_see(&self, owner: Uuid) -> bool { self.is_admin || self.user_id == owner }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        let per = per_page.max(1) as i64;
        Self { data, total, page, per_page, total_pages: (total + per - 1) / per }
    }
}

/// Page and page size from query parameters: page ≥ 1, size in 1..=100, default 20.
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    (page.unwrap_or(1).max(1), per_page.unwrap_or(20).clamp(1, 100))
}

/// Every service wired to one store.
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub offers: OfferService,
    pub orders: OrderService,
    pub wishlist: WishlistService,
    pub reviews: ReviewService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let carts = CartService::new(store.clone(), config.exchange_rate);
        let offers = OfferService::new(store.clone());
        let orders = OrderService::new(store.clone(), carts.clone(), offers.clone(), config.pricing, notifier);
        Self {
            catalog: CatalogService::new(store.clone()),
            carts,
            offers,
            orders,
            wishlist: WishlistService::new(store.clone()),
            reviews: ReviewService::new(store),
        }
    }
}
