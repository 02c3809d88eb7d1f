//! Aggregates module
pub mod product;
pub mod cart;
pub mod offer;
pub mod order;
pub mod review;
pub mod wishlist;

pub use product::{Category, ComboItem, Product, ProductVariant};
pub use cart::{Cart, CartItem, CartLine, CartValidation, LineStatus};
pub use offer::{Offer, OfferKind, OfferRejection, OfferValidation};
pub use order::{Address, Order, OrderItem, OrderStatus, OrderTotals, PaymentStatus, PricingPolicy};
pub use review::{Review, ReviewSettings};
pub use wishlist::{Wishlist, WishlistEntry, WishlistItem};
