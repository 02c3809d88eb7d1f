//! Habana Commerce
//!
//! Backend for a food e-commerce storefront.
//!
//! ## Features
//! - Product catalog with variants, combos and categories
//! - Shopping cart priced from live catalog data
//! - Checkout: pending orders confirmed on payment, with atomic stock commit
//! - Offer codes with time windows, minimum purchase and usage caps
//! - Wishlists and moderated product reviews
//! - Order notifications and a periodic low-stock scan

pub mod config;
pub mod domain;
pub mod http;
pub mod jobs;
pub mod notify;
pub mod services;
pub mod store;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EcommerceError {
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{} not found", what)) }
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::BadRequest(msg.into()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
