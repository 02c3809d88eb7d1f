//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::product::{Product, ProductVariant};
use crate::domain::value_objects::{ExchangeRate, Money};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// Persisted cart row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// A cart row joined with the live product and variant it points at.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
    pub variant: Option<ProductVariant>,
    pub unit_price: Money,
    pub line_total: Money,
}

impl CartLine {
    pub fn new(item: CartItem, product: Product, variant: Option<ProductVariant>, rate: &ExchangeRate) -> Self {
        let unit_price = product.unit_price(variant.as_ref(), rate);
        let line_total = unit_price.multiply(item.quantity.max(0) as u32);
        Self { item, product, variant, unit_price, line_total }
    }

    pub fn available_stock(&self) -> i32 { self.product.stock_for(self.variant.as_ref()) }
    pub fn is_purchasable(&self) -> bool { self.product.is_purchasable(self.variant.as_ref()) }
    pub fn display_name(&self) -> String { self.product.display_name(self.variant.as_ref()) }

    pub fn status(&self) -> LineStatus {
        let available = self.available_stock();
        if !self.is_purchasable() { LineStatus::Unavailable }
        else if available <= 0 { LineStatus::OutOfStock }
        else if available < self.item.quantity { LineStatus::InsufficientStock }
        else { LineStatus::Valid }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub subtotal: Money,
    /// Same as the subtotal; tax and shipping are priced at checkout.
    pub total: Money,
}

impl Cart {
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let subtotal = items.iter().map(|l| l.line_total).sum();
        Self { items, subtotal, total: subtotal }
    }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn validate(&self) -> CartValidation {
        let items: Vec<LineReport> = self.items.iter().map(|line| {
            let status = line.status();
            let available = if line.is_purchasable() { line.available_stock().max(0) } else { 0 };
            let message = match status {
                LineStatus::Valid => None,
                LineStatus::Unavailable => Some(format!("{} is no longer available", line.display_name())),
                LineStatus::OutOfStock => Some(format!("{} is out of stock", line.display_name())),
                LineStatus::InsufficientStock => Some(insufficient_stock_message(&line.display_name(), available)),
            };
            LineReport { item_id: line.item.id, status, requested: line.item.quantity, available, message }
        }).collect();
        CartValidation { valid: items.iter().all(|r| r.status == LineStatus::Valid), items }
    }
}

/// Message shape shared by every stock rejection in the cart and checkout paths.
pub fn insufficient_stock_message(name: &str, available: i32) -> String {
    format!("Insufficient stock for {}. Available: {}", name, available.max(0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus { Valid, OutOfStock, InsufficientStock, Unavailable }

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReport {
    pub item_id: Uuid,
    pub status: LineStatus,
    pub requested: i32,
    pub available: i32,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartValidation { pub valid: bool, pub items: Vec<LineReport> }
