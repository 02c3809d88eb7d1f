//! Order Aggregate

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
    pub offer_id: Option<Uuid>,
    pub offer_code: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line snapshot taken when the order is placed; later catalog edits never reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i32,
    pub price: Money,
}

impl OrderItem {
    pub fn snapshot(line: &CartLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: line.product.id,
            variant_id: line.variant.as_ref().map(|v| v.id),
            product_name: line.product.name.clone(),
            variant_name: line.variant.as_ref().map(|v| v.name.clone()),
            quantity: line.item.quantity,
            price: line.unit_price,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.variant_name {
            Some(v) => format!("{} - {}", self.product_name, v),
            None => self.product_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING", Self::Processing => "PROCESSING", Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED", Self::Cancelled => "CANCELLED",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending), "PROCESSING" => Some(Self::Processing), "SHIPPED" => Some(Self::Shipped),
            "DELIVERED" => Some(Self::Delivered), "CANCELLED" => Some(Self::Cancelled), _ => None,
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Paid => "PAID", Self::Failed => "FAILED", Self::Refunded => "REFUNDED" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending), "PAID" => Some(Self::Paid), "FAILED" => Some(Self::Failed),
            "REFUNDED" => Some(Self::Refunded), _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Checkout pricing rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    /// Percent, zero in the current deployment.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::from(50),
            flat_shipping_fee: Decimal::new(599, 2),
            tax_rate: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals { pub subtotal: Money, pub discount: Money, pub tax: Money, pub shipping: Money, pub total: Money }

impl PricingPolicy {
    /// Free shipping is decided on the subtotal before any discount.
    pub fn totals(&self, subtotal: Money, discount: Money) -> OrderTotals {
        let discount = discount.clamp_to(subtotal);
        let taxable = subtotal - discount;
        let tax = taxable.percent(self.tax_rate);
        let shipping = if subtotal.amount() >= self.free_shipping_threshold { Money::ZERO } else { Money::usd(self.flat_shipping_fee) };
        OrderTotals { subtotal, discount, tax, shipping, total: taxable + tax + shipping }
    }
}

/// `ORD-<unix millis>-<9 base36 chars>`; the store rejects duplicates and the caller retries.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
    format!("ORD-{}-{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_totals_below_free_shipping() {
        let t = PricingPolicy::default().totals(Money::usd(dec!(20)), Money::ZERO);
        assert!(t.tax.is_zero());
        assert_eq!(t.shipping.amount(), dec!(5.99));
        assert_eq!(t.total.amount(), dec!(25.99));
    }

    #[test]
    fn test_totals_free_shipping_at_threshold() {
        let policy = PricingPolicy::default();
        assert!(policy.totals(Money::usd(dec!(50)), Money::ZERO).shipping.is_zero());
        assert_eq!(policy.totals(Money::usd(dec!(49.99)), Money::ZERO).total.amount(), dec!(55.98));
    }

    #[test]
    fn test_discount_subtracted_before_total() {
        let t = PricingPolicy::default().totals(Money::usd(dec!(60)), Money::usd(dec!(12.5)));
        assert_eq!(t.discount.amount(), dec!(12.50));
        assert!(t.shipping.is_zero());
        assert_eq!(t.total.amount(), dec!(47.50));
    }

    #[test]
    fn test_taxed_deployment() {
        let policy = PricingPolicy { tax_rate: dec!(21), ..Default::default() };
        let t = policy.totals(Money::usd(dec!(100)), Money::ZERO);
        assert_eq!(t.tax.amount(), dec!(21));
        assert_eq!(t.total.amount(), dec!(121));
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc::now();
        let number = generate_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!(OrderStatus::parse("SHIPPED"), Some(OrderStatus::Shipped));
        assert_eq!(PaymentStatus::Paid.as_str(), "PAID");
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
