//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Currency, ExchangeRate, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    pub compare_price_usd: Option<Decimal>,
    pub compare_price_mns: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub is_combo: bool,
    pub combo_items: Vec<ComboItem>,
    pub variants: Vec<ProductVariant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price_usd: Option<Decimal>,
    pub price_mns: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub position: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboItem { pub product_id: Uuid, pub quantity: i32 }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Resolves a unit price from the two price columns a catalog row carries.
/// USD wins; the legacy local price is converted; missing prices count as zero.
pub fn resolve_price(price_usd: Option<Decimal>, price_mns: Option<Decimal>, rate: &ExchangeRate) -> Money {
    match (price_usd, price_mns) {
        (Some(usd), _) => rate.to_usd(usd, Currency::Usd),
        (None, Some(mns)) => rate.to_usd(mns, Currency::Mns),
        (None, None) => Money::ZERO,
    }
}

impl Product {
    pub fn variant(&self, variant_id: Uuid) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn unit_price(&self, variant: Option<&ProductVariant>, rate: &ExchangeRate) -> Money {
        match variant {
            Some(v) => v.unit_price(rate),
            None => resolve_price(self.price_usd, self.price_mns, rate),
        }
    }

    /// Stock that a line referencing this product (and optionally a variant) draws from.
    pub fn stock_for(&self, variant: Option<&ProductVariant>) -> i32 {
        variant.map_or(self.stock, |v| v.stock)
    }

    pub fn is_purchasable(&self, variant: Option<&ProductVariant>) -> bool {
        self.is_active && variant.map_or(true, |v| v.is_active)
    }

    /// "Product" or "Product - Variant", as shown in stock messages.
    pub fn display_name(&self, variant: Option<&ProductVariant>) -> String {
        match variant {
            Some(v) => format!("{} - {}", self.name, v.name),
            None => self.name.clone(),
        }
    }
}

impl ProductVariant {
    pub fn unit_price(&self, rate: &ExchangeRate) -> Money { resolve_price(self.price_usd, self.price_mns, rate) }
}

/// Keeps combo components that are not the combo itself, one entry per product, quantity at least 1.
pub fn normalize_combo_items(combo_id: Uuid, items: Vec<ComboItem>) -> Vec<ComboItem> {
    let mut out: Vec<ComboItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.product_id == combo_id || out.iter().any(|i| i.product_id == item.product_id) { continue; }
        out.push(ComboItem { product_id: item.product_id, quantity: item.quantity.max(1) });
    }
    out
}

/// Lower-case, dash separated slug derived from a display name.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn product(name: &str, price_usd: Option<Decimal>, stock: i32) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(), slug: slugify(name), name: name.into(), description: String::new(), sku: None,
            category_id: None, price_usd, price_mns: None, compare_price_usd: None, compare_price_mns: None,
            stock, is_active: true, is_featured: false, is_combo: false, combo_items: vec![], variants: vec![],
            created_at: now, updated_at: now,
        }
    }

    pub(crate) fn variant(product: &Product, name: &str, price_usd: Option<Decimal>, stock: i32) -> ProductVariant {
        ProductVariant {
            id: Uuid::new_v4(), product_id: product.id, name: name.into(), sku: None,
            price_usd, price_mns: None, stock, is_active: true, position: 0,
        }
    }

    #[test]
    fn test_price_resolution() {
        let rate = ExchangeRate::default();
        let mut p = product("Café Serrano", Some(dec!(12.5)), 4);
        assert_eq!(p.unit_price(None, &rate).amount(), dec!(12.50));
        p.price_usd = None;
        p.price_mns = Some(dec!(4900));
        assert_eq!(p.unit_price(None, &rate).amount(), dec!(20.00));
        p.price_mns = None;
        assert!(p.unit_price(None, &rate).is_zero());

        let v = variant(&p, "500g", Some(dec!(7)), 2);
        assert_eq!(p.unit_price(Some(&v), &rate).amount(), dec!(7));
        assert_eq!(p.stock_for(Some(&v)), 2);
        assert_eq!(p.display_name(Some(&v)), "Café Serrano - 500g");
    }

    #[test]
    fn test_combo_items_drop_self_and_duplicates() {
        let combo = Uuid::new_v4();
        let a = Uuid::new_v4();
        let items = normalize_combo_items(combo, vec![
            ComboItem { product_id: combo, quantity: 1 },
            ComboItem { product_id: a, quantity: 0 },
            ComboItem { product_id: a, quantity: 3 },
        ]);
        assert_eq!(items, vec![ComboItem { product_id: a, quantity: 1 }]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Ron Añejo 7 Años "), "ron-añejo-7-años");
        assert_eq!(slugify("Frutas & Vegetales"), "frutas-vegetales");
    }
}
