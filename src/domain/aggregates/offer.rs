//! Offer (coupon) aggregate and its evaluator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::{Money, OfferCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferKind { Percentage, Fixed }

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "PERCENTAGE", Self::Fixed => "FIXED" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s { "PERCENTAGE" => Some(Self::Percentage), "FIXED" => Some(Self::Fixed), _ => None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub name: String,
    pub code: OfferCode,
    #[serde(rename = "type")]
    pub kind: OfferKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a code cannot be applied to a given subtotal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OfferRejection {
    NotFound,
    Inactive,
    NotStarted,
    Expired,
    BelowMinimum(Decimal),
    UsageLimitReached,
}

impl fmt::Display for OfferRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Offer code not found"),
            Self::Inactive => write!(f, "This offer is not active"),
            Self::NotStarted => write!(f, "This offer is not available yet"),
            Self::Expired => write!(f, "This offer has expired"),
            Self::BelowMinimum(min) => write!(f, "This offer requires a minimum purchase of ${}", Money::usd(*min)),
            Self::UsageLimitReached => write!(f, "This offer has reached its usage limit"),
        }
    }
}

impl Offer {
    pub fn has_uses_left(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.usage_count < limit)
    }

    /// Checks the offer against `subtotal` at instant `now` and returns the discount it grants.
    pub fn evaluate(&self, subtotal: Money, now: DateTime<Utc>) -> Result<Money, OfferRejection> {
        if !self.is_active { return Err(OfferRejection::Inactive); }
        if now < self.start_date { return Err(OfferRejection::NotStarted); }
        if now > self.end_date { return Err(OfferRejection::Expired); }
        if let Some(min) = self.min_purchase {
            if subtotal.amount() < min { return Err(OfferRejection::BelowMinimum(min)); }
        }
        if !self.has_uses_left() { return Err(OfferRejection::UsageLimitReached); }
        Ok(self.discount_for(subtotal))
    }

    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.kind {
            OfferKind::Percentage => subtotal.percent(self.value),
            OfferKind::Fixed => Money::usd(self.value),
        };
        raw.clamp_to(subtotal)
    }

    pub fn summary(&self) -> OfferSummary {
        OfferSummary { id: self.id, name: self.name.clone(), code: self.code.clone(), kind: self.kind, value: self.value }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSummary {
    pub id: Uuid,
    pub name: String,
    pub code: OfferCode,
    #[serde(rename = "type")]
    pub kind: OfferKind,
    pub value: Decimal,
}

/// Result of `POST /offers/validate`; never an error so checkout can show the reason.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferValidation {
    pub valid: bool,
    pub discount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<OfferSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OfferValidation {
    pub fn accepted(offer: &Offer, discount: Money) -> Self {
        Self { valid: true, discount, offer: Some(offer.summary()), message: None }
    }
    pub fn rejected(reason: &OfferRejection) -> Self {
        Self { valid: false, discount: Money::ZERO, offer: None, message: Some(reason.to_string()) }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn offer(code: &str, kind: OfferKind, value: Decimal) -> Offer {
        let now = Utc::now();
        Offer {
            id: Uuid::new_v4(), name: format!("{} promo", code), code: OfferCode::new(code).unwrap(), kind, value,
            min_purchase: None, usage_limit: None, usage_count: 0,
            start_date: now - Duration::days(1), end_date: now + Duration::days(1), is_active: true,
            created_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_percentage_and_fixed_discounts() {
        let now = Utc::now();
        let pct = offer("PCT10", OfferKind::Percentage, dec!(10));
        assert_eq!(pct.evaluate(Money::usd(dec!(45.50)), now).unwrap().amount(), dec!(4.55));
        let fixed = offer("FIVE", OfferKind::Fixed, dec!(5));
        assert_eq!(fixed.evaluate(Money::usd(dec!(20)), now).unwrap().amount(), dec!(5));
        assert_eq!(fixed.evaluate(Money::usd(dec!(3.2)), now).unwrap().amount(), dec!(3.20));
    }

    #[test]
    fn test_time_window() {
        let o = offer("WINDOW", OfferKind::Fixed, dec!(1));
        let subtotal = Money::usd(dec!(10));
        assert_eq!(o.evaluate(subtotal, o.start_date - Duration::seconds(1)), Err(OfferRejection::NotStarted));
        assert_eq!(o.evaluate(subtotal, o.end_date + Duration::seconds(1)), Err(OfferRejection::Expired));
        assert!(o.evaluate(subtotal, o.end_date).is_ok());
        assert_eq!(OfferRejection::Expired.to_string(), "This offer has expired");
    }

    #[test]
    fn test_usage_limit_and_minimum() {
        let now = Utc::now();
        let mut o = offer("LIMITED", OfferKind::Percentage, dec!(20));
        o.usage_limit = Some(3);
        o.usage_count = 3;
        assert_eq!(o.evaluate(Money::usd(dec!(10)), now), Err(OfferRejection::UsageLimitReached));
        o.usage_count = 2;
        o.min_purchase = Some(dec!(30));
        let rejection = o.evaluate(Money::usd(dec!(10)), now).unwrap_err();
        assert_eq!(rejection.to_string(), "This offer requires a minimum purchase of $30.00");
        assert_eq!(o.evaluate(Money::usd(dec!(30)), now).unwrap().amount(), dec!(6));
    }

    #[test]
    fn test_inactive_wins_over_other_reasons() {
        let mut o = offer("OFF", OfferKind::Fixed, dec!(1));
        o.is_active = false;
        o.usage_limit = Some(1);
        o.usage_count = 1;
        let v = OfferValidation::rejected(&o.evaluate(Money::usd(dec!(1)), Utc::now()).unwrap_err());
        assert!(!v.valid);
        assert!(v.discount.is_zero());
        assert_eq!(v.message.as_deref(), Some("This offer is not active"));
    }
}
