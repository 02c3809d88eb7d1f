//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Offer code value object, trimmed and upper-cased
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OfferCode(String);

impl OfferCode {
    pub fn new(value: impl AsRef<str>) -> Result<Self, OfferCodeError> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { return Err(OfferCodeError::Empty); }
        if value.chars().count() > 50 { return Err(OfferCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OfferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for OfferCode {
    type Error = OfferCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<OfferCode> for String {
    fn from(code: OfferCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OfferCodeError { Empty, TooLong }
impl std::error::Error for OfferCodeError {}
impl fmt::Display for OfferCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Code is required"), Self::TooLong => write!(f, "Code too long") }
    }
}

/// Currencies a catalog price can be entered in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency { Usd, Mns }

/// Fixed conversion rate from the legacy local currency into USD
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeRate { mns_per_usd: Decimal }

impl ExchangeRate {
    pub const DEFAULT_MNS_PER_USD: Decimal = Decimal::from_parts(245, 0, 0, false, 0);

    pub fn new(mns_per_usd: Decimal) -> Option<Self> {
        (mns_per_usd > Decimal::ZERO).then_some(Self { mns_per_usd })
    }
    pub fn mns_per_usd(&self) -> Decimal { self.mns_per_usd }

    pub fn to_usd(&self, amount: Decimal, currency: Currency) -> Money {
        match currency {
            Currency::Usd => Money::usd(amount),
            Currency::Mns => Money::usd(amount / self.mns_per_usd),
        }
    }
}

impl Default for ExchangeRate {
    fn default() -> Self { Self { mns_per_usd: Self::DEFAULT_MNS_PER_USD } }
}

/// USD amount kept at cent precision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Rounds to cents, half away from zero.
    pub fn usd(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn multiply(&self, qty: u32) -> Money { Money::usd(self.0 * Decimal::from(qty)) }
    pub fn percent(&self, rate: Decimal) -> Money { Money::usd(self.0 * rate / Decimal::ONE_HUNDRED) }
    pub fn clamp_to(&self, ceiling: Money) -> Money { Money(self.0.max(Decimal::ZERO).min(ceiling.0)) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_offer_code_normalized() {
        assert_eq!(OfferCode::new("  summer10 ").unwrap().as_str(), "SUMMER10");
        assert_eq!(OfferCode::new("   "), Err(OfferCodeError::Empty));
        assert_eq!(OfferCode::new("x".repeat(51)), Err(OfferCodeError::TooLong));
    }

    #[test]
    fn test_money_rounds_to_cents() {
        assert_eq!(Money::usd(dec!(10.005)).amount(), dec!(10.01));
        assert_eq!(Money::usd(dec!(5.99)).multiply(3).amount(), dec!(17.97));
        assert_eq!(Money::usd(dec!(20)).percent(dec!(15)).amount(), dec!(3.00));
    }

    #[test]
    fn test_mns_conversion() {
        let rate = ExchangeRate::default();
        assert_eq!(rate.to_usd(dec!(2450), Currency::Mns).amount(), dec!(10.00));
        assert_eq!(rate.to_usd(dec!(100), Currency::Mns).amount(), dec!(0.41));
        assert_eq!(rate.to_usd(dec!(3.5), Currency::Usd).amount(), dec!(3.50));
        assert!(ExchangeRate::new(Decimal::ZERO).is_none());
    }

    #[test]
    fn test_clamp() {
        let subtotal = Money::usd(dec!(20));
        assert_eq!(Money::usd(dec!(25)).clamp_to(subtotal), subtotal);
        assert_eq!(Money::usd(dec!(-1)).clamp_to(subtotal), Money::ZERO);
    }
}
