//! Offer codes: public validation and admin management.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Offer, OfferKind, OfferRejection, OfferValidation};
use crate::domain::value_objects::{Money, OfferCode};
use crate::store::{OfferFilter, OfferPatch, Store};
use crate::services::Paginated;
use crate::{EcommerceError, Result};

/// Body of an admin offer creation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OfferDraft {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub code: OfferCode,
    #[serde(rename = "type")]
    pub kind: OfferKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool { true }

/// Rules every stored offer satisfies, checked on create and on the patched result.
fn check_offer(offer: &Offer) -> Result<()> {
    if offer.value <= Decimal::ZERO {
        return Err(EcommerceError::bad_request("Value must be greater than zero"));
    }
    if offer.kind == OfferKind::Percentage && offer.value > Decimal::ONE_HUNDRED {
        return Err(EcommerceError::bad_request("Percentage cannot exceed 100"));
    }
    if offer.start_date >= offer.end_date {
        return Err(EcommerceError::bad_request("Start date must be before end date"));
    }
    if offer.usage_limit.is_some_and(|l| l < 1) {
        return Err(EcommerceError::bad_request("Usage limit must be at least 1"));
    }
    if offer.min_purchase.is_some_and(|m| m < Decimal::ZERO) || offer.usage_count < 0 {
        return Err(EcommerceError::bad_request("Amounts cannot be negative"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct OfferService { store: Arc<dyn Store> }

impl OfferService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Never fails on a bad code: the outcome carries the reason instead.
    #[instrument(skip(self))]
    pub async fn validate(&self, code: &str, subtotal: Money, now: DateTime<Utc>) -> Result<OfferValidation> {
        Ok(match self.evaluate(code, subtotal, now).await? {
            Ok((offer, discount)) => OfferValidation::accepted(&offer, discount),
            Err(reason) => OfferValidation::rejected(&reason),
        })
    }

    /// Used by checkout, where an unusable code fails the order.
    pub async fn resolve(&self, code: &str, subtotal: Money, now: DateTime<Utc>) -> Result<(Offer, Money)> {
        self.evaluate(code, subtotal, now).await?
            .map_err(|reason| EcommerceError::bad_request(reason.to_string()))
    }

    async fn evaluate(
        &self, code: &str, subtotal: Money, now: DateTime<Utc>,
    ) -> Result<std::result::Result<(Offer, Money), OfferRejection>> {
        let Ok(code) = OfferCode::new(code) else { return Ok(Err(OfferRejection::NotFound)) };
        let Some(offer) = self.store.find_offer_by_code(&code).await? else {
            return Ok(Err(OfferRejection::NotFound));
        };
        Ok(offer.evaluate(subtotal, now).map(|discount| (offer, discount)))
    }

    pub async fn list(&self, filter: OfferFilter) -> Result<Paginated<Offer>> {
        let (offers, total) = self.store.list_offers(&filter).await?;
        Ok(Paginated::new(offers, total, filter.page, filter.limit))
    }

    pub async fn get(&self, id: Uuid) -> Result<Offer> {
        self.store.get_offer(id).await?.ok_or_else(|| EcommerceError::not_found("Offer"))
    }

    #[instrument(skip(self, draft), fields(code = %draft.code))]
    pub async fn create(&self, draft: OfferDraft) -> Result<Offer> {
        draft.validate()?;
        let now = Utc::now();
        let offer = Offer {
            id: Uuid::now_v7(),
            name: draft.name.trim().to_string(),
            code: draft.code,
            kind: draft.kind,
            value: draft.value,
            min_purchase: draft.min_purchase,
            usage_limit: draft.usage_limit,
            usage_count: 0,
            start_date: draft.start_date,
            end_date: draft.end_date,
            is_active: draft.is_active,
            created_at: now,
            updated_at: now,
        };
        check_offer(&offer)?;
        self.store.insert_offer(&offer).await?;
        info!(offer_id = %offer.id, "offer created");
        Ok(offer)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: OfferPatch) -> Result<Offer> {
        let current = self.get(id).await?;
        check_offer(&patch.apply_to(&current))?;
        self.store.update_offer(id, &patch).await?.ok_or_else(|| EcommerceError::not_found("Offer"))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_offer(id).await? {
            return Err(EcommerceError::not_found("Offer"));
        }
        info!(offer_id = %id, "offer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn draft(code: &str, kind: OfferKind, value: Decimal) -> OfferDraft {
        let now = Utc::now();
        OfferDraft {
            name: "Spring".into(),
            code: OfferCode::new(code).unwrap(),
            kind,
            value,
            min_purchase: None,
            usage_limit: None,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            is_active: true,
        }
    }

    fn service() -> OfferService { OfferService::new(Arc::new(MemoryStore::new())) }

    #[tokio::test]
    async fn test_validate_unknown_code_is_not_an_error() {
        let v = service().validate("nope", Money::usd(dec!(10)), Utc::now()).await.unwrap();
        assert!(!v.valid);
        assert_eq!(v.message.as_deref(), Some("Offer code not found"));

        let v = service().validate("   ", Money::usd(dec!(10)), Utc::now()).await.unwrap();
        assert_eq!(v.message.as_deref(), Some("Offer code not found"));
    }

    #[tokio::test]
    async fn test_validate_normalizes_code() {
        let svc = service();
        svc.create(draft("SAVE10", OfferKind::Percentage, dec!(10))).await.unwrap();
        let v = svc.validate(" save10 ", Money::usd(dec!(80)), Utc::now()).await.unwrap();
        assert!(v.valid);
        assert_eq!(v.discount.amount(), dec!(8.00));
    }

    #[tokio::test]
    async fn test_create_rules() {
        let svc = service();
        assert!(svc.create(draft("BIG", OfferKind::Percentage, dec!(120))).await.is_err());
        assert!(svc.create(draft("ZERO", OfferKind::Fixed, dec!(0))).await.is_err());

        let mut backwards = draft("LATE", OfferKind::Fixed, dec!(5));
        std::mem::swap(&mut backwards.start_date, &mut backwards.end_date);
        assert!(svc.create(backwards).await.is_err());

        svc.create(draft("ONCE", OfferKind::Fixed, dec!(5))).await.unwrap();
        let dup = svc.create(draft("once", OfferKind::Fixed, dec!(5))).await.unwrap_err();
        assert!(matches!(dup, EcommerceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_validates_patched_offer() {
        let svc = service();
        let offer = svc.create(draft("FIVE", OfferKind::Fixed, dec!(5))).await.unwrap();

        let to_pct = OfferPatch { kind: Some(OfferKind::Percentage), value: Some(dec!(150)), ..Default::default() };
        assert!(svc.update(offer.id, to_pct).await.is_err());

        let rename = OfferPatch { name: Some("Five off".into()), ..Default::default() };
        assert_eq!(svc.update(offer.id, rename).await.unwrap().name, "Five off");

        svc.delete(offer.id).await.unwrap();
        assert!(matches!(svc.get(offer.id).await, Err(EcommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_can_clear_limits() {
        let svc = service();
        let mut capped = draft("CAPPED", OfferKind::Fixed, dec!(5));
        capped.min_purchase = Some(dec!(40));
        capped.usage_limit = Some(3);
        let offer = svc.create(capped).await.unwrap();

        let untouched: OfferPatch = serde_json::from_str(r#"{"name":"Capped"}"#).unwrap();
        let offer = svc.update(offer.id, untouched).await.unwrap();
        assert_eq!(offer.min_purchase, Some(dec!(40)));
        assert_eq!(offer.usage_limit, Some(3));

        let cleared: OfferPatch = serde_json::from_str(r#"{"minPurchase":null,"usageLimit":null}"#).unwrap();
        let offer = svc.update(offer.id, cleared).await.unwrap();
        assert_eq!(offer.min_purchase, None);
        assert_eq!(offer.usage_limit, None);
        assert_eq!(offer.name, "Capped");
    }
}
