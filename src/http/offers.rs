use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use crate::domain::aggregates::{Offer, OfferValidation};
use crate::domain::value_objects::Money;
use crate::http::auth::AdminUser;
use crate::http::error::ApiJson;
use crate::services::offers::OfferDraft;
use crate::services::{page_bounds, Paginated, Services};
use crate::store::{OfferFilter, OfferPatch};
use crate::{EcommerceError, Result};

#[derive(Debug, Deserialize)]
pub struct ValidateOfferRequest {
    pub code: String,
    pub subtotal: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct OfferListParams {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn validate_offer(State(s): State<Services>, ApiJson(r): ApiJson<ValidateOfferRequest>) -> Result<Json<OfferValidation>> {
    if r.subtotal.is_sign_negative() {
        return Err(EcommerceError::bad_request("Subtotal cannot be negative"));
    }
    Ok(Json(s.offers.validate(&r.code, Money::usd(r.subtotal), Utc::now()).await?))
}

pub async fn list_offers(
    State(s): State<Services>, _: AdminUser, Query(p): Query<OfferListParams>,
) -> Result<Json<Paginated<Offer>>> {
    let (page, limit) = page_bounds(p.page, p.limit);
    Ok(Json(s.offers.list(OfferFilter { search: p.search, page, limit }).await?))
}

pub async fn get_offer(State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Offer>> {
    Ok(Json(s.offers.get(id).await?))
}

pub async fn create_offer(
    State(s): State<Services>, _: AdminUser, ApiJson(draft): ApiJson<OfferDraft>,
) -> Result<(StatusCode, Json<Offer>)> {
    Ok((StatusCode::CREATED, Json(s.offers.create(draft).await?)))
}

pub async fn update_offer(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(patch): ApiJson<OfferPatch>,
) -> Result<Json<Offer>> {
    Ok(Json(s.offers.update(id, patch).await?))
}

pub async fn delete_offer(State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.offers.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
