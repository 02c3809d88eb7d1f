use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use crate::domain::aggregates::{Review, ReviewSettings};
use crate::http::auth::AdminUser;
use crate::http::error::ApiJson;
use crate::services::reviews::{AdminReviewDraft, ReviewDraft, ReviewSettingsPatch};
use crate::services::{page_bounds, Paginated, Services};
use crate::store::{ReviewFilter, ReviewPatch};
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub product_id: Option<Uuid>,
    pub is_approved: Option<bool>,
    pub search: Option<String>,
}

pub async fn product_reviews(State(s): State<Services>, Path(id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    Ok(Json(s.reviews.list_approved(id).await?))
}

pub async fn submit_review(
    State(s): State<Services>, Path(id): Path<Uuid>, ApiJson(draft): ApiJson<ReviewDraft>,
) -> Result<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(s.reviews.create_public(id, draft).await?)))
}

pub async fn list_reviews(
    State(s): State<Services>, _: AdminUser, Query(p): Query<ReviewListParams>,
) -> Result<Json<Paginated<Review>>> {
    let (page, limit) = page_bounds(p.page, p.limit);
    let filter = ReviewFilter { product_id: p.product_id, is_approved: p.is_approved, search: p.search, page, limit };
    Ok(Json(s.reviews.list(filter).await?))
}

pub async fn create_review(
    State(s): State<Services>, _: AdminUser, ApiJson(draft): ApiJson<AdminReviewDraft>,
) -> Result<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(s.reviews.create(draft).await?)))
}

pub async fn get_review(State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Review>> {
    Ok(Json(s.reviews.get(id).await?))
}

pub async fn update_review(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(patch): ApiJson<ReviewPatch>,
) -> Result<Json<Review>> {
    Ok(Json(s.reviews.update(id, patch).await?))
}

pub async fn delete_review(State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.reviews.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(State(s): State<Services>, _: AdminUser) -> Result<Json<ReviewSettings>> {
    Ok(Json(s.reviews.settings().await?))
}

pub async fn update_settings(
    State(s): State<Services>, _: AdminUser, ApiJson(patch): ApiJson<ReviewSettingsPatch>,
) -> Result<Json<ReviewSettings>> {
    Ok(Json(s.reviews.update_settings(patch).await?))
}
