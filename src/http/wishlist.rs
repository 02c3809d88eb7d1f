use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use crate::domain::aggregates::{Wishlist, WishlistEntry};
use crate::http::auth::AuthUser;
use crate::http::error::ApiJson;
use crate::services::Services;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

pub async fn get_wishlist(State(s): State<Services>, AuthUser(actor): AuthUser) -> Result<Json<Wishlist>> {
    Ok(Json(s.wishlist.get_wishlist(actor.user_id).await?))
}

pub async fn add_to_wishlist(
    State(s): State<Services>, AuthUser(actor): AuthUser, ApiJson(r): ApiJson<AddToWishlistRequest>,
) -> Result<(StatusCode, Json<WishlistEntry>)> {
    Ok((StatusCode::CREATED, Json(s.wishlist.add(actor.user_id, r.product_id).await?)))
}

pub async fn remove_from_wishlist(
    State(s): State<Services>, AuthUser(actor): AuthUser, Path(product_id): Path<Uuid>,
) -> Result<StatusCode> {
    s.wishlist.remove(actor.user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
