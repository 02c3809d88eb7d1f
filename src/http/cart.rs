use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Cart, CartLine, CartValidation};
use crate::http::auth::AuthUser;
use crate::http::error::ApiJson;
use crate::services::Services;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub product_variant_id: Option<Uuid>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

pub async fn get_cart(State(s): State<Services>, AuthUser(actor): AuthUser) -> Result<Json<Cart>> {
    Ok(Json(s.carts.get_cart(actor.user_id).await?))
}

pub async fn add_to_cart(
    State(s): State<Services>, AuthUser(actor): AuthUser, ApiJson(r): ApiJson<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartLine>)> {
    r.validate()?;
    let line = s.carts.add_to_cart(actor.user_id, r.product_id, r.product_variant_id, r.quantity).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update_cart_item(
    State(s): State<Services>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>, ApiJson(r): ApiJson<UpdateCartItemRequest>,
) -> Result<Json<CartLine>> {
    r.validate()?;
    Ok(Json(s.carts.update_cart_item(actor.user_id, id, r.quantity).await?))
}

pub async fn remove_from_cart(
    State(s): State<Services>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    s.carts.remove_from_cart(actor.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(State(s): State<Services>, AuthUser(actor): AuthUser) -> Result<Json<Value>> {
    let removed = s.carts.clear_cart(actor.user_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn validate_cart(State(s): State<Services>, AuthUser(actor): AuthUser) -> Result<Json<CartValidation>> {
    Ok(Json(s.carts.validate_cart(actor.user_id).await?))
}
