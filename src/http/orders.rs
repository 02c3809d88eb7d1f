use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::http::auth::{AdminUser, AuthUser};
use crate::http::error::ApiJson;
use crate::services::orders::OrderDraft;
use crate::services::Services;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

pub async fn create_order(
    State(s): State<Services>, AuthUser(actor): AuthUser, ApiJson(draft): ApiJson<OrderDraft>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = s.orders.create(&actor, draft).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(State(s): State<Services>, AuthUser(actor): AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.find_all(&actor).await?))
}

pub async fn list_all_orders(State(s): State<Services>, _: AdminUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.list_all().await?))
}

pub async fn get_order(State(s): State<Services>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.find_one(&actor, id).await?))
}

pub async fn confirm_payment(
    State(s): State<Services>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>, ApiJson(r): ApiJson<ConfirmPaymentRequest>,
) -> Result<Json<Order>> {
    Ok(Json(s.orders.confirm_payment(&actor, id, &r.payment_intent_id).await?))
}

pub async fn update_status(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(r): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    Ok(Json(s.orders.update_status(id, r.status, r.payment_status).await?))
}
