use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use crate::domain::aggregates::{Category, Product, ProductVariant};
use crate::http::auth::AdminUser;
use crate::http::error::ApiJson;
use crate::services::catalog::{CategoryDraft, CategoryRemoved, ProductDraft, RemovalMode, VariantDraft};
use crate::services::{page_bounds, Paginated, Services};
use crate::store::{CategoryPatch, ProductFilter, ProductPatch, VariantPatch};
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub combo: Option<bool>,
}

pub async fn list_products(State(s): State<Services>, Query(p): Query<ListParams>) -> Result<Json<Paginated<Product>>> {
    let (page, per_page) = page_bounds(p.page, p.per_page);
    let filter = ProductFilter {
        category_id: p.category,
        search: p.search,
        featured: p.featured,
        combo: p.combo,
        active_only: true,
        page,
        per_page,
    };
    Ok(Json(s.catalog.list_products(filter).await?))
}

pub async fn get_product(State(s): State<Services>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.get_product(id).await?))
}

pub async fn get_product_by_slug(State(s): State<Services>, Path(slug): Path<String>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.get_product_by_slug(&slug).await?))
}

pub async fn create_product(
    State(s): State<Services>, _: AdminUser, ApiJson(draft): ApiJson<ProductDraft>,
) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_product(draft).await?)))
}

pub async fn update_product(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(s.catalog.update_product(id, patch).await?))
}

pub async fn add_variant(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(draft): ApiJson<VariantDraft>,
) -> Result<(StatusCode, Json<ProductVariant>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.add_variant(id, draft).await?)))
}

pub async fn update_variant(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(patch): ApiJson<VariantPatch>,
) -> Result<Json<ProductVariant>> {
    Ok(Json(s.catalog.update_variant(id, patch).await?))
}

pub async fn list_categories(State(s): State<Services>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.catalog.list_categories().await?))
}

pub async fn create_category(
    State(s): State<Services>, _: AdminUser, ApiJson(draft): ApiJson<CategoryDraft>,
) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_category(draft).await?)))
}

pub async fn delete_product(State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_category(State(s): State<Services>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    Ok(Json(s.catalog.get_category(id).await?))
}

pub async fn update_category(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(patch): ApiJson<CategoryPatch>,
) -> Result<Json<Category>> {
    Ok(Json(s.catalog.update_category(id, patch).await?))
}

#[derive(Debug, Deserialize)]
pub struct RemovalParams {
    pub mode: RemovalMode,
}

pub async fn delete_category(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, Query(p): Query<RemovalParams>,
) -> Result<Json<CategoryRemoved>> {
    Ok(Json(s.catalog.remove_category(id, p.mode).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignProductsRequest {
    pub product_ids: Vec<Uuid>,
}

pub async fn assign_products(
    State(s): State<Services>, _: AdminUser, Path(id): Path<Uuid>, ApiJson(r): ApiJson<AssignProductsRequest>,
) -> Result<Json<Value>> {
    let assigned = s.catalog.assign_products(id, &r.product_ids).await?;
    Ok(Json(json!({ "assigned": assigned })))
}
