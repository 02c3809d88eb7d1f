//! HTTP surface: JSON under `/api/v1`, plus `/health`.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod offers;
pub mod orders;
pub mod reviews;
pub mod wishlist;

use std::sync::Arc;
use axum::extract::FromRef;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::services::Services;
use auth::AuthKeys;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub services: Services,
    pub auth: Arc<AuthKeys>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "habana-commerce"}))
}

fn api() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::get_cart).post(cart::add_to_cart).delete(cart::clear_cart))
        .route("/cart/validate", get(cart::validate_cart))
        .route("/cart/:id", patch(cart::update_cart_item).delete(cart::remove_from_cart))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/all", get(orders::list_all_orders))
        .route("/orders/:id", get(orders::get_order).patch(orders::confirm_payment))
        .route("/orders/:id/status", patch(orders::update_status))
        .route("/offers/validate", post(offers::validate_offer))
        .route("/offers/admin", get(offers::list_offers).post(offers::create_offer))
        .route("/offers/admin/:id", get(offers::get_offer).patch(offers::update_offer).delete(offers::delete_offer))
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route("/products/slug/:slug", get(catalog::get_product_by_slug))
        .route("/products/:id", get(catalog::get_product).patch(catalog::update_product).delete(catalog::delete_product))
        .route("/products/:id/variants", post(catalog::add_variant))
        .route("/products/:id/reviews", get(reviews::product_reviews).post(reviews::submit_review))
        .route("/variants/:id", patch(catalog::update_variant))
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category).patch(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/categories/:id/products", post(catalog::assign_products))
        .route("/wishlist", get(wishlist::get_wishlist).post(wishlist::add_to_wishlist))
        .route("/wishlist/:product_id", delete(wishlist::remove_from_wishlist))
        .route("/reviews/admin", get(reviews::list_reviews).post(reviews::create_review))
        .route("/reviews/admin/settings", get(reviews::get_settings).patch(reviews::update_settings))
        .route(
            "/reviews/admin/:id",
            get(reviews::get_review).patch(reviews::update_review).delete(reviews::delete_review),
        )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::aggregates::product::tests::product;
    use crate::notify::LogNotifier;
    use crate::store::memory::MemoryStore;
    use crate::store::CatalogStore;
    use auth::{Claims, Role};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn config() -> Config {
        Config {
            database_url: None,
            database_max_connections: 1,
            port: 0,
            jwt_secret: "test-secret".into(),
            nats_url: None,
            nats_subject_prefix: "ecommerce".into(),
            admin_email: None,
            low_stock_threshold: 10,
            low_stock_scan_interval: std::time::Duration::from_secs(60),
            pricing: Default::default(),
            exchange_rate: Default::default(),
        }
    }

    async fn app() -> (Router, Arc<AuthKeys>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(AuthKeys::from_secret("test-secret"));
        let services = Services::new(store.clone(), Arc::new(LogNotifier), &config());
        (router(AppState { services, auth: keys.clone() }), keys, store)
    }

    fn token(keys: &AuthKeys, role: Role) -> String {
        let exp = (chrono::Utc::now().timestamp() + 600) as usize;
        keys.sign(&Claims { sub: Uuid::new_v4(), email: None, role, exp }).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app().await;
        let res = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cart_requires_token() {
        let (app, _, _) = app().await;
        let res = app.oneshot(Request::get("/api/v1/cart").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_admin_routes_forbidden_for_users() {
        let (app, keys, _) = app().await;
        let req = Request::get("/api/v1/orders/all")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_empty_cart_checkout_is_bad_request() {
        let (app, keys, _) = app().await;
        let body = serde_json::json!({
            "shippingAddress": {
                "firstName": "Ana", "lastName": "Pérez", "address": "Calle 23", "city": "La Habana",
                "zipCode": "10400", "country": "CU"
            }
        });
        let req = Request::post("/api/v1/orders")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Cart is empty");
    }

    #[tokio::test]
    async fn test_add_to_cart_over_stock() {
        let (app, keys, store) = app().await;
        let p = product("Arroz", Some(dec!(2)), 1);
        store.insert_product(&p).await.unwrap();
        let req = Request::post("/api/v1/cart")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({"productId": p.id, "quantity": 2}).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Insufficient stock for Arroz. Available: 1");
    }

    #[tokio::test]
    async fn test_validate_unknown_offer() {
        let (app, _, _) = app().await;
        let req = Request::post("/api/v1/offers/validate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"code":"NOPE","subtotal":"20"}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["valid"], false);
        assert_eq!(json["message"], "Offer code not found");
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_body() {
        let (app, keys, _) = app().await;
        let req = Request::post("/api/v1/cart")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"productId": "#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["error"], "Bad Request");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_to_cart_quantity_ceiling() {
        let (app, keys, store) = app().await;
        let p = product("Frijoles", Some(dec!(2)), i32::MAX);
        store.insert_product(&p).await.unwrap();
        let req = Request::post("/api/v1/cart")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({"productId": p.id, "quantity": 10001}).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Bad Request");
    }

    #[tokio::test]
    async fn test_wishlist_round() {
        let (app, keys, store) = app().await;
        let p = product("Mango", Some(dec!(1)), 5);
        store.insert_product(&p).await.unwrap();
        let bearer = format!("Bearer {}", token(&keys, Role::User));

        let add = Request::post("/api/v1/wishlist")
            .header(header::AUTHORIZATION, &bearer)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({"productId": p.id}).to_string()))
            .unwrap();
        let res = app.clone().oneshot(add).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["product"]["name"], "Mango");

        let remove = Request::delete(format!("/api/v1/wishlist/{}", p.id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(remove).await.unwrap().status(), StatusCode::NO_CONTENT);

        let list = Request::get("/api/v1/wishlist").header(header::AUTHORIZATION, &bearer).body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(list).await.unwrap()).await;
        assert_eq!(json["items"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_public_review_hidden_until_approved() {
        let (app, keys, store) = app().await;
        let p = product("Café", Some(dec!(8)), 5);
        store.insert_product(&p).await.unwrap();
        let review = serde_json::json!({"authorName": "Marta", "rating": 5, "content": "Excelente"});
        let submit = Request::post(format!("/api/v1/products/{}/reviews", p.id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(review.to_string()))
            .unwrap();
        let res = app.clone().oneshot(submit).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["isApproved"], false);

        let public = Request::get(format!("/api/v1/products/{}/reviews", p.id)).body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(public).await.unwrap()).await;
        assert_eq!(json.as_array().unwrap().len(), 0);

        let admin = Request::get("/api/v1/reviews/admin?isApproved=false")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::Admin)))
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(admin).await.unwrap()).await;
        assert_eq!(json["total"], 1);

        let denied = Request::get("/api/v1/reviews/admin/settings")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&keys, Role::User)))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(denied).await.unwrap().status(), StatusCode::FORBIDDEN);
    }
}
