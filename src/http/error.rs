use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use crate::EcommerceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// JSON body extractor whose rejections use the same `{error, message}` body as every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(EcommerceError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for EcommerceError {
    fn from(rejection: JsonRejection) -> Self {
        EcommerceError::BadRequest(rejection.body_text())
    }
}

impl EcommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EcommerceError::NotFound(_) => StatusCode::NOT_FOUND,
            EcommerceError::BadRequest(_) | EcommerceError::Validation(_) => StatusCode::BAD_REQUEST,
            EcommerceError::Conflict(_) => StatusCode::CONFLICT,
            EcommerceError::Unauthorized => StatusCode::UNAUTHORIZED,
            EcommerceError::Forbidden => StatusCode::FORBIDDEN,
            EcommerceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            EcommerceError::Storage(detail) => {
                tracing::error!(%detail, "storage failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody { error: status.canonical_reason().unwrap_or("Error").to_string(), message };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EcommerceError::not_found("Order").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(EcommerceError::bad_request("Cart is empty").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(EcommerceError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(EcommerceError::Storage("db".into()).into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
