//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs minted by the identity service; this API only verifies them.

use std::sync::Arc;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::services::Actor;
use crate::EcommerceError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role { #[default] User, Admin }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor { user_id: self.sub, email: self.email.clone(), is_admin: self.role == Role::Admin }
    }
}

pub struct AuthKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl AuthKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, EcommerceError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                EcommerceError::Unauthorized
            })
    }

    /// Signs claims with the shared secret. Used by tooling and tests.
    pub fn sign(&self, claims: &Claims) -> Result<String, EcommerceError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| EcommerceError::Storage(format!("token signing failed: {}", e)))
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts.headers.get(AUTHORIZATION)?
        .to_str().ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Any signed-in caller.
pub struct AuthUser(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthKeys>: FromRef<S>,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<AuthKeys>::from_ref(state);
        let token = bearer(parts).ok_or(EcommerceError::Unauthorized)?;
        Ok(AuthUser(keys.verify(token)?.actor()))
    }
}

/// A caller with the `ADMIN` role.
pub struct AdminUser(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Arc<AuthKeys>: FromRef<S>,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        if !actor.is_admin {
            return Err(EcommerceError::Forbidden);
        }
        Ok(AdminUser(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, exp: usize) -> Claims {
        Claims { sub: Uuid::new_v4(), email: Some("ana@example.com".into()), role, exp }
    }

    fn in_an_hour() -> usize { (chrono::Utc::now().timestamp() + 3600) as usize }

    #[test]
    fn test_sign_and_verify() {
        let keys = AuthKeys::from_secret("s3cret");
        let c = claims(Role::Admin, in_an_hour());
        let actor = keys.verify(&keys.sign(&c).unwrap()).unwrap().actor();
        assert_eq!(actor.user_id, c.sub);
        assert!(actor.is_admin);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let keys = AuthKeys::from_secret("s3cret");
        let other = AuthKeys::from_secret("other");
        let token = other.sign(&claims(Role::User, in_an_hour())).unwrap();
        assert!(matches!(keys.verify(&token), Err(EcommerceError::Unauthorized)));

        let expired = keys.sign(&claims(Role::User, 1_000)).unwrap();
        assert!(matches!(keys.verify(&expired), Err(EcommerceError::Unauthorized)));
    }
}
