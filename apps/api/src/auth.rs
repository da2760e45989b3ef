//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity service; this server only
//! validates them. The claimed role and tenant are a hint: every engine call
//! resolves the user's role for the tenant again.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use comanda_core::Role;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,

    pub role: Role,

    pub tenant_id: String,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        JwtManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a token; used by tests and local tooling.
    pub fn issue(
        &self,
        user_id: &str,
        role: Role,
        tenant_id: &str,
        lifetime: Duration,
    ) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            tenant_id: tenant_id.to_string(),
            exp: (Utc::now() + lifetime).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Unauthenticated(format!("no se pudo firmar el token: {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Rejected bearer token");
                ApiError::Unauthenticated("token inválido o vencido".to_string())
            })
    }
}

/// The caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub tenant_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthenticated("falta el token de acceso".to_string()))?;

        let claims = state.jwt.validate(token.trim())?;
        Ok(AuthUser {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
        })
    }
}
