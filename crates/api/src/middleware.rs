use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use shopforge_auth::{JwtClaims, Role, validate_claims};
use shopforge_core::UserId;

use crate::context::PrincipalContext;

/// Wire format of the HS256 token payload.
#[derive(Debug, Deserialize)]
struct WireClaims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct AuthState {
    key: Arc<DecodingKey>,
}

impl AuthState {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret)),
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let validation = Validation::new(Algorithm::HS256);
    let decoded = jsonwebtoken::decode::<WireClaims>(token, &state.key, &validation)
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    let user_id = UserId::from_str(&decoded.claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let roles = decoded
        .claims
        .roles
        .into_iter()
        .map(Role::new)
        .collect::<Vec<_>>();

    let claims = JwtClaims {
        sub: user_id,
        roles: roles.clone(),
        issued_at: timestamp(decoded.claims.iat).ok_or(StatusCode::UNAUTHORIZED)?,
        expires_at: timestamp(decoded.claims.exp).ok_or(StatusCode::UNAUTHORIZED)?,
    };
    validate_claims(&claims, Utc::now()).map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut()
        .insert(PrincipalContext::new(user_id, roles));

    Ok(next.run(req).await)
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
