//! Bearer-token authentication and token lifecycle.
//!
//! Credentials are loaded once at startup into an immutable [`AuthConfig`]
//! and passed explicitly; login issues a UUID bearer token with a TTL kept
//! in an in-memory map.

use axum::extract::{Extension, Json};
use axum::http::{Request, StatusCode};
use axum::{body::Body as AxumBody, middleware};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub tokens: Mutex<HashMap<String, TokenEntry>>,
    pub token_ttl: Duration,
}

#[derive(Debug)]
pub struct TokenEntry {
    pub expires_at: Instant,
}

/// Rejects any request without a valid bearer token, except the auth
/// endpoints themselves.
pub async fn auth_middleware(
    Extension(auth): Extension<Arc<AuthConfig>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<axum::response::Response, ApiError> {
    if is_auth_exempt_path(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    if let Some(TypedHeader(bearer)) = bearer
        && is_token_valid(&auth, bearer.token()).await
    {
        return Ok(next.run(req).await);
    }

    Err(ApiError::Unauthorized)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthLoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthLoginResponse {
    token: String,
    expires_in_secs: u64,
}

/// Exchanges configured credentials for a bearer token.
pub async fn auth_login(
    Extension(auth): Extension<Arc<AuthConfig>>,
    Json(payload): Json<AuthLoginRequest>,
) -> Result<Json<AuthLoginResponse>, ApiError> {
    if payload.username != auth.username || payload.password != auth.password {
        warn!(username = payload.username, "login rejected");
        return Err(ApiError::Unauthorized);
    }

    let token = Uuid::new_v4().to_string();
    let expires_at = Instant::now() + auth.token_ttl;
    let mut tokens = auth.tokens.lock().await;
    tokens.insert(token.clone(), TokenEntry { expires_at });
    info!("login ok");

    Ok(Json(AuthLoginResponse {
        token,
        expires_in_secs: auth.token_ttl.as_secs(),
    }))
}

/// Revokes the presented bearer token, if any.
pub async fn auth_logout(
    Extension(auth): Extension<Arc<AuthConfig>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> StatusCode {
    if let Some(TypedHeader(bearer)) = bearer {
        let mut tokens = auth.tokens.lock().await;
        tokens.remove(bearer.token());
    }
    StatusCode::NO_CONTENT
}

/// Reports whether the presented bearer token is currently valid.
pub async fn auth_status(
    Extension(auth): Extension<Arc<AuthConfig>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> StatusCode {
    if let Some(TypedHeader(bearer)) = bearer
        && is_token_valid(&auth, bearer.token()).await
    {
        return StatusCode::NO_CONTENT;
    }
    StatusCode::UNAUTHORIZED
}

fn is_auth_exempt_path(path: &str) -> bool {
    path == "/api/auth/login" || path == "/api/auth/logout" || path == "/api/auth/status"
}

async fn is_token_valid(auth: &AuthConfig, token: &str) -> bool {
    let mut tokens = auth.tokens.lock().await;
    let now = Instant::now();
    match tokens.get(token) {
        Some(entry) if entry.expires_at > now => true,
        _ => {
            tokens.remove(token);
            false
        }
    }
}

/// Drops tokens past their expiry.
pub async fn prune_expired_tokens(auth: &AuthConfig) {
    let mut tokens = auth.tokens.lock().await;
    let now = Instant::now();
    tokens.retain(|_, entry| entry.expires_at > now);
}
