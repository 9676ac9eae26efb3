// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity-provider session authentication.

use crate::models::Identity;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie the frontend stores the identity provider's session token in.
pub const SESSION_COOKIE: &str = "subpirate_session";

/// JWT claims issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (external user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            image_url: claims.image_url,
        }
    }
}

/// Validate a session token and return the identity it asserts.
pub fn verify_identity_token(token: &str, signing_key: &[u8]) -> Option<Identity> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<Claims>(token, &key, &validation).ok()?;
    if token_data.claims.sub.is_empty() {
        return None;
    }
    Some(token_data.claims.into())
}

/// Pull the session token from the cookie, falling back to the bearer header.
fn extract_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Resolve the caller's identity, if signed in.
///
/// A newly seen or changed identity is mirrored into `profiles` in the
/// background.
pub fn resolve_identity(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Option<Identity> {
    let token = extract_token(jar, headers)?;
    let identity = verify_identity_token(&token, &state.config.identity_jwt_secret)?;
    state.session_sync.observe(&identity);
    Some(identity)
}

/// Middleware that requires a signed-in identity.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(identity) = resolve_identity(&state, &jar, request.headers()) else {
        return crate::error::AppError::Unauthorized.into_response();
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Create a session token, as the identity provider would.
///
/// Used by tests and local tooling.
pub fn create_identity_token(
    identity: &Identity,
    signing_key: &[u8],
    ttl_secs: usize,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: identity.id.clone(),
        iat: now,
        exp: now + ttl_secs,
        email: identity.email.clone(),
        name: identity.display_name.clone(),
        image_url: identity.image_url.clone(),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}
