// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reddit OAuth connection routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::access::CHECKOUT_SUCCESS_COOKIE;
use crate::middleware::auth::SESSION_COOKIE;
use crate::middleware::{require_access, require_identity};
use crate::models::Identity;
use crate::services::oauth_state::issue_state;
use crate::services::oauth_callback::CallbackError;
use crate::services::{CallbackFlow, CallbackOutcome, CallbackRequest};
use crate::AppState;

/// Cookie holding the state value between initiation and callback.
pub const OAUTH_STATE_COOKIE: &str = "subpirate_reddit_oauth_state";

/// Lifetime of the state cookie, matching the state's own expiry.
const OAUTH_STATE_COOKIE_MINUTES: i64 = 10;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Linking a Reddit account is a paid feature.
    let start = Router::new()
        .route("/auth/reddit", get(auth_start))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access));

    // The callback only needs a signed-in user; the state cookie proves the
    // flow was started behind the access guard.
    let callback = Router::new()
        .route("/auth/reddit/callback", get(auth_callback))
        .route_layer(middleware::from_fn_with_state(state, require_identity));

    Router::new()
        .merge(start)
        .merge(callback)
        .route("/auth/logout", post(logout))
}

fn is_secure(config: &Config) -> bool {
    config.frontend_url.starts_with("https://")
}

fn state_cookie(config: &Config, value: String) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(is_secure(config))
        .max_age(time::Duration::minutes(OAUTH_STATE_COOKIE_MINUTES))
        .build()
}

/// Removal cookie carrying the same attributes the cookie was set with.
fn removal_cookie(config: &Config, name: &'static str, http_only: bool) -> Cookie<'static> {
    Cookie::build(name)
        .path("/")
        .http_only(http_only)
        .same_site(SameSite::Lax)
        .secure(is_secure(config))
        .build()
}

/// Start OAuth flow - stash a signed state and redirect to Reddit.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let oauth_state = issue_state(&user.id, &state.config.oauth_state_key)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to sign OAuth state")))?;

    let auth_url = state.reddit.client().authorize_url(&oauth_state);

    tracing::info!(user_id = %user.id, "Starting Reddit OAuth flow");

    let jar = jar.add(state_cookie(&state.config, oauth_state));
    Ok((jar, Redirect::temporary(&auth_url)))
}

/// Query parameters Reddit sends back.
#[derive(Debug, Deserialize, Validate)]
pub struct CallbackParams {
    #[serde(default)]
    #[validate(length(min = 1, max = 512))]
    code: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 1024))]
    state: Option<String>,
    #[serde(default)]
    #[validate(length(max = 256))]
    error: Option<String>,
}

impl From<CallbackParams> for CallbackRequest {
    fn from(params: CallbackParams) -> Self {
        CallbackRequest {
            code: params.code,
            state: params.state,
            error: params.error,
        }
    }
}

/// Where the browser lands after the callback.
fn callback_redirect(frontend_url: &str, outcome: &CallbackOutcome) -> String {
    let base = frontend_url.trim_end_matches('/');
    match outcome {
        CallbackOutcome::Connected(_) | CallbackOutcome::Duplicate => {
            format!("{}/dashboard", base)
        }
        CallbackOutcome::Failed(e) => format!(
            "{}/accounts?reddit_error={}&retry=1",
            base,
            urlencoding::encode(e.code())
        ),
    }
}

/// OAuth callback - run the connection flow and send the user back.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let outcome = match params.validate() {
        Ok(()) => {
            let stashed = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
            let request = CallbackRequest::from(params);

            let mut flow = CallbackFlow::new(
                &state.reddit,
                &state.code_ledger,
                &state.config.oauth_state_key,
            );
            let outcome = flow.run(&user, &request, stashed.as_deref()).await;

            tracing::info!(
                user_id = %user.id,
                phase = %flow.phase(),
                "Reddit callback finished"
            );
            outcome
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Malformed Reddit callback");
            CallbackOutcome::Failed(CallbackError::InvalidParams(e.to_string()))
        }
    };

    let redirect = callback_redirect(&state.config.frontend_url, &outcome);
    let jar = jar.remove(removal_cookie(&state.config, OAUTH_STATE_COOKIE, true));
    (jar, Redirect::temporary(&redirect))
}

/// Logout - clear the session and flow cookies.
///
/// The checkout flag is set by frontend script, so it is not HttpOnly.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let config = &state.config;
    let jar = jar
        .remove(removal_cookie(config, SESSION_COOKIE, true))
        .remove(removal_cookie(config, OAUTH_STATE_COOKIE, true))
        .remove(removal_cookie(config, CHECKOUT_SUCCESS_COOKIE, false));
    (jar, StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_duplicate_go_to_dashboard() {
        assert_eq!(
            callback_redirect("https://app.example.com/", &CallbackOutcome::Duplicate),
            "https://app.example.com/dashboard"
        );
    }

    #[test]
    fn test_failure_carries_code_and_retry() {
        let outcome = CallbackOutcome::Failed(CallbackError::StateMismatch("x".to_string()));
        assert_eq!(
            callback_redirect("https://app.example.com", &outcome),
            "https://app.example.com/accounts?reddit_error=state_mismatch&retry=1"
        );
    }

    #[test]
    fn test_state_cookie_attributes() {
        let config = Config::test_default();
        let cookie = state_cookie(&config, "abc".to_string()).to_string();
        assert!(cookie.starts_with("subpirate_reddit_oauth_state=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=600"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_oversized_code_rejected() {
        let params = CallbackParams {
            code: Some("c".repeat(600)),
            state: Some("s".to_string()),
            error: None,
        };
        assert!(params.validate().is_err());
    }
}
