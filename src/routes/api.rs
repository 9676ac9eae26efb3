// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for signed-in users.

use crate::error::Result;
use crate::middleware::access::{
    check_access, has_checkout_success, GuardDecision, IdentityState, SubscriptionState,
};
use crate::middleware::auth::resolve_identity;
use crate::middleware::{require_access, require_identity};
use crate::models::{Entitlement, Identity, Profile, RedditAccountSummary, UserUsageStats};
use crate::time_utils::month_start;
use crate::AppState;
use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/api/access", get(get_access));

    let signed_in = Router::new()
        .route("/api/me", get(get_me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let entitled = Router::new()
        .route("/api/usage", get(get_usage))
        .route("/api/reddit/accounts", get(list_accounts))
        .route(
            "/api/reddit/accounts/{username}/sync",
            post(sync_account),
        )
        .route("/api/reddit/accounts/{username}", delete(disconnect_account))
        .route_layer(middleware::from_fn_with_state(state, require_access));

    Router::new().merge(public).merge(signed_in).merge(entitled)
}

// ─── Access ──────────────────────────────────────────────────

/// Guard decision for the SPA's route wrapper.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AccessResponse {
    pub decision: GuardDecision,
    pub user_id: Option<String>,
    pub entitlement: Option<Entitlement>,
}

async fn get_access(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Json<AccessResponse> {
    let checkout_success = has_checkout_success(&jar, query.as_deref());
    let identity = resolve_identity(&state, &jar, &headers);
    let check = check_access(&state, identity, checkout_success).await;
    let decision = check.decision();

    let user_id = match check.identity {
        IdentityState::SignedIn(identity) => Some(identity.id),
        IdentityState::Loading | IdentityState::SignedOut => None,
    };
    let entitlement = match check.subscription {
        SubscriptionState::Resolved(entitlement) => Some(entitlement),
        SubscriptionState::Loading => None,
    };

    Json(AccessResponse {
        decision,
        user_id,
        entitlement,
    })
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub identity: Identity,
    /// `None` when the profile could not be read or synced.
    pub profile: Option<Profile>,
}

/// Get the current identity and its mirrored profile.
///
/// Never fails because of the profile store.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<MeResponse> {
    let profile = match state.db.get_profile(&identity.id).await {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => state.session_sync.sync(&identity).await,
        Err(e) => {
            tracing::warn!(user_id = %identity.id, error = %e, "Profile read failed");
            None
        }
    };

    Json(MeResponse { identity, profile })
}

// ─── Usage ───────────────────────────────────────────────────

/// This month's usage counters.
async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserUsageStats>> {
    let month = month_start(chrono::Utc::now());
    let stats = state.db.ensure_usage_stats(&identity.id, &month).await?;
    Ok(Json(stats))
}

// ─── Reddit Accounts ─────────────────────────────────────────

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<RedditAccountSummary>>> {
    Ok(Json(state.reddit.list_accounts(&identity.id).await?))
}

/// Refresh the stored Reddit profile snapshot for one account.
async fn sync_account(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<Json<RedditAccountSummary>> {
    let summary = state.reddit.sync_account(&identity.id, &username).await?;
    Ok(Json(summary))
}

async fn disconnect_account(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    state.reddit.disconnect(&identity.id, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}
