// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route authorization: identity + entitlement guard for protected routes.

use crate::error::AppError;
use crate::middleware::auth::resolve_identity;
use crate::models::{Entitlement, Identity};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Cookie the frontend sets after returning from a successful checkout.
pub const CHECKOUT_SUCCESS_COOKIE: &str = "subpirate_checkout_success";

/// Identity as seen by the guard.
#[derive(Debug, Clone)]
pub enum IdentityState {
    Loading,
    SignedOut,
    SignedIn(Identity),
}

/// Entitlement as seen by the guard.
#[derive(Debug, Clone)]
pub enum SubscriptionState {
    Loading,
    Resolved(Entitlement),
}

/// What to do with a request for a protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum GuardDecision {
    Loading,
    RedirectToLogin,
    RedirectToSubscribe,
    Render,
}

/// Decide the outcome for one request. Total: every input maps to exactly
/// one decision.
///
/// A checkout-success signal lets a just-paid user through before the
/// billing webhook has written their subscription row.
pub fn decide(
    identity: &IdentityState,
    subscription: &SubscriptionState,
    checkout_success: bool,
) -> GuardDecision {
    match identity {
        IdentityState::Loading => GuardDecision::Loading,
        IdentityState::SignedOut => GuardDecision::RedirectToLogin,
        IdentityState::SignedIn(_) => match subscription {
            SubscriptionState::Loading => GuardDecision::Loading,
            SubscriptionState::Resolved(entitlement) if entitlement.is_granted() => {
                GuardDecision::Render
            }
            SubscriptionState::Resolved(_) if checkout_success => GuardDecision::Render,
            SubscriptionState::Resolved(_) => GuardDecision::RedirectToSubscribe,
        },
    }
}

/// Checkout-success signal: `?checkout=success` or the local flag cookie.
pub fn has_checkout_success(jar: &CookieJar, query: Option<&str>) -> bool {
    let in_query = query
        .map(|q| {
            q.split('&').any(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                k == "checkout" && urlencoding::decode(v).is_ok_and(|v| v == "success")
            })
        })
        .unwrap_or(false);

    in_query
        || jar
            .get(CHECKOUT_SUCCESS_COOKIE)
            .is_some_and(|c| c.value() == "1" || c.value() == "true")
}

/// Resolved guard inputs for one request.
pub struct AccessCheck {
    pub identity: IdentityState,
    pub subscription: SubscriptionState,
    pub checkout_success: bool,
}

impl AccessCheck {
    pub fn decision(&self) -> GuardDecision {
        decide(&self.identity, &self.subscription, self.checkout_success)
    }
}

/// Resolve entitlement for a signed-in user.
///
/// The gate is awaited without a timeout, so the result is never `Loading`
/// on the server. Takes only owned request data so the future stays `Send`.
pub async fn check_access(
    state: &AppState,
    identity: Option<Identity>,
    checkout_success: bool,
) -> AccessCheck {
    let Some(identity) = identity else {
        return AccessCheck {
            identity: IdentityState::SignedOut,
            subscription: SubscriptionState::Loading,
            checkout_success,
        };
    };

    let entitlement = state.subscription_gate.evaluate(&identity.id).await;

    AccessCheck {
        identity: IdentityState::SignedIn(identity),
        subscription: SubscriptionState::Resolved(entitlement),
        checkout_success,
    }
}

/// Middleware guarding routes that need a signed-in, entitled user.
///
/// On `Render`, the handler receives `Identity` and `Entitlement` as
/// request extensions.
pub async fn require_access(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let checkout_success = has_checkout_success(&jar, request.uri().query());
    let identity = resolve_identity(&state, &jar, request.headers());
    let check = check_access(&state, identity, checkout_success).await;

    match check.decision() {
        GuardDecision::Render => {
            if let IdentityState::SignedIn(identity) = check.identity {
                request.extensions_mut().insert(identity);
            }
            if let SubscriptionState::Resolved(entitlement) = check.subscription {
                request.extensions_mut().insert(entitlement);
            }
            next.run(request).await
        }
        GuardDecision::RedirectToLogin => AppError::Unauthorized.into_response(),
        GuardDecision::RedirectToSubscribe => AppError::SubscriptionRequired.into_response(),
        GuardDecision::Loading => {
            (StatusCode::SERVICE_UNAVAILABLE, [(header::RETRY_AFTER, "1")]).into_response()
        }
    }
}
