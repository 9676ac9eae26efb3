// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reddit OAuth connection flow tests.
//!
//! Drives `/auth/reddit` and `/auth/reddit/callback` against a local fake
//! of the Reddit endpoints and checks redirects, cookies, stored records and
//! how many times each Reddit endpoint was hit.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use subpirate::db::collections;
use subpirate::services::oauth_state::issue_state;
use tower::ServiceExt;

mod common;
use common::{MeReply, TestApp, TokenReply, FAKE_USERNAME};

const DASHBOARD: &str = "http://localhost:5173/dashboard";

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn failure_redirect(code: &str) -> String {
    format!(
        "http://localhost:5173/accounts?reddit_error={}&retry=1",
        code
    )
}

fn set_cookie_for(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .find(|value| value.starts_with(&format!("{name}=")))
}

/// Start the flow as a subscribed `user_1`; returns the stashed state.
async fn start_flow(app: &TestApp, token: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/reddit")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let cookie = set_cookie_for(&response, "subpirate_reddit_oauth_state")
        .expect("state cookie not set");
    let value = cookie
        .trim_start_matches("subpirate_reddit_oauth_state=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let auth_url = location(&response);
    assert!(auth_url.starts_with(&format!("{}/api/v1/authorize?", app.reddit.base_url)));
    assert!(auth_url.contains(&format!("state={}", value)));
    assert!(auth_url.contains("duration=permanent"));
    assert!(auth_url.contains("response_type=code"));

    value
}

async fn callback(app: &TestApp, token: &str, query: &str, stashed: Option<&str>) -> Response {
    let cookie = match stashed {
        Some(state) => format!(
            "subpirate_session={}; subpirate_reddit_oauth_state={}",
            token, state
        ),
        None => format!("subpirate_session={}", token),
    };

    app.router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/reddit/callback?{}", query))
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn subscribed_app() -> (TestApp, String) {
    let app = common::create_test_app().await;
    common::subscribe(&app, "user_1");
    let token = common::session_token(&app, &common::test_identity("user_1"));
    (app, token)
}

#[tokio::test]
async fn test_start_requires_subscription() {
    let app = common::create_test_app().await;
    let token = common::session_token(&app, &common::test_identity("user_1"));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/reddit")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(set_cookie_for(&response, "subpirate_reddit_oauth_state").is_none());
}

#[tokio::test]
async fn test_state_cookie_attributes() {
    let (app, token) = subscribed_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/reddit")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let cookie = set_cookie_for(&response, "subpirate_reddit_oauth_state").unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=600"));
}

#[tokio::test]
async fn test_successful_connection() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), DASHBOARD);

    let cleared = set_cookie_for(&response, "subpirate_reddit_oauth_state").unwrap();
    assert!(cleared.contains("Max-Age=0"));

    assert_eq!(app.reddit.token_calls(), 1);
    assert_eq!(app.reddit.me_calls(), 1);
    assert_eq!(app.mem.reddit_account_count(), 1);

    let account = app
        .mem
        .get_reddit_account("user_1", FAKE_USERNAME)
        .unwrap()
        .expect("account stored");
    assert_eq!(account.reddit_id, "t2_abc123");
    assert_eq!(account.scope, vec!["identity", "read", "submit"]);
    assert_ne!(account.access_token_encrypted, "fake_access_token");
    assert_eq!(
        account.avatar_url.as_deref(),
        Some("https://styles.redditmedia.com/icon.png?a=1&b=2")
    );

    // Usage row for this month exists.
    let month = subpirate::time_utils::month_start(chrono::Utc::now());
    let usage = app.mem.ensure_usage_stats("user_1", &month).unwrap();
    assert_eq!(usage.user_id, "user_1");
}

#[tokio::test]
async fn test_replayed_code_is_silent_and_not_duplicated() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;
    let query = format!("code=code_1&state={}", state);

    let first = callback(&app, &token, &query, Some(&state)).await;
    assert_eq!(location(&first), DASHBOARD);
    let cleared = set_cookie_for(&first, "subpirate_reddit_oauth_state").unwrap();
    assert!(cleared.contains("Max-Age=0"));

    // A browser refresh replays the URL without the cleared state cookie.
    let second = callback(&app, &token, &query, None).await;
    assert_eq!(second.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&second), DASHBOARD);

    assert_eq!(app.reddit.token_calls(), 1);
    assert_eq!(app.mem.reddit_account_count(), 1);
}

#[tokio::test]
async fn test_replay_with_foreign_state_cookie_still_fails() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;
    let query = format!("code=code_1&state={}", state);

    let first = callback(&app, &token, &query, Some(&state)).await;
    assert_eq!(location(&first), DASHBOARD);

    let other = issue_state("user_1", &app.state.config.oauth_state_key).unwrap();
    let second = callback(&app, &token, &query, Some(&other)).await;
    assert_eq!(location(&second), failure_redirect("state_mismatch"));
    assert_eq!(app.reddit.token_calls(), 1);
}

#[tokio::test]
async fn test_replay_by_another_user_fails() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;
    let query = format!("code=code_1&state={}", state);

    let first = callback(&app, &token, &query, Some(&state)).await;
    assert_eq!(location(&first), DASHBOARD);

    let intruder = common::session_token(&app, &common::test_identity("user_2"));
    let second = callback(&app, &intruder, &query, None).await;
    assert_eq!(location(&second), failure_redirect("state_mismatch"));
    assert_eq!(app.reddit.token_calls(), 1);
}

#[tokio::test]
async fn test_malformed_params_redirect_and_clear_cookie() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;

    for query in [
        format!("code=&state={}", state),
        format!("code={}&state={}", "c".repeat(600), state),
    ] {
        let response = callback(&app, &token, &query, Some(&state)).await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), failure_redirect("invalid_params"));
        let cleared = set_cookie_for(&response, "subpirate_reddit_oauth_state").unwrap();
        assert!(cleared.contains("Max-Age=0"));
    }
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_reconnect_keeps_single_record() {
    let (app, token) = subscribed_app().await;

    for code in ["code_1", "code_2"] {
        let state = start_flow(&app, &token).await;
        let response = callback(
            &app,
            &token,
            &format!("code={}&state={}", code, state),
            Some(&state),
        )
        .await;
        assert_eq!(location(&response), DASHBOARD);
    }

    assert_eq!(app.reddit.token_calls(), 2);
    assert_eq!(app.mem.reddit_account_count(), 1);
}

#[tokio::test]
async fn test_invalid_grant_is_treated_as_duplicate() {
    let (app, token) = subscribed_app().await;
    app.reddit.script_token([TokenReply::InvalidGrant]);
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), DASHBOARD);
    assert_eq!(app.reddit.token_calls(), 1);
    assert_eq!(app.reddit.me_calls(), 0);
    assert_eq!(app.mem.reddit_account_count(), 0);
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges() {
    let (app, token) = subscribed_app().await;
    let stashed = start_flow(&app, &token).await;
    let other = issue_state("user_1", &app.state.config.oauth_state_key).unwrap();

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", other),
        Some(&stashed),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("state_mismatch"));
    let cleared = set_cookie_for(&response, "subpirate_reddit_oauth_state").unwrap();
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_missing_stashed_state_never_exchanges() {
    let (app, token) = subscribed_app().await;
    let state = issue_state("user_1", &app.state.config.oauth_state_key).unwrap();

    let response = callback(&app, &token, &format!("code=code_1&state={}", state), None).await;

    assert_eq!(location(&response), failure_redirect("state_mismatch"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_state_for_another_user_is_rejected() {
    let (app, token) = subscribed_app().await;
    let state = issue_state("user_2", &app.state.config.oauth_state_key).unwrap();

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("state_mismatch"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let (app, token) = subscribed_app().await;
    let forged = issue_state("user_1", b"attacker_key").unwrap();

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", forged),
        Some(&forged),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("state_mismatch"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_provider_error_param() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("error=access_denied&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("access_denied"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_missing_code() {
    let (app, token) = subscribed_app().await;
    let state = start_flow(&app, &token).await;

    let response = callback(&app, &token, &format!("state={}", state), Some(&state)).await;

    assert_eq!(location(&response), failure_redirect("missing_params"));
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_callback_requires_sign_in() {
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/reddit/callback?code=c&state=s")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.reddit.token_calls(), 0);
}

#[tokio::test]
async fn test_user_fetch_rate_limit_is_retried() {
    let (app, token) = subscribed_app().await;
    app.reddit
        .script_me([MeReply::Status(429), MeReply::Status(429)]);
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), DASHBOARD);
    assert_eq!(app.reddit.me_calls(), 3);
    assert_eq!(app.mem.reddit_account_count(), 1);
}

#[tokio::test]
async fn test_user_fetch_server_error_fails_fast() {
    let (app, token) = subscribed_app().await;
    app.reddit.script_me([MeReply::Status(500)]);
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("user_fetch_failed"));
    assert_eq!(app.reddit.me_calls(), 1);
    assert_eq!(app.mem.reddit_account_count(), 0);
}

#[tokio::test]
async fn test_persist_failure() {
    let (app, token) = subscribed_app().await;
    app.mem.fail_collection(collections::REDDIT_ACCOUNTS);
    let state = start_flow(&app, &token).await;

    let response = callback(
        &app,
        &token,
        &format!("code=code_1&state={}", state),
        Some(&state),
    )
    .await;

    assert_eq!(location(&response), failure_redirect("save_failed"));
    assert_eq!(app.reddit.token_calls(), 1);
    assert_eq!(app.reddit.me_calls(), 1);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let (app, token) = subscribed_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(
                    header::COOKIE,
                    format!(
                        "subpirate_session={}; subpirate_reddit_oauth_state=abc; subpirate_checkout_success=1",
                        token
                    ),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    for name in [
        "subpirate_session",
        "subpirate_reddit_oauth_state",
        "subpirate_checkout_success",
    ] {
        let cookie = set_cookie_for(&response, name)
            .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Path=/"));
    }
}
