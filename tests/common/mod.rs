// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subpirate::config::Config;
use subpirate::db::{Database, FirestoreDb, MemoryDb};
use subpirate::middleware::auth::create_identity_token;
use subpirate::models::{Identity, SubscriptionRecord, SubscriptionStatus, SubscriptionTable};
use subpirate::routes::create_router;
use subpirate::services::RetryConfig;
use subpirate::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fake Reddit ─────────────────────────────────────────────

/// Scripted reply from the fake token endpoint.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum TokenReply {
    Grant,
    Status(u16),
    InvalidGrant,
}

/// Scripted reply from the fake `/api/v1/me` endpoint.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum MeReply {
    User,
    Status(u16),
}

#[derive(Default)]
struct FakeRedditInner {
    token_calls: AtomicUsize,
    me_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    token_script: Mutex<VecDeque<TokenReply>>,
    me_script: Mutex<VecDeque<MeReply>>,
}

/// Local axum server standing in for www.reddit.com and oauth.reddit.com.
///
/// Replies are taken from the scripts in order; an empty script means
/// success.
#[allow(dead_code)]
#[derive(Clone)]
pub struct FakeReddit {
    pub base_url: String,
    inner: Arc<FakeRedditInner>,
}

#[allow(dead_code)]
pub const FAKE_USERNAME: &str = "spez_fan";

#[allow(dead_code)]
impl FakeReddit {
    pub async fn start() -> Self {
        let inner = Arc::new(FakeRedditInner::default());

        let app = Router::new()
            .route("/api/v1/access_token", post(fake_access_token))
            .route("/api/v1/me", get(fake_me))
            .route("/api/v1/revoke_token", post(fake_revoke))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake Reddit");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            inner,
        }
    }

    pub fn script_token(&self, replies: impl IntoIterator<Item = TokenReply>) {
        self.inner.token_script.lock().unwrap().extend(replies);
    }

    pub fn script_me(&self, replies: impl IntoIterator<Item = MeReply>) {
        self.inner.me_script.lock().unwrap().extend(replies);
    }

    pub fn token_calls(&self) -> usize {
        self.inner.token_calls.load(Ordering::SeqCst)
    }

    pub fn me_calls(&self) -> usize {
        self.inner.me_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.inner.revoke_calls.load(Ordering::SeqCst)
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn fake_access_token(State(inner): State<Arc<FakeRedditInner>>) -> Response {
    inner.token_calls.fetch_add(1, Ordering::SeqCst);
    let reply = inner
        .token_script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(TokenReply::Grant);

    match reply {
        TokenReply::Grant => Json(json!({
            "access_token": "fake_access_token",
            "refresh_token": "fake_refresh_token",
            "token_type": "bearer",
            "expires_in": 86400,
            "scope": "identity read submit"
        }))
        .into_response(),
        TokenReply::Status(code) => {
            (status(code), Json(json!({"message": "error", "error": code}))).into_response()
        }
        // Reddit sends this with a 200.
        TokenReply::InvalidGrant => Json(json!({"error": "invalid_grant"})).into_response(),
    }
}

async fn fake_me(State(inner): State<Arc<FakeRedditInner>>) -> Response {
    inner.me_calls.fetch_add(1, Ordering::SeqCst);
    let reply = inner
        .me_script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(MeReply::User);

    match reply {
        MeReply::User => Json(json!({
            "id": "t2_abc123",
            "name": FAKE_USERNAME,
            "icon_img": "https://styles.redditmedia.com/icon.png?a=1&amp;b=2",
            "total_karma": 1234,
            "link_karma": 1000,
            "comment_karma": 234,
            "is_gold": false,
            "is_mod": true,
            "has_verified_email": true,
            "created_utc": 1_500_000_000.0
        }))
        .into_response(),
        MeReply::Status(code) => (status(code), "error").into_response(),
    }
}

async fn fake_revoke(State(inner): State<Arc<FakeRedditInner>>) -> StatusCode {
    inner.revoke_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

// ─── Test App ────────────────────────────────────────────────

/// Everything a test needs to drive the app.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mem: MemoryDb,
    pub reddit: FakeReddit,
}

/// Test config pointed at the fake Reddit, with a short backoff.
#[allow(dead_code)]
pub fn test_config(reddit: &FakeReddit) -> Config {
    let mut config = Config::test_default();
    config.reddit_www_base_url = reddit.base_url.clone();
    config.reddit_oauth_base_url = reddit.base_url.clone();
    config.reddit_retry = RetryConfig::default().with_base_delay(Duration::from_millis(5));
    config
}

/// Create a test app over an in-memory database and a fake Reddit.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    let reddit = FakeReddit::start().await;
    create_test_app_with_config(test_config(&reddit), reddit)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config, reddit: FakeReddit) -> TestApp {
    let mem = MemoryDb::new();
    let state = Arc::new(
        AppState::new(config, Database::Memory(mem.clone())).expect("Failed to build state"),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        mem,
        reddit,
    }
}

#[allow(dead_code)]
pub fn test_identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        display_name: Some("Test User".to_string()),
        image_url: None,
    }
}

/// Session token for `identity`, signed with the test key.
#[allow(dead_code)]
pub fn session_token(app: &TestApp, identity: &Identity) -> String {
    create_identity_token(identity, &app.state.config.identity_jwt_secret, 3600).unwrap()
}

/// Give `user_id` an active subscription.
#[allow(dead_code)]
pub fn subscribe(app: &TestApp, user_id: &str) {
    app.mem
        .set_subscription(
            SubscriptionTable::Subscriptions,
            &SubscriptionRecord {
                id: format!("sub_{}", user_id),
                user_id: user_id.to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: None,
                current_period_end: None,
                stripe_subscription_id: None,
            },
        )
        .unwrap();
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
