// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reddit API client and linked-account service.
//!
//! Handles:
//! - Authorization URL construction
//! - Code-for-token exchange (with backoff on server errors)
//! - User-info fetch (with backoff on rate limiting)
//! - Token refresh when expired
//! - Token revocation on disconnect

use crate::error::AppError;
use crate::services::retry::{retry_with_backoff, RetryConfig};
use serde::Deserialize;

/// Scopes requested on every authorization.
pub const REDDIT_SCOPES: &[&str] = &[
    "identity",
    "read",
    "submit",
    "subscribe",
    "history",
    "mysubreddits",
    "privatemessages",
    "save",
    "vote",
    "edit",
    "flair",
    "report",
];

/// Failure talking to Reddit.
#[derive(Debug, thiserror::Error)]
pub enum RedditError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Reddit answered `invalid_grant` to a code exchange.
    #[error("authorization code already used")]
    CodeAlreadyUsed,

    /// Reddit answered `invalid_grant` to a refresh: the grant was revoked.
    #[error("refresh token revoked")]
    RefreshTokenRevoked,

    #[error("Reddit returned error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl RedditError {
    fn status(&self) -> Option<u16> {
        match self {
            RedditError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Worth retrying a token exchange: server errors and network failures.
    pub fn is_server_or_transport(&self) -> bool {
        matches!(self, RedditError::Transport(_)) || self.status().is_some_and(|s| s >= 500)
    }

    /// Worth retrying a user-info call: rate limiting and network failures.
    pub fn is_rate_limited_or_transport(&self) -> bool {
        matches!(self, RedditError::Transport(_)) || self.status() == Some(429)
    }
}

impl From<RedditError> for AppError {
    fn from(err: RedditError) -> Self {
        match err {
            RedditError::Status { status: 401, .. } | RedditError::RefreshTokenRevoked => {
                AppError::RedditApi(AppError::REDDIT_TOKEN_ERROR.to_string())
            }
            RedditError::CodeAlreadyUsed => AppError::RedditApi("invalid_grant".to_string()),
            other => AppError::RedditApi(other.to_string()),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    /// Granted scopes, falling back to the requested list when omitted.
    pub fn scopes(&self) -> Vec<String> {
        let granted: Vec<String> = self
            .scope
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if granted.is_empty() {
            REDDIT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            granted
        }
    }
}

/// `/api/v1/me` response (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct RedditMe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon_img: Option<String>,
    #[serde(default)]
    pub snoovatar_img: Option<String>,
    #[serde(default)]
    pub total_karma: i64,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
    #[serde(default)]
    pub awardee_karma: i64,
    #[serde(default)]
    pub awarder_karma: i64,
    #[serde(default)]
    pub is_gold: bool,
    #[serde(default)]
    pub is_mod: bool,
    #[serde(default)]
    pub has_verified_email: Option<bool>,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

impl RedditMe {
    /// Preferred avatar, with Reddit's HTML escaping undone.
    pub fn avatar_url(&self) -> Option<String> {
        self.snoovatar_img
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.icon_img.as_deref().filter(|s| !s.is_empty()))
            .map(|s| s.replace("&amp;", "&"))
    }

    pub fn created_at(&self) -> Option<String> {
        let secs = self.created_utc?;
        chrono::DateTime::from_timestamp(secs as i64, 0).map(crate::time_utils::format_utc_rfc3339)
    }
}

/// Error body shape used by the token endpoint.
#[derive(Deserialize)]
struct OAuthErrorBody {
    error: serde_json::Value,
}

/// Reddit API client.
#[derive(Clone)]
pub struct RedditClient {
    http: reqwest::Client,
    www_base_url: String,
    oauth_base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    retry: RetryConfig,
}

impl RedditClient {
    /// Create a client from application config.
    pub fn new(config: &crate::config::Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(config.reddit_user_agent.clone())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            www_base_url: config.reddit_www_base_url.trim_end_matches('/').to_string(),
            oauth_base_url: config.reddit_oauth_base_url.trim_end_matches('/').to_string(),
            client_id: config.reddit_client_id.clone(),
            client_secret: config.reddit_client_secret.clone(),
            redirect_uri: config.reddit_redirect_uri.clone(),
            retry: config.reddit_retry.clone(),
        })
    }

    /// URL the browser is sent to for consent.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/api/v1/authorize?\
             client_id={}&\
             response_type=code&\
             state={}&\
             redirect_uri={}&\
             duration=permanent&\
             scope={}",
            self.www_base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(state),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&REDDIT_SCOPES.join(" "))
        )
    }

    /// Exchange an authorization code, retrying server and network errors.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, RedditError> {
        retry_with_backoff(
            &self.retry,
            "reddit_token_exchange",
            RedditError::is_server_or_transport,
            |attempt| {
                tracing::debug!(attempt, "Exchanging Reddit authorization code");
                self.exchange_code_once(code)
            },
        )
        .await
    }

    async fn exchange_code_once(&self, code: &str) -> Result<TokenResponse, RedditError> {
        self.post_token_form(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
            RedditError::CodeAlreadyUsed,
        )
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, RedditError> {
        self.post_token_form(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            RedditError::RefreshTokenRevoked,
        )
        .await
    }

    /// Revoke a token so Reddit forgets the grant.
    pub async fn revoke_token(&self, token: &str, token_type_hint: &str) -> Result<(), RedditError> {
        let response = self
            .http
            .post(format!("{}/api/v1/revoke_token", self.www_base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", token_type_hint)])
            .send()
            .await
            .map_err(|e| RedditError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedditError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Fetch the authenticated account, retrying rate limiting.
    pub async fn fetch_me(&self, access_token: &str) -> Result<RedditMe, RedditError> {
        retry_with_backoff(
            &self.retry,
            "reddit_fetch_me",
            RedditError::is_rate_limited_or_transport,
            |_| self.fetch_me_once(access_token),
        )
        .await
    }

    async fn fetch_me_once(&self, access_token: &str) -> Result<RedditMe, RedditError> {
        let response = self
            .http
            .get(format!("{}/api/v1/me", self.oauth_base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| RedditError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                tracing::warn!("Reddit rate limit hit (429)");
            }
            return Err(RedditError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RedditError::Parse(format!("JSON parse error: {}", e)))
    }

    /// POST to the token endpoint with Basic client credentials.
    ///
    /// Reddit reports some failures (notably `invalid_grant`) in a JSON body
    /// that may arrive with a 200, so the body is inspected before the
    /// status. `invalid_grant` is reported as `on_invalid_grant`.
    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
        on_invalid_grant: RedditError,
    ) -> Result<TokenResponse, RedditError> {
        let response = self
            .http
            .post(format!("{}/api/v1/access_token", self.www_base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| RedditError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RedditError::Transport(e.to_string()))?;

        if let Ok(OAuthErrorBody { error }) = serde_json::from_str::<OAuthErrorBody>(&body) {
            let code = match &error {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if code == "invalid_grant" {
                return Err(on_invalid_grant);
            }
            if status.is_success() {
                return Err(RedditError::Api(code));
            }
        }

        if !status.is_success() {
            tracing::error!(status = %status, "Reddit token endpoint failed");
            return Err(RedditError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| RedditError::Parse(format!("Failed to parse token response: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RedditService - linked accounts with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Database;
use crate::models::{RedditAccount, RedditAccountSummary};
use crate::services::token_cipher::{encrypt_tokens, TokenCipher};
use crate::time_utils::{format_utc_rfc3339, month_start, now_rfc3339};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache, keyed by account document id.
pub type TokenCache = Arc<DashMap<String, CachedToken>>;

/// Per-account refresh locks.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Linked Reddit accounts: persistence, token lifecycle and API calls.
#[derive(Clone)]
pub struct RedditService {
    client: RedditClient,
    db: Database,
    cipher: TokenCipher,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
}

impl RedditService {
    pub fn new(client: RedditClient, db: Database, cipher: TokenCipher) -> Self {
        Self {
            client,
            db,
            cipher,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn client(&self) -> &RedditClient {
        &self.client
    }

    /// Upsert the (user, username) account from a fresh grant and make sure
    /// this month's usage row exists.
    pub async fn persist_connection(
        &self,
        user_id: &str,
        tokens: &TokenResponse,
        me: &RedditMe,
    ) -> Result<RedditAccount, AppError> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::RedditApi("Grant is missing a refresh token".to_string()))?;

        let now = Utc::now();
        let now_str = format_utc_rfc3339(now);
        let expires_at = now + Duration::seconds(tokens.expires_in);

        let aad = RedditAccount::token_aad(user_id, &me.name);
        let (access_enc, refresh_enc) =
            encrypt_tokens(&self.cipher, &tokens.access_token, refresh_token, &aad)?;

        let created_at = self
            .db
            .get_reddit_account(user_id, &me.name)
            .await?
            .map(|existing| existing.created_at)
            .unwrap_or_else(|| now_str.clone());

        let account = RedditAccount {
            user_id: user_id.to_string(),
            username: me.name.clone(),
            reddit_id: me.id.clone(),
            access_token_encrypted: access_enc,
            refresh_token_encrypted: refresh_enc,
            token_expiry: format_utc_rfc3339(expires_at),
            scope: tokens.scopes(),
            avatar_url: me.avatar_url(),
            total_karma: me.total_karma,
            link_karma: me.link_karma,
            comment_karma: me.comment_karma,
            awardee_karma: me.awardee_karma,
            awarder_karma: me.awarder_karma,
            is_gold: me.is_gold,
            is_mod: me.is_mod,
            has_verified_email: me.has_verified_email.unwrap_or(false),
            reddit_created_at: me.created_at(),
            created_at,
            updated_at: now_str.clone(),
            last_used_at: Some(now_str),
        };

        self.db.set_reddit_account(&account).await?;

        self.token_cache.insert(
            RedditAccount::doc_id(user_id, &me.name),
            CachedToken {
                access_token: tokens.access_token.clone(),
                expires_at,
            },
        );

        self.db.ensure_usage_stats(user_id, &month_start(now)).await?;

        tracing::info!(user_id, username = %me.name, "Reddit account stored");
        Ok(account)
    }

    /// Linked accounts for a user, without tokens.
    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<RedditAccountSummary>, AppError> {
        Ok(self
            .db
            .list_reddit_accounts(user_id)
            .await?
            .iter()
            .map(RedditAccount::summary)
            .collect())
    }

    async fn load_account(&self, user_id: &str, username: &str) -> Result<RedditAccount, AppError> {
        self.db
            .get_reddit_account(user_id, username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reddit account {}", username)))
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for a linked account.
    ///
    /// Checks the in-memory cache, then the stored record, and refreshes
    /// with Reddit when the token is within the refresh margin. Refreshes
    /// for one account are serialized.
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<String, AppError> {
        let key = RedditAccount::doc_id(user_id, username);
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(cached) = self.token_cache.get(&key) {
            if Utc::now() + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.load_or_refresh(&key, user_id, username, margin).await
        };

        // Drop the lock entry once no other task is waiting on it.
        drop(lock);
        self.refresh_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Body of `get_valid_access_token`, run under the account's refresh lock.
    async fn load_or_refresh(
        &self,
        key: &str,
        user_id: &str,
        username: &str,
        margin: Duration,
    ) -> Result<String, AppError> {
        // Another task may have refreshed while we were waiting.
        if let Some(cached) = self.token_cache.get(key) {
            if Utc::now() + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let mut account = self.load_account(user_id, username).await?;
        let aad = RedditAccount::token_aad(user_id, username);

        let expires_at = DateTime::parse_from_rfc3339(&account.token_expiry)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
            .with_timezone(&Utc);

        if Utc::now() + margin < expires_at {
            let access_token = self
                .cipher
                .decrypt(&account.access_token_encrypted, aad.as_bytes())?;
            self.token_cache.insert(
                key.to_string(),
                CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                },
            );
            return Ok(access_token);
        }

        tracing::info!(user_id, username, "Reddit access token expired, refreshing");

        let refresh_token = self
            .cipher
            .decrypt(&account.refresh_token_encrypted, aad.as_bytes())?;
        let refreshed = self.client.refresh_token(&refresh_token).await?;

        // Reddit usually keeps the refresh token unchanged and omits it.
        let new_refresh = refreshed.refresh_token.as_deref().unwrap_or(&refresh_token);
        let (access_enc, refresh_enc) =
            encrypt_tokens(&self.cipher, &refreshed.access_token, new_refresh, &aad)?;
        let new_expires_at = Utc::now() + Duration::seconds(refreshed.expires_in);

        account.access_token_encrypted = access_enc;
        account.refresh_token_encrypted = refresh_enc;
        account.token_expiry = format_utc_rfc3339(new_expires_at);
        account.updated_at = now_rfc3339();
        self.db.set_reddit_account(&account).await?;

        self.token_cache.insert(
            key.to_string(),
            CachedToken {
                access_token: refreshed.access_token.clone(),
                expires_at: new_expires_at,
            },
        );

        tracing::info!(user_id, username, "Reddit token refreshed and cached");
        Ok(refreshed.access_token)
    }

    /// Re-fetch the Reddit profile and update the stored snapshot.
    pub async fn sync_account(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<RedditAccountSummary, AppError> {
        let access_token = self.get_valid_access_token(user_id, username).await?;
        let me = self.client.fetch_me(&access_token).await.map_err(|e| {
            let err = AppError::from(e);
            if err.is_reddit_token_error() {
                self.token_cache.remove(&RedditAccount::doc_id(user_id, username));
            }
            err
        })?;

        let mut account = self.load_account(user_id, username).await?;
        let now = now_rfc3339();
        account.reddit_id = me.id.clone();
        account.avatar_url = me.avatar_url();
        account.total_karma = me.total_karma;
        account.link_karma = me.link_karma;
        account.comment_karma = me.comment_karma;
        account.awardee_karma = me.awardee_karma;
        account.awarder_karma = me.awarder_karma;
        account.is_gold = me.is_gold;
        account.is_mod = me.is_mod;
        account.has_verified_email = me.has_verified_email.unwrap_or(false);
        account.reddit_created_at = me.created_at();
        account.updated_at = now.clone();
        account.last_used_at = Some(now);
        self.db.set_reddit_account(&account).await?;

        Ok(account.summary())
    }

    /// Revoke the grant with Reddit (best effort) and delete the record.
    pub async fn disconnect(&self, user_id: &str, username: &str) -> Result<(), AppError> {
        let account = self.load_account(user_id, username).await?;
        let aad = RedditAccount::token_aad(user_id, username);

        match self
            .cipher
            .decrypt(&account.refresh_token_encrypted, aad.as_bytes())
        {
            Ok(refresh_token) => {
                if let Err(e) = self
                    .client
                    .revoke_token(&refresh_token, "refresh_token")
                    .await
                {
                    tracing::warn!(error = %e, user_id, username, "Reddit revoke failed, deleting anyway");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id, username, "Failed to decrypt tokens (skipping revoke)");
            }
        }

        self.db.delete_reddit_account(user_id, username).await?;
        let key = RedditAccount::doc_id(user_id, username);
        self.token_cache.remove(&key);
        self.refresh_locks.remove(&key);

        tracing::info!(user_id, username, "Reddit account disconnected");
        Ok(())
    }
}
