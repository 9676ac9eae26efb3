// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup. A `.env` file is honored for local
//! development.

use crate::services::retry::RetryConfig;
use std::env;
use std::str::FromStr;

/// Where persistent records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Google Firestore (or the emulator when `FIRESTORE_EMULATOR_HOST` is set).
    Firestore,
    /// Process-local maps, lost on restart. Local development and tests.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Reddit OAuth client ID (public)
    pub reddit_client_id: String,
    /// Callback URL registered with the Reddit app
    pub reddit_redirect_uri: String,
    /// User-Agent sent on every Reddit request
    pub reddit_user_agent: String,
    /// Base URL for authorize/token/revoke endpoints
    pub reddit_www_base_url: String,
    /// Base URL for bearer-token API calls
    pub reddit_oauth_base_url: String,
    /// Frontend URL for post-OAuth redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Storage backend selection
    pub storage_backend: StorageBackend,
    /// Server port
    pub port: u16,
    /// Backoff used for Reddit token exchange and user-info calls
    pub reddit_retry: RetryConfig,

    // --- Secrets ---
    /// Reddit OAuth client secret
    pub reddit_client_secret: String,
    /// Shared secret the identity provider signs session JWTs with
    pub identity_jwt_secret: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Input key material for encrypting stored Reddit tokens
    pub token_encryption_key: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            reddit_client_id: "test_client_id".to_string(),
            reddit_redirect_uri: "http://localhost:8080/auth/reddit/callback".to_string(),
            reddit_user_agent: "web:subpirate-test:v0.1.0".to_string(),
            reddit_www_base_url: "https://www.reddit.com".to_string(),
            reddit_oauth_base_url: "https://oauth.reddit.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            storage_backend: StorageBackend::Memory,
            port: 8080,
            reddit_retry: RetryConfig::default(),
            reddit_client_secret: "test_secret".to_string(),
            identity_jwt_secret: b"test_identity_key_32_bytes_min!!".to_vec(),
            oauth_state_key: b"test_state_key".to_vec(),
            token_encryption_key: b"test_token_encryption_key".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        Ok(Self {
            reddit_client_id: required("REDDIT_CLIENT_ID")?,
            reddit_redirect_uri: env::var("REDDIT_REDIRECT_URI")
                .unwrap_or_else(|_| format!("http://localhost:{}/auth/reddit/callback", port)),
            reddit_user_agent: env::var("REDDIT_USER_AGENT").unwrap_or_else(|_| {
                format!("web:subpirate:v{}", env!("CARGO_PKG_VERSION"))
            }),
            reddit_www_base_url: env::var("REDDIT_WWW_BASE_URL")
                .unwrap_or_else(|_| "https://www.reddit.com".to_string()),
            reddit_oauth_base_url: env::var("REDDIT_OAUTH_BASE_URL")
                .unwrap_or_else(|_| "https://oauth.reddit.com".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StorageBackend::Firestore))?,
            port,
            reddit_retry: RetryConfig::default(),

            reddit_client_secret: required("REDDIT_CLIENT_SECRET")?,
            identity_jwt_secret: required("IDENTITY_JWT_SECRET")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
            token_encryption_key: required("TOKEN_ENCRYPTION_KEY")?.into_bytes(),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("REDDIT_CLIENT_ID", "test_id");
        env::set_var("REDDIT_CLIENT_SECRET", " test_secret\n");
        env::set_var("IDENTITY_JWT_SECRET", "test_identity_key_32_bytes_min!!");
        env::set_var("OAUTH_STATE_KEY", "state_key");
        env::set_var("TOKEN_ENCRYPTION_KEY", "token_key");
        env::set_var("STORAGE_BACKEND", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.reddit_client_id, "test_id");
        assert_eq!(config.reddit_client_secret, "test_secret");
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.reddit_retry.max_attempts, 3);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
        assert!("postgres".parse::<StorageBackend>().is_err());
    }
}
