//! Linked Reddit account model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A Reddit account linked to a local user, keyed by (user id, username).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditAccount {
    pub user_id: String,
    pub username: String,
    /// Reddit's account id (`t2_` suffix)
    pub reddit_id: String,
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires (RFC 3339)
    pub token_expiry: String,
    /// Granted OAuth scopes
    pub scope: Vec<String>,
    pub avatar_url: Option<String>,
    pub total_karma: i64,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub awardee_karma: i64,
    pub awarder_karma: i64,
    pub is_gold: bool,
    pub is_mod: bool,
    pub has_verified_email: bool,
    /// Reddit account creation time (RFC 3339)
    pub reddit_created_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_used_at: Option<String>,
}

impl RedditAccount {
    /// Document id for the composite key.
    ///
    /// Both parts are percent-encoded so `_` inside a username can't collide.
    pub fn doc_id(user_id: &str, username: &str) -> String {
        format!(
            "{}_{}",
            super::key_part(user_id),
            super::key_part(&username.to_ascii_lowercase())
        )
    }

    /// True if this record is the (user, username) account.
    pub fn is_keyed_by(&self, user_id: &str, username: &str) -> bool {
        self.user_id == user_id && self.username.eq_ignore_ascii_case(username)
    }

    /// AAD binding encrypted tokens to this account.
    pub fn token_aad(user_id: &str, username: &str) -> String {
        format!("reddit_account:{}:{}", user_id, username.to_ascii_lowercase())
    }

    pub fn summary(&self) -> RedditAccountSummary {
        RedditAccountSummary {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            total_karma: self.total_karma,
            link_karma: self.link_karma,
            comment_karma: self.comment_karma,
            is_gold: self.is_gold,
            is_mod: self.is_mod,
            has_verified_email: self.has_verified_email,
            scope: self.scope.clone(),
            connected_at: self.created_at.clone(),
            last_used_at: self.last_used_at.clone(),
        }
    }
}

/// Account as exposed to the frontend (no tokens).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RedditAccountSummary {
    pub username: String,
    pub avatar_url: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_karma: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub link_karma: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub comment_karma: i64,
    pub is_gold: bool,
    pub is_mod: bool,
    pub has_verified_email: bool,
    pub scope: Vec<String>,
    pub connected_at: String,
    pub last_used_at: Option<String>,
}
