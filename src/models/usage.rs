//! Monthly usage counters.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Per-user usage for one calendar month, keyed by (user id, month start).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserUsageStats {
    pub user_id: String,
    /// First day of the month, `YYYY-MM-DD`
    pub month_start: String,
    #[serde(default)]
    pub subreddit_analysis_count: u32,
    #[serde(default)]
    pub reddit_accounts_connected: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl UserUsageStats {
    /// A zeroed row for a new month.
    pub fn empty(user_id: &str, month_start: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            month_start: month_start.to_string(),
            subreddit_analysis_count: 0,
            reddit_accounts_connected: 0,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Document id for the (user, month) key.
    pub fn doc_id(user_id: &str, month_start: &str) -> String {
        format!("{}_{}", super::key_part(user_id), super::key_part(month_start))
    }
}
