// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! `Database` dispatches to Firestore in production and to process-local
//! maps for local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use crate::models::{
    Profile, RedditAccount, SubscriptionRecord, SubscriptionStatus, SubscriptionTable,
    UserUsageStats,
};

/// Collection names as constants.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const CUSTOMER_SUBSCRIPTIONS: &str = "customer_subscriptions";
    /// Linked Reddit accounts (keyed by user id + username)
    pub const REDDIT_ACCOUNTS: &str = "reddit_accounts";
    /// Monthly usage rows (keyed by user id + month start)
    pub const USER_USAGE_STATS: &str = "user_usage_stats";
}

/// Storage handle shared by all services.
#[derive(Clone)]
pub enum Database {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl Database {
    /// Connect to the backend selected in `config`.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        match config.storage_backend {
            StorageBackend::Firestore => Ok(Self::Firestore(
                FirestoreDb::new(&config.gcp_project_id).await?,
            )),
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::Memory(MemoryDb::new()))
            }
        }
    }

    // ─── Profile Operations ──────────────────────────────────────

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        match self {
            Self::Firestore(db) => db.get_profile(user_id).await,
            Self::Memory(db) => db.get_profile(user_id),
        }
    }

    /// Upsert keyed by profile id, keeping the stored `role` and `created_at`.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, AppError> {
        match self {
            Self::Firestore(db) => db.upsert_profile(profile).await,
            Self::Memory(db) => db.upsert_profile(profile),
        }
    }

    // ─── Subscription Operations ─────────────────────────────────

    /// Find one row for `user_id` in `table` whose status is any of `statuses`.
    pub async fn find_subscription(
        &self,
        table: SubscriptionTable,
        user_id: &str,
        statuses: &[SubscriptionStatus],
    ) -> Result<Option<SubscriptionRecord>, AppError> {
        match self {
            Self::Firestore(db) => db.find_subscription(table, user_id, statuses).await,
            Self::Memory(db) => db.find_subscription(table, user_id, statuses),
        }
    }

    /// Write a subscription row. Billing sync and test seeding only.
    pub async fn set_subscription(
        &self,
        table: SubscriptionTable,
        record: &SubscriptionRecord,
    ) -> Result<(), AppError> {
        match self {
            Self::Firestore(db) => db.set_subscription(table, record).await,
            Self::Memory(db) => db.set_subscription(table, record),
        }
    }

    // ─── Reddit Account Operations ───────────────────────────────

    pub async fn get_reddit_account(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<Option<RedditAccount>, AppError> {
        match self {
            Self::Firestore(db) => db.get_reddit_account(user_id, username).await,
            Self::Memory(db) => db.get_reddit_account(user_id, username),
        }
    }

    pub async fn list_reddit_accounts(&self, user_id: &str) -> Result<Vec<RedditAccount>, AppError> {
        match self {
            Self::Firestore(db) => db.list_reddit_accounts(user_id).await,
            Self::Memory(db) => db.list_reddit_accounts(user_id),
        }
    }

    pub async fn set_reddit_account(&self, account: &RedditAccount) -> Result<(), AppError> {
        match self {
            Self::Firestore(db) => db.set_reddit_account(account).await,
            Self::Memory(db) => db.set_reddit_account(account),
        }
    }

    pub async fn delete_reddit_account(&self, user_id: &str, username: &str) -> Result<(), AppError> {
        match self {
            Self::Firestore(db) => db.delete_reddit_account(user_id, username).await,
            Self::Memory(db) => db.delete_reddit_account(user_id, username),
        }
    }

    // ─── Usage Operations ────────────────────────────────────────

    /// Create the (user, month) usage row unless it already exists.
    ///
    /// Returns the stored row; existing counters are never reset.
    pub async fn ensure_usage_stats(
        &self,
        user_id: &str,
        month_start: &str,
    ) -> Result<UserUsageStats, AppError> {
        match self {
            Self::Firestore(db) => db.ensure_usage_stats(user_id, month_start).await,
            Self::Memory(db) => db.ensure_usage_stats(user_id, month_start),
        }
    }
}
