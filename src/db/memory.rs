// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory storage backend.
//!
//! Mirrors the Firestore collections with `DashMap`s. Individual collections
//! can be switched into a failing state to exercise error paths.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    Profile, RedditAccount, SubscriptionRecord, SubscriptionStatus, SubscriptionTable,
    UserUsageStats,
};
use crate::time_utils::now_rfc3339;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    profiles: DashMap<String, Profile>,
    subscriptions: DashMap<String, SubscriptionRecord>,
    customer_subscriptions: DashMap<String, SubscriptionRecord>,
    reddit_accounts: DashMap<String, RedditAccount>,
    user_usage_stats: DashMap<String, UserUsageStats>,
    failing: DashSet<&'static str>,
}

/// Process-local database.
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<Tables>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail until cleared.
    pub fn fail_collection(&self, collection: &'static str) {
        self.tables.failing.insert(collection);
    }

    pub fn clear_failures(&self) {
        self.tables.failing.clear();
    }

    fn check(&self, collection: &'static str) -> Result<(), AppError> {
        if self.tables.failing.contains(collection) {
            return Err(AppError::Database(format!(
                "{} unavailable (injected failure)",
                collection
            )));
        }
        Ok(())
    }

    fn subscription_table(&self, table: SubscriptionTable) -> &DashMap<String, SubscriptionRecord> {
        match table {
            SubscriptionTable::Subscriptions => &self.tables.subscriptions,
            SubscriptionTable::CustomerSubscriptions => &self.tables.customer_subscriptions,
        }
    }

    // ─── Profile Operations ──────────────────────────────────────

    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        self.check(collections::PROFILES)?;
        Ok(self.tables.profiles.get(user_id).map(|p| p.clone()))
    }

    pub fn upsert_profile(&self, update: &Profile) -> Result<Profile, AppError> {
        self.check(collections::PROFILES)?;
        let mut entry = self
            .tables
            .profiles
            .entry(update.id.clone())
            .or_insert_with(|| update.clone());
        entry.merge_identity_fields(update);
        Ok(entry.clone())
    }

    /// Set a profile wholesale (role assignment in tests and tooling).
    pub fn put_profile(&self, profile: Profile) {
        self.tables.profiles.insert(profile.id.clone(), profile);
    }

    // ─── Subscription Operations ─────────────────────────────────

    pub fn find_subscription(
        &self,
        table: SubscriptionTable,
        user_id: &str,
        statuses: &[SubscriptionStatus],
    ) -> Result<Option<SubscriptionRecord>, AppError> {
        self.check(table.collection())?;
        Ok(self
            .subscription_table(table)
            .iter()
            .find(|row| row.user_id == user_id && statuses.contains(&row.status))
            .map(|row| row.clone()))
    }

    pub fn set_subscription(
        &self,
        table: SubscriptionTable,
        record: &SubscriptionRecord,
    ) -> Result<(), AppError> {
        self.check(table.collection())?;
        self.subscription_table(table)
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    // ─── Reddit Account Operations ───────────────────────────────

    pub fn get_reddit_account(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<Option<RedditAccount>, AppError> {
        self.check(collections::REDDIT_ACCOUNTS)?;
        Ok(self
            .tables
            .reddit_accounts
            .get(&RedditAccount::doc_id(user_id, username))
            .filter(|a| a.is_keyed_by(user_id, username))
            .map(|a| a.clone()))
    }

    pub fn list_reddit_accounts(&self, user_id: &str) -> Result<Vec<RedditAccount>, AppError> {
        self.check(collections::REDDIT_ACCOUNTS)?;
        let mut accounts: Vec<RedditAccount> = self
            .tables
            .reddit_accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.clone())
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }

    pub fn set_reddit_account(&self, account: &RedditAccount) -> Result<(), AppError> {
        self.check(collections::REDDIT_ACCOUNTS)?;
        self.tables.reddit_accounts.insert(
            RedditAccount::doc_id(&account.user_id, &account.username),
            account.clone(),
        );
        Ok(())
    }

    pub fn delete_reddit_account(&self, user_id: &str, username: &str) -> Result<(), AppError> {
        self.check(collections::REDDIT_ACCOUNTS)?;
        self.tables
            .reddit_accounts
            .remove(&RedditAccount::doc_id(user_id, username));
        Ok(())
    }

    /// Number of stored account records across all users.
    pub fn reddit_account_count(&self) -> usize {
        self.tables.reddit_accounts.len()
    }

    // ─── Usage Operations ────────────────────────────────────────

    pub fn ensure_usage_stats(
        &self,
        user_id: &str,
        month_start: &str,
    ) -> Result<UserUsageStats, AppError> {
        self.check(collections::USER_USAGE_STATS)?;
        let entry = self
            .tables
            .user_usage_stats
            .entry(UserUsageStats::doc_id(user_id, month_start))
            .or_insert_with(|| UserUsageStats::empty(user_id, month_start, &now_rfc3339()));
        Ok(entry.clone())
    }

    /// Overwrite a usage row (test seeding).
    pub fn put_usage_stats(&self, stats: UserUsageStats) {
        self.tables.user_usage_stats.insert(
            UserUsageStats::doc_id(&stats.user_id, &stats.month_start),
            stats,
        );
    }
}
