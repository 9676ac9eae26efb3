// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Profiles (identity mirror)
//! - Subscriptions (both subscription tables, read-mostly)
//! - Reddit accounts (encrypted OAuth tokens + profile snapshot)
//! - Usage stats (one row per user per month)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    Profile, RedditAccount, SubscriptionRecord, SubscriptionStatus, SubscriptionTable,
    UserUsageStats,
};
use crate::time_utils::now_rfc3339;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by identity id.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a profile, keeping locally-owned fields.
    pub async fn upsert_profile(&self, update: &Profile) -> Result<Profile, AppError> {
        let profile = match self.get_profile(&update.id).await? {
            Some(mut existing) => {
                existing.merge_identity_fields(update);
                existing
            }
            None => update.clone(),
        };

        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&profile.id)
            .object(&profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(profile)
    }

    // ─── Subscription Operations ─────────────────────────────────

    /// Find a subscription row for a user with any of the given statuses.
    ///
    /// Issued as one equality query per status, stopping at the first hit.
    pub async fn find_subscription(
        &self,
        table: SubscriptionTable,
        user_id: &str,
        statuses: &[SubscriptionStatus],
    ) -> Result<Option<SubscriptionRecord>, AppError> {
        let client = &self.client;

        for status in statuses {
            let user_id = user_id.to_string();
            let status = status.as_str();
            let rows: Vec<SubscriptionRecord> = client
                .fluent()
                .select()
                .from(table.collection())
                .filter(move |q| {
                    q.for_all([
                        q.field("user_id").eq(user_id.clone()),
                        q.field("status").eq(status),
                    ])
                })
                .limit(1)
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row));
            }
        }

        Ok(None)
    }

    /// Store a subscription row (document id = subscription id).
    pub async fn set_subscription(
        &self,
        table: SubscriptionTable,
        record: &SubscriptionRecord,
    ) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(table.collection())
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Reddit Account Operations ───────────────────────────────

    pub async fn get_reddit_account(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<Option<RedditAccount>, AppError> {
        let account: Option<RedditAccount> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::REDDIT_ACCOUNTS)
            .obj()
            .one(&RedditAccount::doc_id(user_id, username))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(account.filter(|a| a.is_keyed_by(user_id, username)))
    }

    /// All accounts linked by a user.
    pub async fn list_reddit_accounts(&self, user_id: &str) -> Result<Vec<RedditAccount>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::REDDIT_ACCOUNTS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or replace an account record under its composite key.
    pub async fn set_reddit_account(&self, account: &RedditAccount) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::REDDIT_ACCOUNTS)
            .document_id(RedditAccount::doc_id(&account.user_id, &account.username))
            .object(account)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_reddit_account(&self, user_id: &str, username: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collections::REDDIT_ACCOUNTS)
            .document_id(RedditAccount::doc_id(user_id, username))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Usage Operations ────────────────────────────────────────

    /// Create the usage row for (user, month) if missing.
    pub async fn ensure_usage_stats(
        &self,
        user_id: &str,
        month_start: &str,
    ) -> Result<UserUsageStats, AppError> {
        let doc_id = UserUsageStats::doc_id(user_id, month_start);
        let client = &self.client;

        let existing: Option<UserUsageStats> = client
            .fluent()
            .select()
            .by_id_in(collections::USER_USAGE_STATS)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(stats) = existing {
            return Ok(stats);
        }

        let stats = UserUsageStats::empty(user_id, month_start, &now_rfc3339());
        let _: () = client
            .fluent()
            .update()
            .in_col(collections::USER_USAGE_STATS)
            .document_id(&doc_id)
            .object(&stats)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(user_id, month_start, "Created usage stats row");
        Ok(stats)
    }
}
