// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mirrors identities into the `profiles` collection.
//!
//! Sync is fire-and-forget: a failed upsert is logged and the caller carries
//! on with no profile.

use crate::db::Database;
use crate::models::{Identity, Profile};
use crate::time_utils::now_rfc3339;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a synced snapshot suppresses further upserts.
const SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Tracks the last identity synced per user so unchanged identities don't
/// hit the database on every request.
#[derive(Clone)]
pub struct SessionSync {
    db: Database,
    synced: Arc<DashMap<String, (Identity, Instant)>>,
}

impl SessionSync {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            synced: Arc::new(DashMap::new()),
        }
    }

    /// Record that `identity` was seen; spawn a profile upsert if it changed.
    ///
    /// Returns whether a sync was started. Must be called inside a Tokio
    /// runtime.
    pub fn observe(&self, identity: &Identity) -> bool {
        self.observe_at(identity, Instant::now())
    }

    fn observe_at(&self, identity: &Identity, now: Instant) -> bool {
        if self.synced.get(&identity.id).is_some_and(|last| {
            last.0 == *identity && now.duration_since(last.1) < SNAPSHOT_TTL
        }) {
            return false;
        }

        self.synced
            .retain(|_, (_, seen_at)| now.duration_since(*seen_at) < SNAPSHOT_TTL);
        self.synced
            .insert(identity.id.clone(), (identity.clone(), now));

        let this = self.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            this.sync(&identity).await;
        });
        true
    }

    /// Upsert the profile for `identity` now.
    ///
    /// Returns `None` on failure; the error is logged and swallowed.
    pub async fn sync(&self, identity: &Identity) -> Option<Profile> {
        let update = Profile::from_identity(identity, &now_rfc3339());

        match self.db.upsert_profile(&update).await {
            Ok(profile) => {
                tracing::debug!(user_id = %identity.id, "Profile synced");
                Some(profile)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %identity.id,
                    error = %e,
                    "Failed to sync profile, continuing without one"
                );
                // Forget the snapshot so the next observation tries again.
                self.synced
                    .remove_if(&identity.id, |_, last| last.0 == *identity);
                None
            }
        }
    }
}
