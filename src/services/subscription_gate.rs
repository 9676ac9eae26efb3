// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription gate: may this user use the application?
//!
//! Subscription rows can live in either of two tables, so both are checked.
//! Any lookup error grants access (fail-open).

use crate::db::Database;
use crate::models::{
    DenyReason, Entitlement, GrantReason, ProfileRole, SubscriptionStatus, SubscriptionTable,
};

/// Ordered lookups: the first table is queried for both granting statuses
/// at once, the second one status at a time.
const GATE_LOOKUPS: [(SubscriptionTable, &[SubscriptionStatus]); 3] = [
    (
        SubscriptionTable::Subscriptions,
        &[SubscriptionStatus::Active, SubscriptionStatus::Trialing],
    ),
    (
        SubscriptionTable::CustomerSubscriptions,
        &[SubscriptionStatus::Active],
    ),
    (
        SubscriptionTable::CustomerSubscriptions,
        &[SubscriptionStatus::Trialing],
    ),
];

#[derive(Clone)]
pub struct SubscriptionGate {
    db: Database,
}

impl SubscriptionGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// True if the user has an active or trialing subscription in either
    /// table, or if any lookup failed.
    pub async fn has_active_subscription(&self, user_id: &str) -> bool {
        matches!(
            self.check_subscriptions(user_id).await,
            Entitlement::Granted(_)
        )
    }

    /// Full evaluation, including the admin/gift role bypass.
    pub async fn evaluate(&self, user_id: &str) -> Entitlement {
        match self.db.get_profile(user_id).await {
            Ok(Some(profile)) => {
                if let Some(role) = profile.role.filter(ProfileRole::bypasses_subscription) {
                    tracing::debug!(user_id, ?role, "Access granted by role");
                    return Entitlement::Granted(GrantReason::RoleBypass { role });
                }
            }
            Ok(None) => {}
            Err(e) => {
                // The subscription tables still decide.
                tracing::warn!(user_id, error = %e, "Profile lookup failed, skipping role bypass");
            }
        }

        self.check_subscriptions(user_id).await
    }

    async fn check_subscriptions(&self, user_id: &str) -> Entitlement {
        for (table, statuses) in GATE_LOOKUPS {
            match self.db.find_subscription(table, user_id, statuses).await {
                Ok(Some(row)) => {
                    tracing::debug!(user_id, %table, status = %row.status, "Subscription found");
                    return Entitlement::Granted(GrantReason::Subscription {
                        table,
                        status: row.status,
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        %table,
                        error = %e,
                        "Subscription lookup failed, granting access"
                    );
                    return Entitlement::Granted(GrantReason::FailOpen {
                        reason: format!("{} lookup failed", table),
                    });
                }
            }
        }

        Entitlement::Denied(DenyReason::NoSubscription)
    }
}
