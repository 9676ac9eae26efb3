// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod entitlement;
pub mod profile;
pub mod reddit_account;
pub mod subscription;
pub mod usage;

pub use entitlement::{DenyReason, Entitlement, GrantReason};
pub use profile::{Identity, Profile, ProfileRole};
pub use reddit_account::{RedditAccount, RedditAccountSummary};
pub use subscription::{SubscriptionRecord, SubscriptionStatus, SubscriptionTable};
pub use usage::UserUsageStats;

/// Escape one part of a composite document id.
///
/// Parts are joined with `_`, so `_` itself is percent-encoded here along
/// with everything `urlencoding` escapes.
pub(crate) fn key_part(value: &str) -> String {
    urlencoding::encode(value).replace('_', "%5F")
}
