//! Typed outcome of the subscription gate.

use super::{ProfileRole, SubscriptionStatus, SubscriptionTable};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Why a user may use the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum GrantReason {
    /// A subscription row with a granting status was found.
    Subscription {
        table: SubscriptionTable,
        status: SubscriptionStatus,
    },
    /// Admin or gifted account.
    RoleBypass {
        #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
        role: ProfileRole,
    },
    /// A lookup failed.
    FailOpen { reason: String },
}

/// Why a user may not use the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum DenyReason {
    NoSubscription,
}

/// Result of evaluating a user's access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Entitlement {
    Granted(GrantReason),
    Denied(DenyReason),
}

impl Entitlement {
    pub fn is_granted(&self) -> bool {
        matches!(self, Entitlement::Granted(_))
    }
}
