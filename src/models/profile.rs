//! Identity and profile models.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A signed-in user as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Identity {
    /// External user id (identity provider subject)
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub image_url: Option<String>,
}

/// Role stored on a profile by administrators.
///
/// Only `admin` and `gift` bypass the subscription check. Any other value
/// is kept verbatim so an upsert never rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProfileRole {
    Admin,
    Gift,
    Other(String),
}

impl ProfileRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Gift => "gift",
            Self::Other(role) => role,
        }
    }

    pub fn bypasses_subscription(&self) -> bool {
        matches!(self, Self::Admin | Self::Gift)
    }
}

impl From<String> for ProfileRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "admin" => Self::Admin,
            "gift" => Self::Gift,
            _ => Self::Other(role),
        }
    }
}

impl From<ProfileRole> for String {
    fn from(role: ProfileRole) -> Self {
        match role {
            ProfileRole::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

/// Local mirror of an identity, stored in `profiles` keyed by identity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub image_url: Option<String>,
    /// Set by administrators, never by session sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub role: Option<ProfileRole>,
    /// When the profile was first mirrored
    #[serde(default)]
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    /// Build the upsert payload for an identity.
    pub fn from_identity(identity: &Identity, now: &str) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            image_url: identity.image_url.clone(),
            role: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Copy the identity-owned fields of `update` onto this profile.
    ///
    /// `role` and `created_at` belong to the local record and survive.
    pub fn merge_identity_fields(&mut self, update: &Profile) {
        self.email = update.email.clone();
        self.display_name = update.display_name.clone();
        self.image_url = update.image_url.clone();
        self.updated_at = update.updated_at.clone();
        if self.created_at.is_empty() {
            self.created_at = update.created_at.clone();
        }
    }
}
