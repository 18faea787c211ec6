// Session identity types

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role. Decides which refresh endpoint is valid for the
/// session and where a forced logout lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,

    /// Any non-administrative account
    #[default]
    Standard,
}

// Parsed leniently: role strings the client does not know about are
// treated as standard accounts.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "admin" => Role::Admin,
            _ => Role::Standard,
        })
    }
}

impl Role {
    /// API path that exchanges an expired token for this role
    pub fn refresh_path(&self) -> &'static str {
        match self {
            Role::Admin => "/api/admin/refresh-token",
            Role::Standard => "/api/refresh-token",
        }
    }

    /// Client-side entry point a forced logout routes to
    pub fn login_entry(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/login",
            Role::Standard => "/login",
        }
    }
}

/// The current identity: who the caller is plus the bearer proof.
///
/// Serialization covers the identity half only; the token is persisted
/// under its own storage key and filled back in by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub subject_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub logged_in_at: DateTime<Utc>,
    #[serde(skip)]
    pub token: String,
}

impl Credential {
    /// Build the initial credential from a login envelope.
    pub fn from_login(envelope: &SessionEnvelope) -> Result<Self> {
        if !envelope.status {
            anyhow::bail!("portal rejected the credentials");
        }
        let token = envelope
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("login response carried no token")?
            .to_string();
        let user = envelope
            .user
            .as_ref()
            .context("login response carried no user")?;

        Ok(Self {
            subject_id: user.subject_id.clone().unwrap_or_default(),
            display_name: user.display_name.clone().unwrap_or_default(),
            email: user.email.clone().unwrap_or_default(),
            role: user.role.unwrap_or_default(),
            logged_in_at: Utc::now(),
            token,
        })
    }

    /// Apply a refresh payload: the token is replaced, identity fields
    /// take the server's value when present and keep the stored value
    /// otherwise.
    pub fn merged_with(&self, user: Option<&SessionUser>, token: String) -> Credential {
        let mut merged = self.clone();
        merged.token = token;
        if let Some(user) = user {
            if let Some(ref subject_id) = user.subject_id {
                merged.subject_id = subject_id.clone();
            }
            if let Some(ref display_name) = user.display_name {
                merged.display_name = display_name.clone();
            }
            if let Some(ref email) = user.email {
                merged.email = email.clone();
            }
            if let Some(role) = user.role {
                merged.role = role;
            }
        }
        merged
    }
}

/// Response envelope shared by the login and refresh endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnvelope {
    pub status: bool,
    pub token: Option<String>,
    pub user: Option<SessionUser>,
}

/// Identity fields as the portal returns them. Every field is optional:
/// a partial refresh payload falls back to the stored values.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub subject_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

/// Login request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stored_credential() -> Credential {
        Credential {
            subject_id: "u-100".to_string(),
            display_name: "Dana Field".to_string(),
            email: "dana@example.com".to_string(),
            role: Role::Standard,
            logged_in_at: Utc::now(),
            token: "t-old".to_string(),
        }
    }

    #[test]
    fn test_unknown_role_falls_back_to_standard() {
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);

        let role: Role = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(role, Role::Standard);

        // Roles the client does not know about are standard accounts
        let role: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, Role::Standard);
    }

    #[test]
    fn test_role_paths() {
        assert_eq!(Role::Admin.refresh_path(), "/api/admin/refresh-token");
        assert_eq!(Role::Standard.refresh_path(), "/api/refresh-token");
        assert_eq!(Role::Admin.login_entry(), "/admin/login");
        assert_eq!(Role::Standard.login_entry(), "/login");
    }

    #[test]
    fn test_merge_replaces_token_and_present_fields() {
        let user = SessionUser {
            email: Some("dana.field@example.com".to_string()),
            ..Default::default()
        };

        let merged = stored_credential().merged_with(Some(&user), "t-new".to_string());

        assert_eq!(merged.token, "t-new");
        assert_eq!(merged.email, "dana.field@example.com");
        assert_eq!(merged.subject_id, "u-100");
        assert_eq!(merged.display_name, "Dana Field");
    }

    #[test]
    fn test_merge_without_user_keeps_identity() {
        let merged = stored_credential().merged_with(None, "t-new".to_string());
        assert_eq!(merged.token, "t-new");
        assert_eq!(merged.email, "dana@example.com");
    }

    #[test]
    fn test_from_login_requires_status_and_token() {
        let rejected: SessionEnvelope =
            serde_json::from_str(r#"{"status": false}"#).unwrap();
        assert!(Credential::from_login(&rejected).is_err());

        let tokenless: SessionEnvelope = serde_json::from_str(
            r#"{"status": true, "user": {"subjectId": "u-1"}}"#,
        )
        .unwrap();
        assert!(Credential::from_login(&tokenless).is_err());

        let ok: SessionEnvelope = serde_json::from_str(
            r#"{"status": true, "token": "t-1", "user": {"subjectId": "u-1", "role": "admin"}}"#,
        )
        .unwrap();
        let credential = Credential::from_login(&ok).unwrap();
        assert_eq!(credential.subject_id, "u-1");
        assert_eq!(credential.role, Role::Admin);
        assert_eq!(credential.token, "t-1");
    }

    proptest! {
        // Field-by-field fallback: whatever the refresh payload omits
        // keeps its stored value.
        #[test]
        fn merge_falls_back_field_by_field(
            subject_id in proptest::option::of("[a-z0-9-]{1,12}"),
            display_name in proptest::option::of("[A-Za-z ]{1,16}"),
            email in proptest::option::of("[a-z]{1,8}@example\\.com"),
        ) {
            let stored = stored_credential();
            let user = SessionUser {
                subject_id: subject_id.clone(),
                display_name: display_name.clone(),
                email: email.clone(),
                role: None,
            };

            let merged = stored.merged_with(Some(&user), "t-new".to_string());

            prop_assert_eq!(merged.subject_id, subject_id.unwrap_or(stored.subject_id));
            prop_assert_eq!(merged.display_name, display_name.unwrap_or(stored.display_name));
            prop_assert_eq!(merged.email, email.unwrap_or(stored.email));
            prop_assert_eq!(merged.role, stored.role);
            prop_assert_eq!(merged.token, "t-new");
        }
    }
}
