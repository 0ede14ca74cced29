use crate::models::UserId;
use serde::{Deserialize, Serialize};
use sitenav_remote::Identity;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// The role row kept next to each identity, since the identity provider has
/// no custom role field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: UserId,
    pub role: Role,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    #[default]
    Inactive,
}

/// A user as the admin pages list it: identity plus role, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub avatar_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl User {
    /// Username falls back to the email, role to [`Role::User`].
    pub fn from_identity(identity: &Identity, role: Option<Role>, now: OffsetDateTime) -> Self {
        let username = identity
            .metadata_str("username")
            .map(str::to_string)
            .or_else(|| identity.email.clone())
            .unwrap_or_default();
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            username,
            role: role.unwrap_or_default(),
            status: match identity.is_active(now) {
                true => UserStatus::Active,
                false => UserStatus::Inactive,
            },
            avatar_url: identity.metadata_str("avatar_url").map(str::to_string),
            last_login: identity.last_sign_in_at,
            created_at: identity.created_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Changes to a user. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Empty passwords are ignored.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl UserUpdate {
    /// Patch a listed user the way the update changes it remotely.
    pub fn apply(&self, user: &mut User) {
        if let Some(email) = &self.email {
            user.email = Some(email.clone());
        }
        if let Some(username) = &self.username {
            user.username.clone_from(username);
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}
