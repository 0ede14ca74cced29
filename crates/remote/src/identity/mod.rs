//! Identity provider traits and implementations.
//!
//! The hosted backend owns user identities. Two traits mirror its two
//! privilege tiers: [`Auth`] acts on behalf of the current visitor (sign up,
//! sign in, ...), [`IdentityAdmin`] manages every identity and requires the
//! privileged key.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "http")]
pub use self::http::{HttpAuth, HttpIdentityAdmin};
#[cfg(feature = "mock")]
pub use self::mock::MemoryIdentities;
use crate::error::Result;
use crate::query::{Map, Value};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A user identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata bag (`username`, `avatar_url`, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_metadata: Map<String, Value>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_confirmed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub banned_until: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sign_in_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            user_metadata: Map::new(),
            email_confirmed_at: None,
            banned_until: None,
            deleted_at: None,
            last_sign_in_at: None,
            created_at: None,
        }
    }

    /// A string entry of the metadata bag; empty strings count as missing.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn is_banned(&self, now: OffsetDateTime) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    /// Confirmed, not banned and not deleted.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.email_confirmed_at.is_some() && !self.is_banned(now) && self.deleted_at.is_none()
    }
}

/// Changes to apply to an identity. Unset fields are left alone.
///
/// Metadata is merged key by key; a `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Map<String, Value>>,
}

/// Apply a metadata patch the way the provider does.
pub fn merge_metadata(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Null => target.remove(key),
            other => target.insert(key.clone(), other.clone()),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: Identity,
}

/// Visitor-facing authentication.
#[async_trait]
pub trait Auth: Send + Sync {
    /// Register a new identity. Depending on the provider's settings the
    /// identity may need to confirm its email before it can sign in.
    async fn sign_up(&self, email: &str, password: &str, redirect_to: Option<&str>) -> Result<Identity>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// The locally held session, if any. Does not contact the provider.
    async fn session(&self) -> Result<Option<Session>>;

    /// The identity behind the current session, freshly fetched.
    ///
    /// Fails with [`Unauthenticated`](crate::error::ErrorKind::Unauthenticated)
    /// when there is no session.
    async fn user(&self) -> Result<Identity>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<()>;
}

/// Privileged identity management.
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn list_users(&self) -> Result<Vec<Identity>>;

    async fn update_user_by_id(&self, id: &str, update: IdentityUpdate) -> Result<Identity>;

    async fn delete_user(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::Duration;

    #[test]
    fn test_deserialize_provider_identity() {
        let identity: Identity = serde_json::from_value(json!({
            "id": "8d0f0c52-0000-0000-0000-000000000001",
            "email": "owner@example.com",
            "user_metadata": null,
            "email_confirmed_at": "2024-03-01T10:00:00.123456Z",
            "last_sign_in_at": "2024-03-02T08:30:00Z",
            "created_at": "2024-03-01T09:59:00Z",
            "aud": "authenticated"
        }))
        .unwrap();
        assert!(identity.user_metadata.is_empty());
        assert!(identity.is_active(OffsetDateTime::now_utc()));
        assert!(identity.deleted_at.is_none());
    }

    #[test]
    fn test_banned_identity_is_inactive() {
        let now = OffsetDateTime::now_utc();
        let mut identity = Identity::new("1", "a@example.com");
        identity.email_confirmed_at = Some(now);
        identity.banned_until = Some(now + Duration::days(1));
        assert!(!identity.is_active(now));
        identity.banned_until = Some(now - Duration::days(1));
        assert!(identity.is_active(now));
    }

    #[test]
    fn test_merge_metadata() {
        let mut target = json!({"username": "zan", "avatar_url": "https://cdn/a.png"}).as_object().cloned().unwrap();
        let patch = json!({"avatar_url": null, "theme": "dark"}).as_object().cloned().unwrap();
        merge_metadata(&mut target, &patch);
        assert_eq!(Value::Object(target), json!({"username": "zan", "theme": "dark"}));
    }

    #[test]
    fn test_metadata_str_ignores_empty() {
        let mut identity = Identity::new("1", "a@example.com");
        identity.user_metadata.insert("username".to_string(), json!(""));
        assert_eq!(identity.metadata_str("username"), None);
    }
}
