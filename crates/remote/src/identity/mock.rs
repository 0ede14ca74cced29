use crate::error::{ErrorKind, Result};
use crate::identity::{Auth, Identity, IdentityAdmin, IdentityUpdate, Session, merge_metadata};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: Vec<Account>,
    session: Option<Session>,
    failures: HashMap<&'static str, ErrorKind>,
    reset_requests: Vec<String>,
}

/// In-memory identity provider for testing.
///
/// Implements both [`Auth`] and [`IdentityAdmin`] over the same accounts, so
/// a test can sign up through one and inspect through the other. Clones share
/// state.
#[derive(Debug, Clone)]
pub struct MemoryIdentities {
    inner: Arc<RwLock<Inner>>,
    next_id: Arc<AtomicU64>,
    /// Whether new sign-ups start out confirmed.
    autoconfirm: bool,
}

impl Default for MemoryIdentities {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            autoconfirm: true,
        }
    }
}

impl MemoryIdentities {
    /// New sign-ups must confirm their email (see [`Self::confirm`]).
    pub fn requiring_confirmation(mut self) -> Self {
        self.autoconfirm = false;
        self
    }

    fn next_id(&self) -> String {
        format!("00000000-0000-4000-8000-{:012}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Seed a confirmed account and return its identity.
    pub async fn add_user(&self, email: &str, password: &str) -> Identity {
        let now = OffsetDateTime::now_utc();
        let mut identity = Identity::new(self.next_id(), email);
        identity.email_confirmed_at = Some(now);
        identity.created_at = Some(now);
        self.inner.write().await.accounts.push(Account { identity: identity.clone(), password: password.to_string() });
        identity
    }

    /// Apply arbitrary changes to a seeded account (ban it, set metadata, ...).
    pub async fn modify_user(&self, id: &str, modify: impl FnOnce(&mut Identity)) {
        if let Some(account) = self.inner.write().await.accounts.iter_mut().find(|a| a.identity.id == id) {
            modify(&mut account.identity);
        }
    }

    pub async fn confirm(&self, email: &str) {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.write().await;
        if let Some(account) = inner.accounts.iter_mut().find(|a| a.identity.email.as_deref() == Some(email)) {
            account.identity.email_confirmed_at = Some(now);
        }
    }

    /// Make every call of `operation` (e.g. `"delete_user"`) fail with `kind`.
    pub async fn fail(&self, operation: &'static str, kind: ErrorKind) {
        self.inner.write().await.failures.insert(operation, kind);
    }

    pub async fn clear_failures(&self) {
        self.inner.write().await.failures.clear();
    }

    pub async fn identity(&self, id: &str) -> Option<Identity> {
        self.inner.read().await.accounts.iter().find(|a| a.identity.id == id).map(|a| a.identity.clone())
    }

    pub async fn password_of(&self, id: &str) -> Option<String> {
        self.inner.read().await.accounts.iter().find(|a| a.identity.id == id).map(|a| a.password.clone())
    }

    /// Emails a password reset was requested for, oldest first.
    pub async fn reset_requests(&self) -> Vec<String> {
        self.inner.read().await.reset_requests.clone()
    }

    fn check(inner: &Inner, operation: &'static str) -> Result<()> {
        match inner.failures.get(operation) {
            Some(kind) => Err(exn::Exn::from(kind.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Auth for MemoryIdentities {
    async fn sign_up(&self, email: &str, password: &str, _redirect_to: Option<&str>) -> Result<Identity> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "sign_up")?;
        if inner.accounts.iter().any(|a| a.identity.email.as_deref() == Some(email)) {
            exn::bail!(ErrorKind::remote("user_already_exists", "User already registered"));
        }
        let now = OffsetDateTime::now_utc();
        let mut identity = Identity::new(self.next_id(), email);
        identity.created_at = Some(now);
        if self.autoconfirm {
            identity.email_confirmed_at = Some(now);
        }
        inner.accounts.push(Account { identity: identity.clone(), password: password.to_string() });
        Ok(identity)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "sign_in_with_password")?;
        let now = OffsetDateTime::now_utc();
        let Some(account) = inner
            .accounts
            .iter_mut()
            .find(|a| a.identity.email.as_deref() == Some(email) && a.password == password)
        else {
            exn::bail!(ErrorKind::remote("invalid_credentials", "Invalid login credentials"));
        };
        if account.identity.email_confirmed_at.is_none() {
            exn::bail!(ErrorKind::remote("email_not_confirmed", "Email not confirmed"));
        }
        account.identity.last_sign_in_at = Some(now);
        let session = Session {
            access_token: format!("token-{}", account.identity.id),
            refresh_token: None,
            user: account.identity.clone(),
        };
        inner.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "sign_out")?;
        inner.session = None;
        Ok(())
    }

    async fn session(&self) -> Result<Option<Session>> {
        let inner = self.inner.read().await;
        Self::check(&inner, "session")?;
        Ok(inner.session.clone())
    }

    async fn user(&self) -> Result<Identity> {
        let inner = self.inner.read().await;
        Self::check(&inner, "user")?;
        let session = inner.session.as_ref().ok_or_else(|| exn::Exn::from(ErrorKind::Unauthenticated))?;
        inner
            .accounts
            .iter()
            .find(|a| a.identity.id == session.user.id)
            .map(|a| a.identity.clone())
            .ok_or_else(|| exn::Exn::from(ErrorKind::Unauthenticated))
    }

    async fn reset_password_for_email(&self, email: &str, _redirect_to: Option<&str>) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "reset_password_for_email")?;
        inner.reset_requests.push(email.to_string());
        Ok(())
    }
}

#[async_trait]
impl IdentityAdmin for MemoryIdentities {
    async fn list_users(&self) -> Result<Vec<Identity>> {
        let inner = self.inner.read().await;
        Self::check(&inner, "list_users")?;
        Ok(inner.accounts.iter().map(|a| a.identity.clone()).collect())
    }

    async fn update_user_by_id(&self, id: &str, update: IdentityUpdate) -> Result<Identity> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "update_user_by_id")?;
        if let Some(email) = &update.email
            && inner.accounts.iter().any(|a| a.identity.id != id && a.identity.email.as_deref() == Some(email))
        {
            exn::bail!(ErrorKind::remote("email_exists", "A user with this email address has already been registered"));
        }
        let Some(account) = inner.accounts.iter_mut().find(|a| a.identity.id == id) else {
            exn::bail!(ErrorKind::remote("user_not_found", "User not found"));
        };
        if let Some(email) = update.email {
            account.identity.email = Some(email);
        }
        if let Some(password) = update.password {
            account.password = password;
        }
        if let Some(metadata) = &update.user_metadata {
            merge_metadata(&mut account.identity.user_metadata, metadata);
        }
        Ok(account.identity.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::check(&inner, "delete_user")?;
        let before = inner.accounts.len();
        inner.accounts.retain(|a| a.identity.id != id);
        if inner.accounts.len() == before {
            exn::bail!(ErrorKind::remote("user_not_found", "User not found"));
        }
        if inner.session.as_ref().is_some_and(|s| s.user.id == id) {
            inner.session = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let identities = MemoryIdentities::default();
        let created = identities.sign_up("a@example.com", "hunter2", None).await.unwrap();
        let session = identities.sign_in_with_password("a@example.com", "hunter2").await.unwrap();
        assert_eq!(session.user.id, created.id);
        assert!(session.user.last_sign_in_at.is_some());
        assert_eq!(identities.user().await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_rejected() {
        let identities = MemoryIdentities::default();
        identities.sign_up("a@example.com", "pw", None).await.unwrap();
        let err = identities.sign_up("a@example.com", "pw", None).await.unwrap_err();
        assert_eq!(err.code(), Some("user_already_exists"));
    }

    #[tokio::test]
    async fn test_unconfirmed_cannot_sign_in() {
        let identities = MemoryIdentities::default().requiring_confirmation();
        identities.sign_up("a@example.com", "pw", None).await.unwrap();
        let err = identities.sign_in_with_password("a@example.com", "pw").await.unwrap_err();
        assert_eq!(err.code(), Some("email_not_confirmed"));
        identities.confirm("a@example.com").await;
        assert!(identities.sign_in_with_password("a@example.com", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let identities = MemoryIdentities::default();
        identities.add_user("a@example.com", "right").await;
        assert!(identities.sign_in_with_password("a@example.com", "wrong").await.is_err());
        assert!(identities.session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_without_session_is_unauthenticated() {
        let identities = MemoryIdentities::default();
        let err = identities.user().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_update_merges_metadata_and_checks_email() {
        let identities = MemoryIdentities::default();
        let a = identities.add_user("a@example.com", "pw").await;
        identities.add_user("b@example.com", "pw").await;
        let metadata = json!({"username": "alice"}).as_object().cloned().unwrap();
        let updated = identities
            .update_user_by_id(&a.id, IdentityUpdate { user_metadata: Some(metadata), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.metadata_str("username"), Some("alice"));

        let clash = IdentityUpdate { email: Some("b@example.com".to_string()), ..Default::default() };
        assert!(identities.update_user_by_id(&a.id, clash).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let identities = MemoryIdentities::default();
        let a = identities.add_user("a@example.com", "pw").await;
        identities.fail("delete_user", ErrorKind::Network("down".to_string())).await;
        assert!(identities.delete_user(&a.id).await.is_err());
        identities.clear_failures().await;
        identities.delete_user(&a.id).await.unwrap();
        assert!(identities.identity(&a.id).await.is_none());
    }
}
