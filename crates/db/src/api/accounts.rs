//! Visitor-facing authentication, keeping the role row in step with the
//! identity.

use crate::api::UserRoles;
use crate::error::{ErrorKind, Result, partial};
use crate::models::Role;
use sitenav_remote::identity::Session;
use sitenav_remote::{AuthHandle, Identity};
use tracing::{instrument, warn};

/// A freshly registered identity and the role it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub identity: Identity,
    pub role: Role,
}

#[derive(Clone)]
pub struct Accounts {
    auth: AuthHandle,
    roles: UserRoles,
}

impl Accounts {
    pub fn new(auth: AuthHandle, roles: UserRoles) -> Self {
        Self { auth, roles }
    }

    /// Sign up, making the very first user an admin.
    ///
    /// Counting the existing roles and inserting the new one are separate
    /// requests, so two simultaneous first registrations can both become
    /// admins.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str, redirect_to: Option<&str>) -> Result<Registration> {
        let privileged = self.roles.elevated();
        let existing = privileged.count().await?;
        let identity = self.auth.sign_up(email, password, redirect_to).await.map_err(ErrorKind::remote)?;
        let role = match existing {
            0 => Role::Admin,
            _ => Role::User,
        };
        privileged.insert(&identity.id, role).await.map_err(|err| partial(err, "register", 1))?;
        Ok(Registration { identity, role })
    }

    /// The user's role, creating the default role row when it is missing.
    #[instrument(skip(self))]
    pub async fn ensure_role(&self, user_id: &str) -> Result<Role> {
        if let Some(row) = self.roles.get(user_id).await? {
            return Ok(row.role);
        }
        warn!(user_id, "user has no role row, creating the default one");
        Ok(self.roles.insert(user_id, Role::default()).await?.role)
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.auth.sign_in_with_password(email, password).await.map_err(ErrorKind::remote)
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await.map_err(ErrorKind::remote)
    }

    pub async fn session(&self) -> Result<Option<Session>> {
        self.auth.session().await.map_err(ErrorKind::remote)
    }

    /// The signed-in identity, as the provider currently knows it.
    pub async fn current_user(&self) -> Result<Identity> {
        self.auth.user().await.map_err(ErrorKind::remote)
    }

    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        self.auth.reset_password_for_email(email, redirect_to).await.map_err(ErrorKind::remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Db, MemoryBackend};
    use sitenav_remote::IdentityAdmin;
    use sitenav_remote::error::ErrorKind as RemoteErrorKind;

    #[tokio::test]
    async fn test_first_registration_is_admin() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        let first = db.accounts().register("a@example.com", "pw", None).await.unwrap();
        let second = db.accounts().register("b@example.com", "pw", None).await.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.role, Role::User);
        assert_eq!(db.user_roles().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_sign_up_inserts_no_role() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        db.accounts().register("a@example.com", "pw", None).await.unwrap();
        let err = db.accounts().register("a@example.com", "pw", None).await.unwrap_err();
        assert_eq!(err.code(), Some("user_already_exists"));
        assert_eq!(db.user_roles().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_role_insert_failure_is_partial() {
        let memory = MemoryBackend::new();
        memory.tables.fail("user_roles", Some("insert"), RemoteErrorKind::Network("down".to_string())).await;
        let db = Db::new(memory.backend());
        let err = db.accounts().register("a@example.com", "pw", None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::PartialFailure { operation: "register", completed: 1 });
        assert_eq!(memory.identities.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_role_creates_default() {
        let memory = MemoryBackend::new();
        let identity = memory.identities.add_user("a@example.com", "pw").await;
        let db = Db::new(memory.backend());
        assert_eq!(db.accounts().ensure_role(&identity.id).await.unwrap(), Role::User);
        assert_eq!(memory.tables.rows("user_roles").await.len(), 1);
        // The second call finds the row.
        assert_eq!(db.accounts().ensure_role(&identity.id).await.unwrap(), Role::User);
        assert_eq!(memory.tables.rows("user_roles").await.len(), 1);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        let registration = db.accounts().register("a@example.com", "pw", None).await.unwrap();
        assert!(db.accounts().session().await.unwrap().is_none());

        let session = db.accounts().sign_in("a@example.com", "pw").await.unwrap();
        assert_eq!(session.user.id, registration.identity.id);
        assert_eq!(db.accounts().current_user().await.unwrap().id, registration.identity.id);

        db.accounts().sign_out().await.unwrap();
        let err = db.accounts().current_user().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Remote(RemoteErrorKind::Unauthenticated));

        let redirect = "https://nav.example/auth/callback?type=recovery";
        db.accounts().reset_password("a@example.com", Some(redirect)).await.unwrap();
        assert_eq!(memory.identities.reset_requests().await, vec!["a@example.com".to_string()]);
    }
}
