//! The visitor's session: who is signed in and with which role.

use crate::error::{ErrorKind, Result};
use sitenav_config::AuthConfig;
use sitenav_db::Db;
use sitenav_db::api::Registration;
use sitenav_db::error::{Error as DbError, ErrorKind as DbErrorKind};
use sitenav_db::models::Role;
use sitenav_remote::Identity;
use sitenav_remote::error::ErrorKind as RemoteErrorKind;
use tokio::sync::RwLock;
use tracing::{error, instrument};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<Identity>,
    pub role: Option<Role>,
    pub loading: bool,
    pub error: Option<ErrorKind>,
}

fn is_signed_out(err: &DbError) -> bool {
    matches!(&**err, DbErrorKind::Remote(RemoteErrorKind::Unauthenticated))
}

pub struct SessionStore {
    db: Db,
    auth: AuthConfig,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(db: Db, auth: AuthConfig) -> Self {
        Self { db, auth, state: RwLock::new(SessionState::default()) }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.user.is_some()
    }

    pub async fn is_admin(&self) -> bool {
        self.state.read().await.role == Some(Role::Admin)
    }

    async fn start(&self) {
        let mut state = self.state.write().await;
        state.loading = true;
        state.error = None;
    }

    /// Record the outcome of an operation begun with [`start`](Self::start).
    async fn finish<T>(&self, outcome: Result<T>) -> Result<T> {
        let mut state = self.state.write().await;
        state.loading = false;
        if let Err(err) = &outcome {
            error!(error = %**err, "session operation failed");
            state.error = Some((**err).clone());
        }
        outcome
    }

    /// Pick up the identity of an existing session, without its role.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        let user = match self.db.accounts().current_user().await {
            Ok(user) => Some(user),
            Err(err) if is_signed_out(&err) => None,
            Err(err) => {
                let err = ErrorKind::auth(err);
                self.state.write().await.error = Some((*err).clone());
                return Err(err);
            },
        };
        self.state.write().await.user = user;
        Ok(())
    }

    async fn load_user(&self) -> Result<Option<(Identity, Role)>> {
        let accounts = self.db.accounts();
        if accounts.session().await.map_err(ErrorKind::auth)?.is_none() {
            return Ok(None);
        }
        let user = accounts.current_user().await.map_err(ErrorKind::auth)?;
        let role = accounts.ensure_role(&user.id).await.map_err(ErrorKind::auth)?;
        Ok(Some((user, role)))
    }

    /// Reload the signed-in identity and its role, creating the default role
    /// row if it is missing.
    #[instrument(skip(self))]
    pub async fn fetch_user(&self) -> Result<()> {
        self.start().await;
        let outcome = self.load_user().await;
        {
            let mut state = self.state.write().await;
            match &outcome {
                Ok(Some((user, role))) => {
                    state.user = Some(user.clone());
                    state.role = Some(*role);
                },
                Ok(None) => {
                    state.user = None;
                    state.role = None;
                },
                Err(err) if matches!(err.source_kind(), DbErrorKind::Remote(RemoteErrorKind::Unauthenticated)) => {
                    state.user = None;
                    state.role = None;
                },
                Err(_) => {},
            }
        }
        self.finish(outcome).await.map(|_| ())
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.start().await;
        let outcome = self.db.accounts().sign_in(email, password).await.map_err(ErrorKind::auth);
        let session = self.finish(outcome).await?;
        self.state.write().await.user = Some(session.user);
        self.fetch_user().await
    }

    /// Register a new account. The first account becomes an admin. Does not
    /// sign in.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Registration> {
        self.start().await;
        let redirect = self.auth.callback_url();
        let outcome = self.db.accounts().register(email, password, redirect.as_deref()).await.map_err(ErrorKind::auth);
        self.finish(outcome).await
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let outcome = self.db.accounts().sign_out().await.map_err(ErrorKind::auth);
        let mut state = self.state.write().await;
        match &outcome {
            Ok(()) => {
                state.user = None;
                state.role = None;
            },
            Err(err) => state.error = Some((**err).clone()),
        }
        outcome
    }

    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.start().await;
        let redirect = self.auth.recovery_url();
        let outcome = self.db.accounts().reset_password(email, redirect.as_deref()).await.map_err(ErrorKind::auth);
        self.finish(outcome).await
    }
}
