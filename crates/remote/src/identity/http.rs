//! Identity clients speaking the hosted backend's auth REST API.

use crate::error::{ErrorKind, Result};
use crate::http::{Credentials, send};
use crate::identity::{Auth, Identity, IdentityAdmin, IdentityUpdate, Session};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    send(request)
        .await?
        .json()
        .await
        .or_raise(|| ErrorKind::InvalidResponse("unexpected auth payload".to_string()))
}

fn with_redirect(request: RequestBuilder, redirect_to: Option<&str>) -> RequestBuilder {
    match redirect_to {
        Some(url) => request.query(&[("redirect_to", url)]),
        None => request,
    }
}

/// Sign-up answers with a session when confirmation is disabled, with the
/// bare identity otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    Identity(Identity),
}

#[derive(Deserialize)]
struct UserList {
    users: Vec<Identity>,
}

/// Visitor-facing auth client.
///
/// Holds the session in memory and hands its access token to the shared
/// [`Credentials`], so that table requests of the same tier run as the
/// signed-in user.
#[derive(Debug)]
pub struct HttpAuth {
    http: Client,
    credentials: Arc<Credentials>,
    session: RwLock<Option<Session>>,
}

impl HttpAuth {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { http: Client::new(), credentials, session: RwLock::new(None) }
    }

    async fn store_session(&self, session: Option<Session>) {
        self.credentials.set_access_token(session.as_ref().map(|s| s.access_token.clone()));
        *self.session.write().await = session;
    }
}

#[async_trait]
impl Auth for HttpAuth {
    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str, redirect_to: Option<&str>) -> Result<Identity> {
        let url = self.credentials.url("auth/v1/signup")?;
        let request = self.credentials.authorize(self.http.post(url)).json(&json!({
            "email": email,
            "password": password,
            "data": { "email_confirmed": false },
        }));
        match json(with_redirect(request, redirect_to)).await? {
            SignUpResponse::Session(session) => {
                let identity = session.user.clone();
                self.store_session(Some(session)).await;
                Ok(identity)
            },
            SignUpResponse::Identity(identity) => Ok(identity),
        }
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.credentials.url("auth/v1/token")?;
        let request = self
            .credentials
            .authorize(self.http.post(url))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let session: Session = json(request).await?;
        self.store_session(Some(session.clone())).await;
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        if self.credentials.access_token().is_none() {
            return Ok(());
        }
        let url = self.credentials.url("auth/v1/logout")?;
        let result = send(self.credentials.authorize(self.http.post(url))).await;
        // The local session is gone either way.
        self.store_session(None).await;
        result.map(|_| ())
    }

    async fn session(&self) -> Result<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    #[instrument(skip(self))]
    async fn user(&self) -> Result<Identity> {
        if self.session.read().await.is_none() {
            exn::bail!(ErrorKind::Unauthenticated);
        }
        let url = self.credentials.url("auth/v1/user")?;
        json(self.credentials.authorize(self.http.get(url))).await
    }

    #[instrument(skip(self))]
    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let url = self.credentials.url("auth/v1/recover")?;
        let request = self.credentials.authorize(self.http.post(url)).json(&json!({ "email": email }));
        send(with_redirect(request, redirect_to)).await?;
        Ok(())
    }
}

/// Privileged identity management. Requires the service key.
#[derive(Debug, Clone)]
pub struct HttpIdentityAdmin {
    http: Client,
    credentials: Arc<Credentials>,
}

impl HttpIdentityAdmin {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { http: Client::new(), credentials }
    }
}

#[async_trait]
impl IdentityAdmin for HttpIdentityAdmin {
    #[instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<Identity>> {
        let url = self.credentials.url("auth/v1/admin/users")?;
        let list: UserList = json(self.credentials.authorize(self.http.get(url))).await?;
        Ok(list.users)
    }

    #[instrument(skip(self, update))]
    async fn update_user_by_id(&self, id: &str, update: IdentityUpdate) -> Result<Identity> {
        let url = self.credentials.url(&format!("auth/v1/admin/users/{id}"))?;
        json(self.credentials.authorize(self.http.put(url)).json(&update)).await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &str) -> Result<()> {
        let url = self.credentials.url(&format!("auth/v1/admin/users/{id}"))?;
        send(self.credentials.authorize(self.http.delete(url))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_response_shapes() {
        let with_session: SignUpResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "user": { "id": "u1", "email": "a@example.com" }
        }))
        .unwrap();
        assert!(matches!(with_session, SignUpResponse::Session(_)));

        let bare: SignUpResponse =
            serde_json::from_value(json!({ "id": "u1", "email": "a@example.com", "confirmation_sent_at": null }))
                .unwrap();
        assert!(matches!(bare, SignUpResponse::Identity(i) if i.id == "u1"));
    }

    #[tokio::test]
    async fn test_user_without_session() {
        let credentials = Arc::new(Credentials::new("https://project.supabase.co", "anon").unwrap());
        let auth = HttpAuth::new(credentials);
        let err = auth.user().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unauthenticated);
    }
}
