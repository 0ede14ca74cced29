//! Bits shared by the HTTP clients.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use std::sync::RwLock;

/// Connection details for one privilege tier of the hosted backend.
///
/// The access token of a signed-in session (if any) replaces the API key as
/// the bearer token, so that row-level security sees the user. The table and
/// auth clients of one tier share a single `Credentials` for that reason.
#[derive(Debug)]
pub struct Credentials {
    base_url: Url,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl Credentials {
    pub fn new(base_url: impl AsRef<str>, api_key: impl Into<String>) -> Result<Self> {
        let raw = base_url.as_ref();
        // `Url::join` drops the last segment unless the base ends in a slash.
        let normalized = format!("{}/", raw.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).or_raise(|| ErrorKind::InvalidResponse(format!("invalid URL: {raw}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        })
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).or_raise(|| ErrorKind::InvalidResponse(format!("invalid path: {path}")))
    }

    pub(crate) fn set_access_token(&self, token: Option<String>) {
        // A poisoned lock only means another thread panicked mid-assignment
        // of an `Option<String>`; the value is still usable.
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.access_token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Attach the API key and bearer token to a request.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.api_key.clone());
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, alias = "msg", alias = "error_description", alias = "error")]
    message: Option<String>,
}

/// Send a request, turning unsuccessful responses into errors.
///
/// Unsuccessful responses become [`ErrorKind::Remote`] with the body's
/// `code` and `message` (falling back to the HTTP status and raw body).
pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.or_raise(|| ErrorKind::Network("request failed".to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.code.as_ref())
        .map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| status.as_str().to_string());
    let message = parsed.and_then(|b| b.message).unwrap_or(body);
    exn::bail!(ErrorKind::remote(code, message))
}

/// Read the body of a response returned by [`send`].
pub(crate) async fn text(response: Response) -> Result<String> {
    response.text().await.or_raise(|| ErrorKind::Network("failed to read response body".to_string()))
}
