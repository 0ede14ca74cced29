//! Object store speaking the hosted backend's storage REST API.

use crate::error::{ErrorKind, Result};
use crate::http::{Credentials, send};
use crate::key::validate as validate_key;
use crate::objects::{ObjectStore, UploadOptions};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

const DEFAULT_CACHE_SECONDS: &str = "3600";

#[derive(Debug, Clone)]
pub struct HttpObjects {
    name: String,
    bucket: String,
    http: Client,
    credentials: Arc<Credentials>,
}

impl HttpObjects {
    pub fn new(bucket: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        let bucket = bucket.into();
        Self { name: bucket.clone(), bucket, http: Client::new(), credentials }
    }
}

#[async_trait]
impl ObjectStore for HttpObjects {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, data, options), fields(store = %self.name, bytes = data.len()))]
    async fn upload(&self, key: &str, data: Vec<u8>, options: &UploadOptions) -> Result<()> {
        let key = validate_key(key)?;
        let url = self.credentials.url(&format!("storage/v1/object/{}/{key}", self.bucket))?;
        let cache = options.cache_control.as_deref().unwrap_or(DEFAULT_CACHE_SECONDS);
        let mut request = self
            .credentials
            .authorize(self.http.post(url))
            .header(CACHE_CONTROL, format!("max-age={cache}"))
            .header("x-upsert", options.upsert.to_string())
            .body(data);
        if let Some(content_type) = &options.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        match send(request).await {
            Ok(_) => Ok(()),
            // The storage API reports duplicates as HTTP 409 / "Duplicate".
            Err(err) if matches!(err.code(), Some("409" | "Duplicate")) => exn::bail!(ErrorKind::AlreadyExists(key)),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn remove(&self, keys: &[String]) -> Result<()> {
        let prefixes = keys.iter().map(validate_key).collect::<Result<Vec<_>>>()?;
        if prefixes.is_empty() {
            return Ok(());
        }
        let url = self.credentials.url(&format!("storage/v1/object/{}", self.bucket))?;
        let request = self.credentials.authorize(self.http.delete(url)).json(&json!({ "prefixes": prefixes }));
        send(request).await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        let key = validate_key(key)?;
        Ok(self.credentials.url(&format!("storage/v1/object/public/{}/{key}", self.bucket))?.to_string())
    }
}
