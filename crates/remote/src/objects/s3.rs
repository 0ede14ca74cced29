//! S3-compatible object store.
//!
//! The hosted backend exposes its buckets over the S3 protocol as well, as do
//! Backblaze B2, Tigris, MinIO and friends. Objects are served publicly from
//! a separate base URL (a CDN, or the provider's public endpoint).

use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::objects::{ObjectStore, UploadOptions};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::instrument;

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// `Cache-Control: max-age` applied when an upload does not specify one.
const DEFAULT_CACHE_SECONDS: &str = "3600";
/// Upper bound of keys per `DeleteObjects` request.
const DELETE_BATCH: usize = 1000;

/// Connection settings for [`S3Objects`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    /// Optional key prefix (acts as virtual directory).
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint URL for S3-compatible services.
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    /// Base URL objects are publicly served from.
    pub public_base: String,
}

/// S3-compatible object store.
///
/// # Examples
///
/// ```no_run
/// use sitenav_remote::objects::{S3Objects, S3Settings};
///
/// # fn example() -> sitenav_remote::error::Result<()> {
/// let store = S3Objects::new("avatars", S3Settings {
///     bucket: "avatars".to_string(),
///     prefix: None,
///     region: "eu-central-1".to_string(),
///     endpoint: Some("https://project.supabase.co/storage/v1/s3".to_string()),
///     key_id: "access_key_id".to_string(),
///     key_secret: "secret_access_key".to_string(),
///     public_base: "https://project.supabase.co/storage/v1/object/public/avatars".to_string(),
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Objects {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    public_base: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Objects {
    pub fn new(name: impl Into<String>, settings: S3Settings) -> Result<Self> {
        let prefix = settings.prefix.map(validate_key).transpose()?;
        let credentials = Credentials::new(settings.key_id, settings.key_secret, None, None, "sitenav-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region))
            // 1 initial + 3 retries with exponential backoff
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint_url) = settings.endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: settings.bucket,
            prefix,
            public_base: settings.public_base.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a key relative to the prefix.
    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(Self::join(self.prefix.as_deref(), &validated))
    }

    fn join(prefix: Option<&str>, key: &str) -> String {
        match prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn cache_header(options: &UploadOptions) -> String {
        format!("max-age={}", options.cache_control.as_deref().unwrap_or(DEFAULT_CACHE_SECONDS))
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::Network("S3 rate limiter closed".to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3Objects {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, data, options), fields(store = %self.name, bytes = data.len()))]
    async fn upload(&self, key: &str, data: Vec<u8>, options: &UploadOptions) -> Result<()> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .cache_control(Self::cache_header(options))
            .body(ByteStream::from(data));
        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }
        if !options.upsert {
            // Conditional write: fails with 412 if the key is taken.
            request = request.if_none_match("*");
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) if err.raw_response().is_some_and(|r| r.status().as_u16() == 412) => {
                exn::bail!(ErrorKind::AlreadyExists(full_key))
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Network(format!("S3 upload of {full_key} failed"))),
        }
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn remove(&self, keys: &[String]) -> Result<()> {
        let full_keys = keys.iter().map(|k| self.full_key(k)).collect::<Result<Vec<_>>>()?;
        for batch in full_keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .or_raise(|| ErrorKind::InvalidKey(batch.join(",")))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .or_raise(|| ErrorKind::InvalidKey(batch.join(",")))?;
            let _permit = self.acquire_permit().await?;
            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .or_raise(|| ErrorKind::Network("S3 delete failed".to_string()))?;
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        Ok(format!("{}/{}", self.public_base, self.full_key(key)?))
    }
}
