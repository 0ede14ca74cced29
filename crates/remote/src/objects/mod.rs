//! Object storage trait and implementations.
//!
//! Only what the site needs from a bucket: put an object, remove objects,
//! and compute the public URL an object is served from.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "http")]
pub use self::http::HttpObjects;
#[cfg(feature = "mock")]
pub use self::mock::{MemoryObjects, StoredObject};
#[cfg(feature = "s3")]
pub use self::s3::S3Objects;
use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Value of the `Cache-Control` header, in seconds (e.g. `"3600"`).
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    /// Overwrite an existing object instead of failing with
    /// [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists).
    pub upsert: bool,
}

/// Unified interface for a public bucket.
///
/// Keys are relative to the bucket root and validated with
/// [`validate_key`](crate::validate_key) by every implementation.
///
/// # Examples
///
/// ```
/// use sitenav_remote::error::Result;
/// use sitenav_remote::objects::{ObjectStore, UploadOptions};
///
/// async fn publish(store: &dyn ObjectStore, png: Vec<u8>) -> Result<String> {
///     let options = UploadOptions { upsert: true, ..Default::default() };
///     store.upload("avatars/logo.png", png, &options).await?;
///     store.public_url("avatars/logo.png")
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    async fn upload(&self, key: &str, data: Vec<u8>, options: &UploadOptions) -> Result<()>;

    /// Remove objects. Keys that do not exist are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Public URL of an object. Does not check that the object exists.
    fn public_url(&self, key: &str) -> Result<String>;
}
