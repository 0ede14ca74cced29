//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::objects::{ObjectStore, UploadOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub options: UploadOptions,
}

/// In-memory object store for testing.
///
/// Objects live in a `HashMap` behind a [`RwLock`]; clones share it.
///
/// # Examples
///
/// ```
/// use sitenav_remote::objects::{MemoryObjects, ObjectStore, UploadOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryObjects::new("https://cdn.example.com/avatars");
/// store.upload("a.png", b"png".to_vec(), &UploadOptions::default()).await?;
/// assert_eq!(store.public_url("a.png")?, "https://cdn.example.com/avatars/a.png");
/// assert!(store.contains("a.png").await);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryObjects {
    name: String,
    public_base: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failures: Arc<RwLock<HashMap<&'static str, ErrorKind>>>,
}

impl MemoryObjects {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            name: "memory".to_string(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
            objects: Arc::default(),
            failures: Arc::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every call of `operation` (`"upload"` or `"remove"`) fail with `kind`.
    pub async fn fail(&self, operation: &'static str, kind: ErrorKind) {
        self.failures.write().await.insert(operation, kind);
    }

    pub async fn contains(&self, key: &str) -> bool {
        match validate_key(key) {
            Ok(key) => self.objects.read().await.contains_key(&key),
            Err(_) => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let key = validate_key(key).ok()?;
        self.objects.read().await.get(&key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn check(&self, operation: &'static str) -> Result<()> {
        match self.failures.read().await.get(operation) {
            Some(kind) => Err(exn::Exn::from(kind.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MemoryObjects {
    fn default() -> Self {
        Self::new("https://storage.invalid/public")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, key: &str, data: Vec<u8>, options: &UploadOptions) -> Result<()> {
        self.check("upload").await?;
        let key = validate_key(key)?;
        let mut guard = self.objects.write().await;
        if !options.upsert && guard.contains_key(&key) {
            exn::bail!(ErrorKind::AlreadyExists(key));
        }
        guard.insert(key, StoredObject { data, options: options.clone() });
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        self.check("remove").await?;
        let keys = keys.iter().map(validate_key).collect::<Result<Vec<_>>>()?;
        let mut guard = self.objects.write().await;
        for key in keys {
            guard.remove(&key);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        Ok(format!("{}/{}", self.public_base, validate_key(key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_without_upsert_refuses_overwrite() {
        let store = MemoryObjects::default();
        store.upload("a.png", b"one".to_vec(), &UploadOptions::default()).await.unwrap();
        let err = store.upload("a.png", b"two".to_vec(), &UploadOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));

        let upsert = UploadOptions { upsert: true, ..Default::default() };
        store.upload("a.png", b"two".to_vec(), &upsert).await.unwrap();
        assert_eq!(store.get("a.png").await.unwrap().data, b"two");
    }

    #[tokio::test]
    async fn test_remove_ignores_missing() {
        let store = MemoryObjects::default();
        store.upload("x/a.png", b"a".to_vec(), &UploadOptions::default()).await.unwrap();
        store.remove(&["x/a.png".to_string(), "x/missing.png".to_string()]).await.unwrap();
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_normalized() {
        let store = MemoryObjects::default();
        store.upload("/x//a.png", b"a".to_vec(), &UploadOptions::default()).await.unwrap();
        assert_eq!(store.keys().await, vec!["x/a.png".to_string()]);
        assert!(store.upload("../a.png", b"a".to_vec(), &UploadOptions::default()).await.is_err());
    }
}
