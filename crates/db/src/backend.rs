//! The bundle of remote handles every facade is built from.

use sitenav_remote::{AuthHandle, IdentityAdminHandle, ObjectHandle, TableHandle};

/// Remote handles, injected rather than global.
///
/// `tables` is bound by row-level security (and by the signed-in user's
/// session, if any); `privileged` bypasses it and is only used where the
/// restricted tier cannot see enough.
#[derive(Clone)]
pub struct Backend {
    pub tables: TableHandle,
    pub privileged: TableHandle,
    pub auth: AuthHandle,
    pub identities: IdentityAdminHandle,
    /// The avatar bucket.
    pub avatars: ObjectHandle,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("tables", &self.tables.name())
            .field("privileged", &self.privileged.name())
            .field("avatars", &self.avatars.name())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "http")]
mod http {
    use super::Backend;
    use crate::error::{ErrorKind, Result};
    use sitenav_config::AppConfig;
    use sitenav_remote::http::Credentials;
    use sitenav_remote::identity::{HttpAuth, HttpIdentityAdmin};
    use sitenav_remote::objects::HttpObjects;
    use sitenav_remote::table::HttpTables;
    use std::sync::Arc;

    impl Backend {
        /// Connect both privilege tiers of the hosted backend.
        pub fn from_config(config: &AppConfig) -> Result<Self> {
            let anon = Arc::new(Credentials::new(&config.backend.url, &config.backend.anon_key).map_err(ErrorKind::remote)?);
            let service = Arc::new(
                Credentials::new(&config.backend.url, &config.backend.service_role_key).map_err(ErrorKind::remote)?,
            );
            Ok(Self {
                tables: Arc::new(HttpTables::new("anon", anon.clone())),
                privileged: Arc::new(HttpTables::new("service_role", service.clone())),
                auth: Arc::new(HttpAuth::new(anon.clone())),
                identities: Arc::new(HttpIdentityAdmin::new(service)),
                avatars: Self::avatar_store(config, anon)?,
            })
        }

        #[cfg(feature = "s3")]
        fn avatar_store(config: &AppConfig, credentials: Arc<Credentials>) -> Result<sitenav_remote::ObjectHandle> {
            use sitenav_remote::objects::{S3Objects, S3Settings};
            let bucket = &config.storage.avatar_bucket;
            match &config.storage.s3 {
                Some(s3) => {
                    let settings = S3Settings {
                        bucket: bucket.clone(),
                        prefix: s3.prefix.clone(),
                        region: s3.region.clone(),
                        endpoint: s3.endpoint.clone(),
                        key_id: s3.key_id.clone(),
                        key_secret: s3.key_secret.clone(),
                        public_base: s3.public_base.clone(),
                    };
                    Ok(Arc::new(S3Objects::new(bucket.clone(), settings).map_err(ErrorKind::remote)?))
                },
                None => Ok(Arc::new(HttpObjects::new(bucket.clone(), credentials))),
            }
        }

        #[cfg(not(feature = "s3"))]
        fn avatar_store(config: &AppConfig, credentials: Arc<Credentials>) -> Result<sitenav_remote::ObjectHandle> {
            if config.storage.s3.is_some() {
                tracing::warn!("storage.s3 is configured but S3 support is not compiled in, using the storage API");
            }
            Ok(Arc::new(HttpObjects::new(config.storage.avatar_bucket.clone(), credentials)))
        }
    }
}
