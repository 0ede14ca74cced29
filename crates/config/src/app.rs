//! Application configuration: where the hosted backend lives and how the
//! client-side caches behave.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. a YAML, TOML or JSON file (an explicit path, or `config.{yaml,toml,json}`
//!    in the platform config directory when present),
//! 3. environment variables prefixed `SITENAV_`, nested with `__`
//!    (e.g. `SITENAV_BACKEND__ANON_KEY`).

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SITENAV_";
const DEFAULT_STALENESS_SECS: u64 = 5 * 60;
const DEFAULT_AVATAR_BUCKET: &str = "avatars";
const CONFIG_STEM: &str = "config";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the hosted backend, e.g. `https://project.supabase.co`.
    pub url: String,
    /// Key of the restricted, row-level-security-bound tier.
    pub anon_key: String,
    /// Key of the privileged tier. Only needed for user administration.
    pub service_role_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    /// Base URL the bucket's objects are publicly served from.
    pub public_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub avatar_bucket: String,
    /// Talk S3 to the bucket instead of the backend's storage API.
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { avatar_bucket: DEFAULT_AVATAR_BUCKET.to_string(), s3: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a loaded snapshot is considered fresh.
    pub staleness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { staleness_secs: DEFAULT_STALENESS_SECS }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Origin that confirmation and recovery emails link back to.
    pub redirect_base: Option<String>,
}

impl AuthConfig {
    pub fn callback_url(&self) -> Option<String> {
        self.redirect_base.as_deref().map(|base| format!("{}/auth/callback", base.trim_end_matches('/')))
    }

    pub fn recovery_url(&self) -> Option<String> {
        self.callback_url().map(|url| format!("{url}?type=recovery"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// `config.{yaml,yml,toml,json}` in the platform config directory, if one exists.
    pub fn default_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "sitenav")?;
        ["yaml", "yml", "toml", "json"]
            .iter()
            .map(|ext| dirs.config_dir().join(format!("{CONFIG_STEM}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Build the layered figment without extracting it.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        let path = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Load(format!("no such file: {}", path.display()))),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "loading configuration file");
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&path)),
                Some("toml") => figment.merge(Toml::file_exact(&path)),
                Some("json") => figment.merge(Json::file_exact(&path)),
                _ => exn::bail!(ErrorKind::Load(format!("unsupported file format: {}", path.display()))),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path)?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load("could not extract configuration".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("backend.url must not be empty".to_string()));
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            exn::bail!(ErrorKind::Invalid(format!("backend.url is not an HTTP(S) URL: {}", self.backend.url)));
        }
        if self.backend.anon_key.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("backend.anon_key must not be empty".to_string()));
        }
        if self.backend.service_role_key.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("backend.service_role_key must not be empty".to_string()));
        }
        if self.storage.avatar_bucket.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("storage.avatar_bucket must not be empty".to_string()));
        }
        if self.cache.staleness_secs == 0 {
            tracing::warn!("cache.staleness_secs is 0, every load will hit the backend");
        }
        Ok(())
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.cache.staleness_secs)
    }
}
