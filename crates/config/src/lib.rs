//! Configuration for sitenav.
//!
//! Two unrelated documents live here: [`AppConfig`], the connection and
//! cache settings the data layer is built from, and [`SiteConfig`], the
//! site configuration document the public pages render.

mod app;
pub mod error;
mod site;

pub use crate::app::{AppConfig, AuthConfig, BackendConfig, CacheConfig, ENV_PREFIX, S3Config, StorageConfig};
pub use crate::site::{
    AboutSection, DocumentMeta, FloatingButtonSection, FooterSection, FriendlyLinks, HeaderSection, Link, SearchEngine,
    SiteConfig, SiteSection, ThemeSection,
};
