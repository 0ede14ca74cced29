mod admin;
mod cache;
pub mod error;
mod navigation;
mod session;

pub use crate::admin::{AdminSnapshot, AdminStore};
pub use crate::cache::CacheStatus;
pub use crate::navigation::{CategoryWithSites, NavigationSnapshot, NavigationStore, categories_with_sites};
pub use crate::session::{SessionState, SessionStore};
use sitenav_config::AppConfig;
use sitenav_db::Db;

/// One of each store, configured from the application config.
pub struct Stores {
    pub admin: AdminStore,
    pub navigation: NavigationStore,
    pub session: SessionStore,
}

impl Stores {
    pub fn new(db: Db, config: &AppConfig) -> Self {
        let staleness = config.staleness();
        Self {
            admin: AdminStore::new(db.clone(), staleness),
            navigation: NavigationStore::new(db.clone(), staleness),
            session: SessionStore::new(db, config.auth.clone()),
        }
    }
}
