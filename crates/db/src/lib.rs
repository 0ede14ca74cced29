pub mod api;
mod backend;
pub mod error;
#[cfg(any(test, feature = "mock"))]
mod memory;
pub mod models;
pub mod reconcile;

pub use crate::backend::Backend;
#[cfg(any(test, feature = "mock"))]
pub use crate::memory::{AVATAR_BASE_URL, MemoryBackend};
use crate::api::{
    Accounts, Categories, CategorySiteOrders, FriendLinks, SiteCategories, SiteTags, Sites, Tags, UserRoles, Users,
    Visits,
};

/// Entry point to every entity accessor, all sharing one [`Backend`].
///
/// Accessors are cheap to create; each call hands out a fresh one.
#[derive(Debug, Clone)]
pub struct Db {
    backend: Backend,
}

impl Db {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn sites(&self) -> Sites {
        Sites::new(self.backend.tables.clone())
    }

    pub fn categories(&self) -> Categories {
        Categories::new(self.backend.tables.clone())
    }

    pub fn tags(&self) -> Tags {
        Tags::new(self.backend.tables.clone())
    }

    pub fn site_categories(&self) -> SiteCategories {
        SiteCategories::new(self.backend.tables.clone())
    }

    pub fn site_tags(&self) -> SiteTags {
        SiteTags::new(self.backend.tables.clone())
    }

    pub fn orders(&self) -> CategorySiteOrders {
        CategorySiteOrders::new(self.backend.tables.clone())
    }

    pub fn user_roles(&self) -> UserRoles {
        UserRoles::new(self.backend.tables.clone(), self.backend.privileged.clone())
    }

    pub fn users(&self) -> Users {
        Users::new(self.backend.identities.clone(), self.user_roles(), self.backend.avatars.clone())
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::new(self.backend.auth.clone(), self.user_roles())
    }

    pub fn visits(&self) -> Visits {
        Visits::new(self.backend.tables.clone())
    }

    pub fn friend_links(&self) -> FriendLinks {
        FriendLinks::new(self.backend.tables.clone())
    }
}
