//! The public navigation page: visible categories and their sites.

use crate::cache::{Cache, CacheStatus, patch_by, remove_by};
use crate::error::ErrorKind;
use serde::Serialize;
use sitenav_db::Db;
use sitenav_db::models::{Category, CategoryPatch, Id, SitePatch, SiteWithTags};
use std::time::Duration;
use tracing::{error, instrument};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationSnapshot {
    pub categories: Vec<Category>,
    pub sites: Vec<SiteWithTags>,
}

/// A category as the navigation page lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryWithSites {
    #[serde(flatten)]
    pub category: Category,
    pub sites: Vec<SiteWithTags>,
}

/// Active categories, in their order, each with its approved sites.
/// Categories left without any site are dropped.
pub fn categories_with_sites(categories: &[Category], sites: &[SiteWithTags]) -> Vec<CategoryWithSites> {
    categories
        .iter()
        .filter(|category| category.is_active())
        .map(|category| CategoryWithSites {
            category: category.clone(),
            sites: sites
                .iter()
                .filter(|s| s.site.category_id == Some(category.id) && s.site.is_visible())
                .cloned()
                .collect(),
        })
        .filter(|category| !category.sites.is_empty())
        .collect()
}

pub struct NavigationStore {
    db: Db,
    cache: Cache<NavigationSnapshot>,
}

impl NavigationStore {
    pub fn new(db: Db, staleness: Duration) -> Self {
        Self { db, cache: Cache::new(staleness) }
    }

    pub async fn snapshot(&self) -> NavigationSnapshot {
        self.cache.snapshot().await
    }

    pub async fn status(&self) -> CacheStatus {
        self.cache.status().await
    }

    /// Refresh the snapshot unless it is still fresh (or `force` is set).
    ///
    /// Failures are logged and recorded in [`status`](Self::status); the
    /// page keeps showing the previous snapshot.
    #[instrument(skip(self))]
    pub async fn load_data(&self, force: bool) {
        if !self.cache.begin(force).await {
            return;
        }
        let (categories, sites) = (self.db.categories(), self.db.sites());
        let outcome = futures::try_join!(categories.get_all(), sites.get_all_with_tags())
            .map(|(categories, sites)| NavigationSnapshot { categories, sites })
            .map_err(ErrorKind::load);
        if let Err(err) = self.cache.finish(outcome).await {
            error!(error = %*err, "failed to load navigation data");
        }
    }

    pub async fn categories_with_sites(&self) -> Vec<CategoryWithSites> {
        self.cache.read(|s| categories_with_sites(&s.categories, &s.sites)).await
    }

    pub async fn add_category(&self, category: Category) {
        self.cache.update(|s| s.categories.push(category)).await
    }

    pub async fn update_category(&self, id: Id, patch: &CategoryPatch) -> bool {
        self.cache.update(|s| patch_by(&mut s.categories, &id, |c| &c.id, |c| patch.apply(c))).await
    }

    pub async fn remove_category(&self, id: Id) -> bool {
        self.cache.update(|s| remove_by(&mut s.categories, &id, |c| &c.id)).await
    }

    pub async fn add_site(&self, site: SiteWithTags) {
        self.cache.update(|s| s.sites.push(site)).await
    }

    pub async fn update_site(&self, id: Id, patch: &SitePatch) -> bool {
        self.cache.update(|s| patch_by(&mut s.sites, &id, |w| &w.site.id, |w| patch.apply(&mut w.site))).await
    }

    pub async fn remove_site(&self, id: Id) -> bool {
        self.cache.update(|s| remove_by(&mut s.sites, &id, |w| &w.site.id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sitenav_db::MemoryBackend;
    use sitenav_db::models::{CategoryStatus, NewCategory, NewSite, Site, SiteStatus};
    use sitenav_remote::error::ErrorKind as RemoteErrorKind;

    const STALENESS: Duration = Duration::from_secs(300);

    fn category(id: Id, order_index: i64, status: CategoryStatus) -> Category {
        Category { id, name: format!("c{id}"), order_index, status, created_at: None }
    }

    fn site(id: Id, category_id: Option<Id>, status: SiteStatus) -> SiteWithTags {
        SiteWithTags {
            site: Site {
                id,
                url: format!("https://{id}.example"),
                title: format!("s{id}"),
                description: None,
                category_id,
                status,
                created_at: None,
            },
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_categories_with_sites() {
        let categories = [
            category(1, 1, CategoryStatus::Active),
            category(2, 2, CategoryStatus::Inactive),
            category(3, 3, CategoryStatus::Active),
            category(4, 4, CategoryStatus::Active),
        ];
        let sites = [
            site(10, Some(1), SiteStatus::Approved),
            site(11, Some(1), SiteStatus::Pending),
            site(12, Some(2), SiteStatus::Approved),
            site(13, Some(3), SiteStatus::Rejected),
            site(14, None, SiteStatus::Approved),
            site(15, Some(4), SiteStatus::Approved),
        ];
        let visible = categories_with_sites(&categories, &sites);
        let ids: Vec<(Id, Vec<Id>)> =
            visible.iter().map(|c| (c.category.id, c.sites.iter().map(|s| s.site.id).collect())).collect();
        assert_eq!(ids, vec![(1, vec![10]), (4, vec![15])]);
    }

    #[rstest]
    #[case::no_categories(vec![], vec![site(1, Some(1), SiteStatus::Approved)])]
    #[case::no_sites(vec![category(1, 1, CategoryStatus::Active)], vec![])]
    fn test_categories_with_sites_empty(#[case] categories: Vec<Category>, #[case] sites: Vec<SiteWithTags>) {
        assert!(categories_with_sites(&categories, &sites).is_empty());
    }

    async fn seeded() -> (MemoryBackend, NavigationStore) {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        let docs = db.categories().create(&NewCategory::new("Docs")).await.unwrap();
        let site = NewSite::new("https://docs.rs", "Docs", Some(docs.id)).with_status(SiteStatus::Approved);
        db.sites().create(&site).await.unwrap();
        (memory, NavigationStore::new(db, STALENESS))
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_data() {
        let (_memory, store) = seeded().await;
        store.load_data(false).await;
        let visible = store.categories_with_sites().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].category.name, "Docs");
        assert_eq!(visible[0].sites[0].site.title, "Docs");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_data_omits_categories_without_sites() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        let a = db.categories().create(&NewCategory::new("A")).await.unwrap();
        let b = db.categories().create(&NewCategory::new("B")).await.unwrap();
        assert_eq!((a.order_index, b.order_index), (1, 2));
        let site = NewSite::new("https://s.example", "S", Some(b.id)).with_status(SiteStatus::Approved);
        db.sites().create(&site).await.unwrap();

        let store = NavigationStore::new(db, STALENESS);
        store.load_data(false).await;
        assert_eq!(store.snapshot().await.categories.len(), 2);
        let visible = store.categories_with_sites().await;
        let names: Vec<&str> = visible.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, vec!["B"]);
        assert_eq!(visible[0].sites[0].site.title, "S");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_swallowed() {
        let (memory, store) = seeded().await;
        store.load_data(false).await;
        let before = store.snapshot().await;

        memory.tables.fail("sites", Some("select"), RemoteErrorKind::Network("down".to_string())).await;
        tokio::time::advance(STALENESS).await;
        store.load_data(false).await;

        assert_eq!(store.snapshot().await, before);
        let status = store.status().await;
        assert!(matches!(status.error, Some(ErrorKind::Load(_))));
        assert!(!status.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_window() {
        let (memory, store) = seeded().await;
        store.load_data(false).await;
        let requests = memory.tables.request_count();
        tokio::time::advance(STALENESS - Duration::from_millis(1)).await;
        store.load_data(false).await;
        assert_eq!(memory.tables.request_count(), requests);
        tokio::time::advance(Duration::from_millis(1)).await;
        store.load_data(false).await;
        assert_eq!(memory.tables.request_count(), requests + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_mutators() {
        let (_memory, store) = seeded().await;
        store.load_data(false).await;
        let snapshot = store.snapshot().await;
        let site_id = snapshot.sites[0].site.id;

        let hide = SitePatch { status: Some(SiteStatus::Pending), ..Default::default() };
        assert!(store.update_site(site_id, &hide).await);
        assert!(store.categories_with_sites().await.is_empty());

        store.add_site(site(99, Some(snapshot.categories[0].id), SiteStatus::Approved)).await;
        assert_eq!(store.categories_with_sites().await[0].sites[0].site.id, 99);
        assert!(store.remove_site(99).await);

        store.add_category(category(50, 9, CategoryStatus::Active)).await;
        let rename = CategoryPatch { name: Some("Renamed".to_string()), ..Default::default() };
        assert!(store.update_category(50, &rename).await);
        assert!(store.remove_category(50).await);
        assert!(!store.remove_category(50).await);
    }
}
