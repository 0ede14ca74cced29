//! Everything the admin pages show, loaded in one go.

use crate::cache::{Cache, CacheStatus, patch_by, remove_by};
use crate::error::{ErrorKind, Result};
use futures::future::try_join_all;
use sitenav_db::Db;
use sitenav_db::error::Result as DbResult;
use sitenav_db::models::{
    Category, CategoryPatch, CategorySiteOrder, FriendLink, FriendLinkPatch, Id, NewCategory, NewFriendLink, NewSite,
    OrderedSite, Site, SitePatch, SiteWithTags, Tag, TagPatch, User, UserUpdate,
};
use sitenav_db::reconcile::merge_site_orders;
use std::time::Duration;
use tracing::{error, instrument};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminSnapshot {
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
    /// Sites with their tags and their position within their own category.
    pub sites: Vec<OrderedSite>,
    pub friend_links: Vec<FriendLink>,
    pub users: Vec<User>,
}

pub struct AdminStore {
    db: Db,
    cache: Cache<AdminSnapshot>,
}

impl AdminStore {
    pub fn new(db: Db, staleness: Duration) -> Self {
        Self { db, cache: Cache::new(staleness) }
    }

    pub async fn snapshot(&self) -> AdminSnapshot {
        self.cache.snapshot().await
    }

    pub async fn status(&self) -> CacheStatus {
        self.cache.status().await
    }

    /// Order records of every category. The categories are fetched again to
    /// enumerate them.
    async fn fetch_orders(&self) -> DbResult<Vec<CategorySiteOrder>> {
        let orders = self.db.orders();
        let categories = self.db.categories().get_all().await?;
        let per_category = try_join_all(categories.iter().map(|category| orders.get_by_category_id(category.id))).await?;
        Ok(per_category.into_iter().flatten().map(|order| order.order).collect())
    }

    async fn fetch(&self) -> DbResult<AdminSnapshot> {
        let (categories, tags, sites, friend_links, users) =
            (self.db.categories(), self.db.tags(), self.db.sites(), self.db.friend_links(), self.db.users());
        let (categories, tags, sites, orders, friend_links, users) = futures::try_join!(
            categories.get_all(),
            tags.get_all(),
            sites.get_all_with_tags(),
            self.fetch_orders(),
            friend_links.get_all(),
            users.get_users(),
        )?;
        Ok(AdminSnapshot { categories, tags, sites: merge_site_orders(sites, &orders), friend_links, users })
    }

    /// Refresh the snapshot unless it is still fresh (or `force` is set).
    ///
    /// All fetches run concurrently and the snapshot is only replaced when
    /// every one of them succeeded.
    #[instrument(skip(self))]
    pub async fn load_all_data(&self, force: bool) -> Result<()> {
        if !self.cache.begin(force).await {
            return Ok(());
        }
        let outcome = self.fetch().await.map_err(ErrorKind::load);
        if let Err(err) = &outcome {
            error!(error = %**err, "failed to load admin data");
        }
        self.cache.finish(outcome).await
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

    pub async fn add_tag(&self, tag: Tag) {
        self.cache.update(|s| s.tags.push(tag)).await
    }

    pub async fn update_tag(&self, id: Id, patch: &TagPatch) -> bool {
        self.cache.update(|s| patch_by(&mut s.tags, &id, |t| &t.id, |t| patch.apply(t))).await
    }

    pub async fn remove_tag(&self, id: Id) -> bool {
        self.cache.update(|s| remove_by(&mut s.tags, &id, |t| &t.id)).await
    }

    pub async fn add_site(&self, site: OrderedSite) {
        self.cache.update(|s| s.sites.push(site)).await
    }

    pub async fn update_site(&self, id: Id, patch: &SitePatch) -> bool {
        self.cache.update(|s| patch_by(&mut s.sites, &id, |o| &o.site.site.id, |o| patch.apply(&mut o.site.site))).await
    }

    pub async fn remove_site(&self, id: Id) -> bool {
        self.cache.update(|s| remove_by(&mut s.sites, &id, |o| &o.site.site.id)).await
    }

    pub async fn add_friend_link(&self, link: FriendLink) {
        self.cache.update(|s| s.friend_links.push(link)).await
    }

    pub async fn update_friend_link(&self, id: Id, patch: &FriendLinkPatch) -> bool {
        self.cache.update(|s| patch_by(&mut s.friend_links, &id, |l| &l.id, |l| patch.apply(l))).await
    }

    pub async fn remove_friend_link(&self, id: Id) -> bool {
        self.cache.update(|s| remove_by(&mut s.friend_links, &id, |l| &l.id)).await
    }

    pub async fn add_user(&self, user: User) {
        self.cache.update(|s| s.users.push(user)).await
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> bool {
        let id = id.to_string();
        self.cache.update(|s| patch_by(&mut s.users, &id, |u| &u.id, |u| update.apply(u))).await
    }

    pub async fn remove_user(&self, id: &str) -> bool {
        let id = id.to_string();
        self.cache.update(|s| remove_by(&mut s.users, &id, |u| &u.id)).await
    }

    #[instrument(skip(self, category))]
    pub async fn create_category(&self, category: &NewCategory) -> Result<Category> {
        let created = self.db.categories().create(category).await.map_err(ErrorKind::write)?;
        self.add_category(created.clone()).await;
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn save_category(&self, id: Id, patch: &CategoryPatch) -> Result<Category> {
        let saved = self.db.categories().update(id, patch).await.map_err(ErrorKind::write)?;
        let replacement = saved.clone();
        self.cache
            .update(|s| patch_by(&mut s.categories, &id, |c| &c.id, |c| *c = replacement))
            .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Id) -> Result<()> {
        self.db.categories().delete(id).await.map_err(ErrorKind::write)?;
        self.remove_category(id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let created = self.db.tags().create(name).await.map_err(ErrorKind::write)?;
        self.add_tag(created.clone()).await;
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn save_tag(&self, id: Id, patch: &TagPatch) -> Result<Tag> {
        let saved = self.db.tags().update(id, patch).await.map_err(ErrorKind::write)?;
        let replacement = saved.clone();
        self.cache.update(|s| patch_by(&mut s.tags, &id, |t| &t.id, |t| *t = replacement)).await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_tag(&self, id: Id) -> Result<()> {
        self.db.tags().delete(id).await.map_err(ErrorKind::write)?;
        self.remove_tag(id).await;
        Ok(())
    }

    /// New sites start untagged and unordered.
    #[instrument(skip(self, site))]
    pub async fn create_site(&self, site: &NewSite) -> Result<Site> {
        let created = self.db.sites().create(site).await.map_err(ErrorKind::write)?;
        let ordered = OrderedSite { site: SiteWithTags { site: created.clone(), tags: Vec::new() }, order_index: 0 };
        self.add_site(ordered).await;
        Ok(created)
    }

    /// Keeps the cached tags and position of the site.
    #[instrument(skip(self, patch))]
    pub async fn save_site(&self, id: Id, patch: &SitePatch) -> Result<Site> {
        let saved = self.db.sites().update(id, patch).await.map_err(ErrorKind::write)?;
        let replacement = saved.clone();
        self.cache
            .update(|s| patch_by(&mut s.sites, &id, |o| &o.site.site.id, |o| o.site.site = replacement))
            .await;
        Ok(saved)
    }

    /// Reconcile the site's tags, then re-read them into the snapshot.
    #[instrument(skip(self, names))]
    pub async fn save_site_tags(&self, id: Id, names: &[impl AsRef<str>]) -> Result<Vec<Tag>> {
        let site_tags = self.db.site_tags();
        site_tags.update_site_tags(id, names).await.map_err(ErrorKind::write)?;
        let tags = site_tags.get_by_site_id(id).await.map_err(ErrorKind::write)?;
        let (linked, all) = (tags.clone(), tags.clone());
        self.cache
            .update(|s| {
                patch_by(&mut s.sites, &id, |o| &o.site.site.id, |o| o.site.tags = linked);
                for tag in all {
                    if !s.tags.iter().any(|known| known.id == tag.id) {
                        s.tags.push(tag);
                    }
                }
            })
            .await;
        Ok(tags)
    }

    #[instrument(skip(self))]
    pub async fn delete_site(&self, id: Id) -> Result<()> {
        self.db.sites().delete(id).await.map_err(ErrorKind::write)?;
        self.remove_site(id).await;
        Ok(())
    }

    #[instrument(skip(self, link))]
    pub async fn create_friend_link(&self, link: &NewFriendLink) -> Result<FriendLink> {
        let created = self.db.friend_links().create(link).await.map_err(ErrorKind::write)?;
        // Newest first, like a fresh load.
        let cached = created.clone();
        self.cache.update(|s| s.friend_links.insert(0, cached)).await;
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn save_friend_link(&self, id: Id, patch: &FriendLinkPatch) -> Result<FriendLink> {
        let saved = self.db.friend_links().update(id, patch).await.map_err(ErrorKind::write)?;
        let replacement = saved.clone();
        self.cache
            .update(|s| patch_by(&mut s.friend_links, &id, |l| &l.id, |l| *l = replacement))
            .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_friend_link(&self, id: Id) -> Result<()> {
        self.db.friend_links().delete(id).await.map_err(ErrorKind::write)?;
        self.remove_friend_link(id).await;
        Ok(())
    }

    #[instrument(skip(self, update))]
    pub async fn save_user(&self, id: &str, update: &UserUpdate) -> Result<User> {
        let saved = self.db.users().update_user(id, update).await.map_err(ErrorKind::write)?;
        let (key, replacement) = (id.to_string(), saved.clone());
        self.cache.update(|s| patch_by(&mut s.users, &key, |u| &u.id, |u| *u = replacement)).await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.db.users().delete_user(id).await.map_err(ErrorKind::write)?;
        self.remove_user(id).await;
        Ok(())
    }
}
