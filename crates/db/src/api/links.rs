//! Many-to-many links between sites and their categories or tags.

use crate::api::{Tags, execute, fetch_many};
use crate::error::{Result, partial};
use crate::models::{Id, Tag, from_row};
use crate::reconcile::plan_tags;
use serde_json::{Value, json};
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query, Row};
use tracing::{debug, instrument};

fn link_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

#[derive(Clone)]
pub struct SiteCategories {
    tables: TableHandle,
}

impl SiteCategories {
    const TABLE: &'static str = "site_categories";

    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn add(&self, site_id: Id, category_id: Id) -> Result<()> {
        let row = link_row(json!({ "site_id": site_id, "category_id": category_id }));
        execute(&*self.tables, Query::insert(Self::TABLE, [row])).await
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn remove(&self, site_id: Id, category_id: Id) -> Result<()> {
        let query = Query::delete(Self::TABLE).eq("site_id", site_id).eq("category_id", category_id);
        execute(&*self.tables, query).await
    }
}

#[derive(Clone)]
pub struct SiteTags {
    tables: TableHandle,
    tags: Tags,
}

impl SiteTags {
    const TABLE: &'static str = "site_tags";

    pub fn new(tables: TableHandle) -> Self {
        Self { tags: Tags::new(tables.clone()), tables }
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn add(&self, site_id: Id, tag_id: Id) -> Result<()> {
        let row = link_row(json!({ "site_id": site_id, "tag_id": tag_id }));
        execute(&*self.tables, Query::insert(Self::TABLE, [row])).await
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn remove(&self, site_id: Id, tag_id: Id) -> Result<()> {
        let query = Query::delete(Self::TABLE).eq("site_id", site_id).eq("tag_id", tag_id);
        execute(&*self.tables, query).await
    }

    /// Tags currently linked to the site.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_site_id(&self, site_id: Id) -> Result<Vec<Tag>> {
        let projection = Projection::columns(Vec::<String>::new()).embed_one("tag", "tags", "tag_id", Projection::all());
        let rows = fetch_many(&*self.tables, Query::select(Self::TABLE, projection).eq("site_id", site_id)).await?;
        rows.into_iter()
            .filter_map(|mut row| match row.remove("tag") {
                Some(Value::Object(tag)) => Some(from_row(tag)),
                _ => None,
            })
            .collect()
    }

    /// Make the site's tags exactly `names`, creating tags that don't exist.
    ///
    /// The current links are read once. Whether a resolved tag still needs a
    /// link is decided against that snapshot, never a re-fetch, so a link
    /// added concurrently makes the insert fail with the remote's unique
    /// violation.
    ///
    /// Nothing is rolled back: a failure after the first mutation leaves the
    /// links half-updated and is reported as
    /// [`PartialFailure`](crate::error::ErrorKind::PartialFailure), counting
    /// the links removed or added so far.
    #[instrument(skip(self, names), fields(client = self.tables.name(), desired = names.len()))]
    pub async fn update_site_tags(&self, site_id: Id, names: &[impl AsRef<str>]) -> Result<()> {
        const OPERATION: &str = "update_site_tags";
        let current = self.get_by_site_id(site_id).await?;
        let plan = plan_tags(&current, names);
        debug!(unlink = plan.unlink.len(), resolve = plan.resolve.len(), "planned tag links");

        let mut completed = 0;
        for tag_id in &plan.unlink {
            self.remove(site_id, *tag_id).await.map_err(|err| partial(err, OPERATION, completed))?;
            completed += 1;
        }
        for name in &plan.resolve {
            let tag = self.tags.create_if_not_exists(name).await.map_err(|err| partial(err, OPERATION, completed))?;
            if plan.needs_link(tag.id) {
                self.add(site_id, tag.id).await.map_err(|err| partial(err, OPERATION, completed))?;
                completed += 1;
            }
        }
        Ok(())
    }
}
