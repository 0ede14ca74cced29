use crate::api::{execute, fetch_many, fetch_one};
use crate::error::Result;
use crate::models::{Id, NewSite, Site, SiteDetail, SitePatch, SiteWithTags, from_row, from_rows, to_row};
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query, Row, Value};
use tracing::instrument;

const TABLE: &str = "sites";

/// `tags:site_tags(tag:tags!tag_id(...))`: the link rows of a site, each
/// embedding its tag.
pub(crate) fn tag_links(tag_columns: Projection) -> Projection {
    Projection::columns(Vec::<String>::new()).embed_one("tag", "tags", "tag_id", tag_columns)
}

/// Replace `tags: [{tag: {...}}, ...]` with `tags: [{...}, ...]`.
pub(crate) fn flatten_tag_links(mut row: Row) -> Row {
    if let Some(Value::Array(links)) = row.remove("tags") {
        let tags = links
            .into_iter()
            .filter_map(|link| match link {
                Value::Object(mut link) => link.remove("tag").filter(|tag| !tag.is_null()),
                _ => None,
            })
            .collect();
        row.insert("tags".to_string(), Value::Array(tags));
    }
    row
}

#[derive(Clone)]
pub struct Sites {
    tables: TableHandle,
}

impl Sites {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    #[instrument(skip(self, site), fields(client = self.tables.name()))]
    pub async fn create(&self, site: &NewSite) -> Result<Site> {
        let query = Query::insert(TABLE, [to_row(site)?]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || "created site".to_string()).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all(&self) -> Result<Vec<Site>> {
        from_rows(fetch_many(&*self.tables, Query::select(TABLE, Projection::all())).await?)
    }

    /// The site with its category and tags.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_id(&self, id: Id) -> Result<SiteDetail> {
        let projection = Projection::all()
            .embed_one("category", "categories", "category_id", Projection::all())
            .embed_many("tags", "site_tags", "site_id", tag_links(Projection::all()));
        let query = Query::select(TABLE, projection).eq("id", id).single();
        let row = fetch_one(&*self.tables, query, || format!("site {id}")).await?;
        from_row(flatten_tag_links(row))
    }

    #[instrument(skip(self, patch), fields(client = self.tables.name()))]
    pub async fn update(&self, id: Id, patch: &SitePatch) -> Result<Site> {
        let query = Query::update(TABLE, to_row(patch)?).eq("id", id).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("site {id}")).await?)
    }

    /// Join rows (tags, orders) are the caller's to clean up.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, id: Id) -> Result<()> {
        execute(&*self.tables, Query::delete(TABLE).eq("id", id)).await
    }

    /// Every site with its tags as a plain list.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all_with_tags(&self) -> Result<Vec<SiteWithTags>> {
        let projection =
            Projection::all().embed_many("tags", "site_tags", "site_id", tag_links(Projection::columns(["id", "name"])));
        let rows = fetch_many(&*self.tables, Query::select(TABLE, projection)).await?;
        from_rows(rows.into_iter().map(flatten_tag_links).collect())
    }
}
