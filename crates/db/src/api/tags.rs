use crate::api::{execute, fetch_many, fetch_one, fetch_optional};
use crate::error::Result;
use crate::models::{Id, Tag, TagPatch, from_row, from_rows, to_row};
use serde_json::json;
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query};
use tracing::instrument;

const TABLE: &str = "tags";

#[derive(Clone)]
pub struct Tags {
    tables: TableHandle,
}

impl Tags {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn create(&self, name: &str) -> Result<Tag> {
        let query = Query::insert(TABLE, [to_row(&json!({ "name": name }))?]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("created tag {name}")).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all(&self) -> Result<Vec<Tag>> {
        from_rows(fetch_many(&*self.tables, Query::select(TABLE, Projection::all())).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_id(&self, id: Id) -> Result<Tag> {
        let query = Query::select(TABLE, Projection::all()).eq("id", id).single();
        from_row(fetch_one(&*self.tables, query, || format!("tag {id}")).await?)
    }

    #[instrument(skip(self, patch), fields(client = self.tables.name()))]
    pub async fn update(&self, id: Id, patch: &TagPatch) -> Result<Tag> {
        let query = Query::update(TABLE, to_row(patch)?).eq("id", id).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("tag {id}")).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, id: Id) -> Result<()> {
        execute(&*self.tables, Query::delete(TABLE).eq("id", id)).await
    }

    /// `None` when no tag has this name.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let query = Query::select(TABLE, Projection::all()).eq("name", name).single();
        fetch_optional(&*self.tables, query).await?.map(from_row).transpose()
    }

    /// Look the tag up by name and create it when missing.
    ///
    /// Not atomic. Two callers racing on the same new name either both
    /// create it (no unique constraint on `tags.name`) or the loser fails
    /// with the remote's unique-violation error.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn create_if_not_exists(&self, name: &str) -> Result<Tag> {
        match self.get_by_name(name).await? {
            Some(tag) => Ok(tag),
            None => self.create(name).await,
        }
    }
}
