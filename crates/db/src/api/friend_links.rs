use crate::api::{execute, fetch_many, fetch_one};
use crate::error::Result;
use crate::models::{FriendLink, FriendLinkPatch, Id, NewFriendLink, from_row, from_rows, to_row};
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query};
use tracing::instrument;

const TABLE: &str = "friend_links";

#[derive(Clone)]
pub struct FriendLinks {
    tables: TableHandle,
}

impl FriendLinks {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    #[instrument(skip(self, link), fields(client = self.tables.name()))]
    pub async fn create(&self, link: &NewFriendLink) -> Result<FriendLink> {
        let query = Query::insert(TABLE, [to_row(link)?]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || "created friend link".to_string()).await?)
    }

    /// Newest first.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all(&self) -> Result<Vec<FriendLink>> {
        let query = Query::select(TABLE, Projection::all()).order("created_at", false);
        from_rows(fetch_many(&*self.tables, query).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_id(&self, id: Id) -> Result<FriendLink> {
        let query = Query::select(TABLE, Projection::all()).eq("id", id).single();
        from_row(fetch_one(&*self.tables, query, || format!("friend link {id}")).await?)
    }

    #[instrument(skip(self, patch), fields(client = self.tables.name()))]
    pub async fn update(&self, id: Id, patch: &FriendLinkPatch) -> Result<FriendLink> {
        let query = Query::update(TABLE, to_row(patch)?).eq("id", id).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("friend link {id}")).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, id: Id) -> Result<()> {
        execute(&*self.tables, Query::delete(TABLE).eq("id", id)).await
    }
}
