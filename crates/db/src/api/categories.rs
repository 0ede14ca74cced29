use crate::api::{execute, fetch_many, fetch_one, fetch_optional};
use crate::error::Result;
use crate::models::{Category, CategoryPatch, Id, NewCategory, from_row, from_rows, to_row};
use crate::reconcile::next_order_index;
use serde_json::Value;
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query};
use tracing::instrument;

const TABLE: &str = "categories";

#[derive(Clone)]
pub struct Categories {
    tables: TableHandle,
}

impl Categories {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    /// Append a category after the current last one.
    ///
    /// Two round-trips without a lock: concurrent creations can end up with
    /// the same `order_index`.
    #[instrument(skip(self, category), fields(client = self.tables.name()))]
    pub async fn create(&self, category: &NewCategory) -> Result<Category> {
        let last = Query::select(TABLE, Projection::columns(["order_index"]))
            .order("order_index", false)
            .limit(1)
            .maybe_single();
        let max = fetch_optional(&*self.tables, last).await?.and_then(|row| row.get("order_index").and_then(Value::as_i64));

        let mut row = to_row(category)?;
        row.insert("order_index".to_string(), Value::from(next_order_index(max)));
        let query = Query::insert(TABLE, [row]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || "created category".to_string()).await?)
    }

    /// Ordered by `order_index`.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all(&self) -> Result<Vec<Category>> {
        let query = Query::select(TABLE, Projection::all()).order("order_index", true);
        from_rows(fetch_many(&*self.tables, query).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_id(&self, id: Id) -> Result<Category> {
        let query = Query::select(TABLE, Projection::all()).eq("id", id).single();
        from_row(fetch_one(&*self.tables, query, || format!("category {id}")).await?)
    }

    #[instrument(skip(self, patch), fields(client = self.tables.name()))]
    pub async fn update(&self, id: Id, patch: &CategoryPatch) -> Result<Category> {
        let query = Query::update(TABLE, to_row(patch)?).eq("id", id).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("category {id}")).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, id: Id) -> Result<()> {
        execute(&*self.tables, Query::delete(TABLE).eq("id", id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::CategoryStatus;
    use crate::{Db, MemoryBackend};
    use sitenav_remote::error::ErrorKind as RemoteErrorKind;

    #[tokio::test]
    async fn test_create_appends() {
        let db = Db::new(MemoryBackend::new().backend());
        let first = db.categories().create(&NewCategory::new("Docs")).await.unwrap();
        let second = db.categories().create(&NewCategory::new("Tools")).await.unwrap();
        assert_eq!((first.order_index, second.order_index), (1, 2));
        assert!(first.is_active());
    }

    #[tokio::test]
    async fn test_concurrent_creates_share_order_index() {
        let memory = MemoryBackend::new().interleaved();
        let db = Db::new(memory.backend());
        let categories = db.categories();
        let (new_docs, new_tools) = (NewCategory::new("Docs"), NewCategory::new("Tools"));
        let (docs, tools) = futures::join!(categories.create(&new_docs), categories.create(&new_tools));
        let (docs, tools) = (docs.unwrap(), tools.unwrap());
        assert_ne!(docs.id, tools.id);
        assert_eq!((docs.order_index, tools.order_index), (1, 1));
    }

    #[tokio::test]
    async fn test_create_after_reorder_uses_max() {
        let db = Db::new(MemoryBackend::new().backend());
        let first = db.categories().create(&NewCategory::new("Docs")).await.unwrap();
        db.categories().create(&NewCategory::new("Tools")).await.unwrap();
        let patch = CategoryPatch { order_index: Some(10), ..Default::default() };
        db.categories().update(first.id, &patch).await.unwrap();

        let third = db.categories().create(&NewCategory::new("News")).await.unwrap();
        assert_eq!(third.order_index, 11);
    }

    #[tokio::test]
    async fn test_get_all_is_ordered() {
        let db = Db::new(MemoryBackend::new().backend());
        let docs = db.categories().create(&NewCategory::new("Docs")).await.unwrap();
        let tools = db.categories().create(&NewCategory::new("Tools")).await.unwrap();
        let patch = CategoryPatch { order_index: Some(0), ..Default::default() };
        db.categories().update(tools.id, &patch).await.unwrap();

        let names: Vec<String> = db.categories().get_all().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Tools", "Docs"]);
        assert_eq!(db.categories().get_by_id(docs.id).await.unwrap().name, "Docs");
    }

    #[tokio::test]
    async fn test_inactive_category() {
        let db = Db::new(MemoryBackend::new().backend());
        let category = NewCategory::new("Hidden").with_status(CategoryStatus::Inactive);
        let created = db.categories().create(&category).await.unwrap();
        assert!(!created.is_active());
        db.categories().delete(created.id).await.unwrap();
        let err = db.categories().get_by_id(created.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_fails_when_max_lookup_fails() {
        let memory = MemoryBackend::new();
        memory.tables.fail("categories", Some("select"), RemoteErrorKind::Network("down".to_string())).await;
        let db = Db::new(memory.backend());
        let err = db.categories().create(&NewCategory::new("Docs")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(memory.tables.rows("categories").await.is_empty());
    }
}
