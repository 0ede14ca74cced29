use crate::api::{execute, fetch_many, fetch_one};
use crate::error::{ErrorKind, Result};
use crate::models::{CategorySiteOrder, Id, OrderWithCategory, OrderWithSite, from_row, from_rows, to_row};
use serde_json::json;
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query, Row, Value};
use tracing::instrument;

const TABLE: &str = "category_site_orders";
const REORDER: &str = "reorder_category_sites";

/// Position of each site within a category.
#[derive(Clone)]
pub struct CategorySiteOrders {
    tables: TableHandle,
}

impl CategorySiteOrders {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    /// Orders of a category with their sites, ascending.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_category_id(&self, category_id: Id) -> Result<Vec<OrderWithSite>> {
        let projection = Projection::all().embed_one("site", "sites", "site_id", Projection::all());
        let query = Query::select(TABLE, projection).eq("category_id", category_id).order("order_index", true);
        from_rows(fetch_many(&*self.tables, query).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_by_site_id(&self, site_id: Id) -> Result<Vec<OrderWithCategory>> {
        let projection = Projection::all().embed_one("category", "categories", "category_id", Projection::all());
        from_rows(fetch_many(&*self.tables, Query::select(TABLE, projection).eq("site_id", site_id)).await?)
    }

    /// Insert or replace the order of one site in one category.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn set_order(&self, order: CategorySiteOrder) -> Result<CategorySiteOrder> {
        let query = Query::upsert(TABLE, [to_row(&order)?], ["category_id", "site_id"]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || "upserted order".to_string()).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn update_order(&self, category_id: Id, site_id: Id, order_index: i64) -> Result<CategorySiteOrder> {
        let patch = to_row(&json!({ "order_index": order_index }))?;
        let query = Query::update(TABLE, patch)
            .eq("category_id", category_id)
            .eq("site_id", site_id)
            .returning(Projection::all())
            .single();
        let what = || format!("order of site {site_id} in category {category_id}");
        from_row(fetch_one(&*self.tables, query, what).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, category_id: Id, site_id: Id) -> Result<()> {
        execute(&*self.tables, Query::delete(TABLE).eq("category_id", category_id).eq("site_id", site_id)).await
    }

    /// Give the listed sites consecutive positions within the category, in
    /// list order.
    ///
    /// The whole reorder happens in one server-side procedure; it either
    /// applies completely or not at all.
    #[instrument(skip(self, site_ids), fields(client = self.tables.name(), sites = site_ids.len()))]
    pub async fn reorder_category_sites(&self, category_id: Id, site_ids: &[Id]) -> Result<()> {
        let mut params = Row::new();
        params.insert("p_category_id".to_string(), Value::from(category_id));
        params.insert("p_site_ids".to_string(), Value::from(site_ids.to_vec()));
        self.tables.rpc(REORDER, params).await.map_err(ErrorKind::remote)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCategory, NewSite};
    use crate::{Db, MemoryBackend};
    use sitenav_remote::error::ErrorKind as RemoteErrorKind;

    fn order(category_id: Id, site_id: Id, order_index: i64) -> CategorySiteOrder {
        CategorySiteOrder { category_id, site_id, order_index }
    }

    #[tokio::test]
    async fn test_set_order_upserts() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        db.orders().set_order(order(1, 2, 5)).await.unwrap();
        let replaced = db.orders().set_order(order(1, 2, 7)).await.unwrap();
        assert_eq!(replaced.order_index, 7);
        assert_eq!(memory.tables.rows("category_site_orders").await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_category_and_site() {
        let db = Db::new(MemoryBackend::new().backend());
        let category = db.categories().create(&NewCategory::new("Docs")).await.unwrap();
        let a = db.sites().create(&NewSite::new("https://a.example", "A", Some(category.id))).await.unwrap();
        let b = db.sites().create(&NewSite::new("https://b.example", "B", Some(category.id))).await.unwrap();
        db.orders().set_order(order(category.id, a.id, 2)).await.unwrap();
        db.orders().set_order(order(category.id, b.id, 1)).await.unwrap();

        let orders = db.orders().get_by_category_id(category.id).await.unwrap();
        let titles: Vec<_> = orders.iter().map(|o| o.site.as_ref().map(|s| s.title.as_str())).collect();
        assert_eq!(titles, vec![Some("B"), Some("A")]);

        let orders = db.orders().get_by_site_id(a.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].category.as_ref().map(|c| c.id), Some(category.id));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Db::new(MemoryBackend::new().backend());
        db.orders().set_order(order(1, 2, 5)).await.unwrap();
        assert_eq!(db.orders().update_order(1, 2, 9).await.unwrap(), order(1, 2, 9));
        db.orders().delete(1, 2).await.unwrap();
        let err = db.orders().update_order(1, 2, 3).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reorder_category_sites() {
        let db = Db::new(MemoryBackend::new().backend());
        db.orders().set_order(order(1, 10, 1)).await.unwrap();
        db.orders().set_order(order(1, 20, 2)).await.unwrap();
        db.orders().set_order(order(2, 10, 4)).await.unwrap();

        db.orders().reorder_category_sites(1, &[30, 20, 10]).await.unwrap();
        let orders: Vec<(Id, i64)> =
            db.orders().get_by_category_id(1).await.unwrap().into_iter().map(|o| (o.order.site_id, o.order.order_index)).collect();
        assert_eq!(orders, vec![(30, 1), (20, 2), (10, 3)]);
        // Other categories are left alone.
        assert_eq!(db.orders().get_by_site_id(10).await.unwrap().len(), 2);
        let other = db.orders().get_by_category_id(2).await.unwrap();
        assert_eq!(other[0].order.order_index, 4);
    }

    #[tokio::test]
    async fn test_reorder_failure_changes_nothing() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        db.orders().set_order(order(1, 10, 1)).await.unwrap();
        memory.tables.fail(REORDER, Some("rpc"), RemoteErrorKind::Network("down".to_string())).await;

        let err = db.orders().reorder_category_sites(1, &[20, 10]).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(memory.tables.rows("category_site_orders").await.len(), 1);
    }
}
