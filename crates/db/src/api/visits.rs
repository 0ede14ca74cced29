use crate::api::fetch_one;
use crate::error::Result;
use crate::models::{Id, Visit, from_row, to_row};
use serde_json::json;
use sitenav_remote::TableHandle;
use sitenav_remote::query::{Projection, Query};
use tracing::instrument;

#[derive(Clone)]
pub struct Visits {
    tables: TableHandle,
}

impl Visits {
    pub fn new(tables: TableHandle) -> Self {
        Self { tables }
    }

    /// Append a visit. The remote fills in the client address.
    #[instrument(skip(self, user_agent), fields(client = self.tables.name()))]
    pub async fn record_visit(&self, site_id: Id, user_agent: Option<&str>) -> Result<Visit> {
        let row = to_row(&json!({ "site_id": site_id, "ip_address": null, "user_agent": user_agent }))?;
        let query = Query::insert("site_visits", [row]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("visit of site {site_id}")).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Db, MemoryBackend};

    #[tokio::test]
    async fn test_record_visit() {
        let memory = MemoryBackend::new();
        let db = Db::new(memory.backend());
        let visit = db.visits().record_visit(3, Some("curl/8.5")).await.unwrap();
        assert_eq!(visit.site_id, 3);
        assert_eq!(visit.ip_address, None);
        assert_eq!(visit.user_agent.as_deref(), Some("curl/8.5"));
        assert!(visit.id.is_some());
        assert!(visit.created_at.is_some());

        db.visits().record_visit(3, None).await.unwrap();
        assert_eq!(memory.tables.rows("site_visits").await.len(), 2);
    }
}
