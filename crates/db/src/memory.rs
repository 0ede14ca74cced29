//! In-memory backend for testing.

use crate::backend::Backend;
use serde_json::json;
use sitenav_remote::error::{ErrorKind as RemoteErrorKind, Result as RemoteResult};
use sitenav_remote::identity::MemoryIdentities;
use sitenav_remote::objects::MemoryObjects;
use sitenav_remote::query::{Row, Value};
use sitenav_remote::table::{MemoryTables, TableState};
use std::collections::HashMap;
use std::sync::Arc;

/// Public base URL of the in-memory avatar bucket.
pub const AVATAR_BASE_URL: &str = "https://storage.invalid/object/public/avatars";

/// In-memory stand-ins for every remote, wired up with the site's schema.
///
/// Keep this around in tests to inspect or sabotage the remotes; hand
/// [`backend()`](Self::backend) to the code under test.
///
/// # Examples
///
/// ```
/// use sitenav_db::{Db, MemoryBackend};
/// use sitenav_db::models::NewCategory;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let memory = MemoryBackend::new();
/// let db = Db::new(memory.backend());
/// let category = db.categories().create(&NewCategory::new("Tools")).await?;
/// assert_eq!(category.order_index, 1);
/// assert_eq!(memory.tables.rows("categories").await.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    pub tables: MemoryTables,
    pub identities: MemoryIdentities,
    pub avatars: MemoryObjects,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_tables(schema(MemoryTables::default()).with_unique("tags", ["name"]))
    }

    /// The schema without the unique constraint on tag names.
    pub fn without_unique_tag_names() -> Self {
        Self::with_tables(schema(MemoryTables::default()))
    }

    /// Let jointly awaited callers interleave their round-trips, to replay
    /// check-then-write races.
    pub fn interleaved(mut self) -> Self {
        self.tables = self.tables.interleaved();
        self
    }

    fn with_tables(tables: MemoryTables) -> Self {
        Self {
            tables,
            identities: MemoryIdentities::default(),
            avatars: MemoryObjects::new(AVATAR_BASE_URL).with_name("avatars"),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend {
            tables: Arc::new(self.tables.clone().with_name("anon")),
            privileged: Arc::new(self.tables.privileged()),
            auth: Arc::new(self.identities.clone()),
            identities: Arc::new(self.identities.clone()),
            avatars: Arc::new(self.avatars.clone()),
        }
    }
}

fn schema(tables: MemoryTables) -> MemoryTables {
    tables
        .with_primary_key("site_categories", ["site_id", "category_id"])
        .with_primary_key("site_tags", ["site_id", "tag_id"])
        .with_primary_key("category_site_orders", ["category_id", "site_id"])
        .with_created_at("sites")
        .with_created_at("categories")
        .with_created_at("tags")
        .with_created_at("friend_links")
        .with_created_at("site_visits")
        .with_procedure("reorder_category_sites", reorder_category_sites)
}

/// Positions are 1-based and follow the order of `p_site_ids`.
fn reorder_category_sites(tables: &mut HashMap<String, TableState>, params: &Row) -> RemoteResult<Value> {
    let invalid = || exn::Exn::from(RemoteErrorKind::remote("22023", "invalid parameters for reorder_category_sites"));
    let category_id = params.get("p_category_id").and_then(Value::as_i64).ok_or_else(invalid)?;
    let site_ids = params
        .get("p_site_ids")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?
        .iter()
        .map(|id| id.as_i64().ok_or_else(invalid))
        .collect::<RemoteResult<Vec<_>>>()?;
    let rows = tables.entry("category_site_orders".to_string()).or_default().rows_mut();
    for (position, site_id) in site_ids.into_iter().enumerate() {
        let order_index = position as i64 + 1;
        let existing = rows.iter_mut().find(|row| {
            row.get("category_id").and_then(Value::as_i64) == Some(category_id)
                && row.get("site_id").and_then(Value::as_i64) == Some(site_id)
        });
        match existing {
            Some(row) => {
                row.insert("order_index".to_string(), json!(order_index));
            },
            None => {
                if let Value::Object(row) =
                    json!({"category_id": category_id, "site_id": site_id, "order_index": order_index})
                {
                    rows.push(row);
                }
            },
        }
    }
    Ok(Value::Null)
}
