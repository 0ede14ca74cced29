//! In-memory table client for testing.

use crate::error::{ErrorKind, Result, UNIQUE_VIOLATION};
use crate::query::{Columns, Operation, Order, Projection, Query, Relation, Response, Row, Value, enforce_cardinality};
use crate::table::TableClient;
use async_trait::async_trait;
use exn::ResultExt;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use time::format_description::well_known::Iso8601;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

/// Rows of a single in-memory table.
#[derive(Debug, Default, Clone)]
pub struct TableState {
    rows: Vec<Row>,
    next_id: i64,
}
impl TableState {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }
}

/// A server-side procedure, run while holding the write lock over every
/// table (so it is atomic with respect to other requests).
pub type Procedure = Arc<dyn Fn(&mut HashMap<String, TableState>, &Row) -> Result<Value> + Send + Sync>;

struct Failure {
    target: String,
    operation: Option<String>,
    kind: ErrorKind,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableState>,
    failures: Vec<Failure>,
    last_stamp: Option<OffsetDateTime>,
}

/// In-memory table client for testing.
///
/// Tables are created on first use. Rows are JSON objects; every table gets
/// an auto-incrementing integer `id` unless it was registered with a
/// different primary key. Primary and unique keys are enforced on insert and
/// update with the same error code the remote uses.
///
/// Clones (including [`privileged()`](Self::privileged)) share the same data,
/// which mirrors two clients with different credentials talking to the same
/// database.
///
/// # Examples
///
/// ```
/// use sitenav_remote::query::{Projection, Query};
/// use sitenav_remote::table::{MemoryTables, TableClient};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tables = MemoryTables::default().with_unique("tags", ["name"]);
/// let row = json!({"name": "rust"}).as_object().cloned().unwrap();
/// let created = tables
///     .execute(Query::insert("tags", [row]).returning(Projection::all()).single())
///     .await?
///     .into_row()
///     .unwrap();
/// assert_eq!(created["id"], json!(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryTables {
    name: String,
    inner: Arc<RwLock<Inner>>,
    primary_keys: HashMap<String, Vec<String>>,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    stamped: HashSet<String>,
    procedures: HashMap<String, Procedure>,
    requests: Arc<AtomicUsize>,
    interleaved: bool,
}

impl Default for MemoryTables {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            inner: Arc::new(RwLock::new(Inner::default())),
            primary_keys: HashMap::new(),
            unique_keys: HashMap::new(),
            stamped: HashSet::new(),
            procedures: HashMap::new(),
            requests: Arc::new(AtomicUsize::new(0)),
            interleaved: false,
        }
    }
}

impl MemoryTables {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A second handle onto the same data, named like the privileged client.
    pub fn privileged(&self) -> Self {
        self.clone().with_name("service_role")
    }

    /// Use a (composite) primary key instead of an auto-incrementing `id`.
    pub fn with_primary_key(mut self, table: &str, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.primary_keys.insert(table.to_string(), columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_unique(mut self, table: &str, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let columns = columns.into_iter().map(Into::into).collect();
        self.unique_keys.entry(table.to_string()).or_default().push(columns);
        self
    }

    /// Fill a `created_at` column on insert when the row doesn't carry one.
    pub fn with_created_at(mut self, table: &str) -> Self {
        self.stamped.insert(table.to_string());
        self
    }

    pub fn with_procedure(
        mut self,
        name: &str,
        procedure: impl Fn(&mut HashMap<String, TableState>, &Row) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.procedures.insert(name.to_string(), Arc::new(procedure));
        self
    }

    /// Yield to the scheduler before serving each request, so that callers
    /// awaited jointly take turns between their round-trips instead of each
    /// running to completion.
    pub fn interleaved(mut self) -> Self {
        self.interleaved = true;
        self
    }

    async fn serve(&self) {
        self.requests.fetch_add(1, AtomicOrdering::SeqCst);
        if self.interleaved {
            tokio::task::yield_now().await;
        }
    }

    /// Make every request against `target` (a table or procedure name) fail
    /// with `kind`. Restrict it to one operation (`select`, `insert`,
    /// `update`, `upsert`, `delete`, `rpc`) by passing `Some(operation)`.
    pub async fn fail(&self, target: &str, operation: Option<&str>, kind: ErrorKind) {
        self.inner.write().await.failures.push(Failure {
            target: target.to_string(),
            operation: operation.map(str::to_string),
            kind,
        });
    }

    pub async fn clear_failures(&self) {
        self.inner.write().await.failures.clear();
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner.read().await.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Number of requests (queries and procedure calls) served so far,
    /// across every handle sharing this data.
    pub fn request_count(&self) -> usize {
        self.requests.load(AtomicOrdering::SeqCst)
    }

    fn primary_key(&self, table: &str) -> Vec<String> {
        self.primary_keys.get(table).cloned().unwrap_or_else(|| vec!["id".to_string()])
    }

    fn keys(&self, table: &str) -> Vec<Vec<String>> {
        let mut keys = vec![self.primary_key(table)];
        keys.extend(self.unique_keys.get(table).cloned().unwrap_or_default());
        keys
    }

    fn conflicts(&self, table: &str, row: &Row, others: &[&Row]) -> Result<()> {
        for key in self.keys(table) {
            let clash = others.iter().any(|other| {
                key.iter().all(|column| {
                    let value = row.get(column).unwrap_or(&Value::Null);
                    !value.is_null() && other.get(column) == Some(value)
                })
            });
            if clash {
                exn::bail!(ErrorKind::remote(
                    UNIQUE_VIOLATION,
                    format!("duplicate key value violates unique constraint on {table} ({})", key.join(", "))
                ));
            }
        }
        Ok(())
    }

    fn prepare_insert(&self, inner: &mut Inner, table: &str, mut row: Row) -> Result<Row> {
        if self.stamped.contains(table) && !row.contains_key("created_at") {
            let now = OffsetDateTime::now_utc();
            // Keep stamps strictly increasing (and fixed width) so ordering
            // by their text is stable.
            let stamp = match inner.last_stamp {
                Some(last) if now <= last => last + Duration::microseconds(1),
                _ => now,
            };
            inner.last_stamp = Some(stamp);
            let formatted = stamp.format(&Iso8601::DEFAULT).or_raise(|| ErrorKind::InvalidResponse("timestamp".to_string()))?;
            row.insert("created_at".to_string(), Value::String(formatted));
        }
        let auto_id = self.primary_key(table) == ["id"];
        let state = inner.tables.entry(table.to_string()).or_default();
        if auto_id {
            match row.get("id").and_then(Value::as_i64) {
                Some(id) => state.next_id = state.next_id.max(id),
                None if !row.contains_key("id") => {
                    state.next_id += 1;
                    row.insert("id".to_string(), Value::from(state.next_id));
                },
                None => {},
            }
        }
        Ok(row)
    }

    fn insert(&self, inner: &mut Inner, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut staged: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            let row = self.prepare_insert(inner, table, row)?;
            let existing = inner.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or_default();
            let others: Vec<&Row> = existing.iter().chain(staged.iter()).collect();
            self.conflicts(table, &row, &others)?;
            staged.push(row);
        }
        inner.tables.entry(table.to_string()).or_default().rows.extend(staged.iter().cloned());
        Ok(staged)
    }

    fn update(&self, inner: &mut Inner, query: &Query, patch: &Row) -> Result<Vec<Row>> {
        let state = inner.tables.entry(query.table.clone()).or_default();
        let mut updated = Vec::new();
        let mut rows = state.rows.clone();
        for index in 0..rows.len() {
            if !query.filters.iter().all(|f| f.matches(&rows[index])) {
                continue;
            }
            let mut row = rows[index].clone();
            row.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            let others: Vec<&Row> = rows.iter().enumerate().filter(|(i, _)| *i != index).map(|(_, r)| r).collect();
            self.conflicts(&query.table, &row, &others)?;
            rows[index] = row.clone();
            updated.push(row);
        }
        state.rows = rows;
        Ok(updated)
    }

    fn upsert(&self, inner: &mut Inner, table: &str, rows: Vec<Row>, on_conflict: &[String]) -> Result<Vec<Row>> {
        let key = match on_conflict.is_empty() {
            true => self.primary_key(table),
            false => on_conflict.to_vec(),
        };
        let mut affected = Vec::with_capacity(rows.len());
        for row in rows {
            let state = inner.tables.entry(table.to_string()).or_default();
            let position = state.rows.iter().position(|existing| {
                key.iter().all(|column| row.get(column).is_some_and(|v| existing.get(column) == Some(v)))
            });
            match position {
                Some(index) => {
                    let merged = &mut state.rows[index];
                    merged.extend(row.into_iter());
                    affected.push(merged.clone());
                },
                None => affected.extend(self.insert(inner, table, vec![row])?),
            }
        }
        Ok(affected)
    }

    fn project(inner: &Inner, row: &Row, projection: &Projection) -> Row {
        let mut out: Row = match &projection.columns {
            Columns::All => row.clone(),
            Columns::Only(columns) => {
                columns.iter().filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone()))).collect()
            },
        };
        for embed in &projection.embeds {
            let candidates = inner.tables.get(&embed.table).map(|t| t.rows.as_slice()).unwrap_or_default();
            let value = match &embed.relation {
                Relation::ToMany { foreign_key } => match row.get("id") {
                    Some(id) => Value::Array(
                        candidates
                            .iter()
                            .filter(|child| child.get(foreign_key) == Some(id))
                            .map(|child| Value::Object(Self::project(inner, child, &embed.projection)))
                            .collect(),
                    ),
                    None => Value::Array(Vec::new()),
                },
                Relation::ToOne { foreign_key } => match row.get(foreign_key) {
                    Some(target) if !target.is_null() => candidates
                        .iter()
                        .find(|candidate| candidate.get("id") == Some(target))
                        .map(|found| Value::Object(Self::project(inner, found, &embed.projection)))
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                },
            };
            out.insert(embed.alias.clone(), value);
        }
        out
    }
}

/// Postgres ordering: nulls sort after everything else when ascending.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Array(_) => 3,
            Value::Object(_) => 4,
            Value::Null => 5,
        }
    }
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn sort_rows(rows: &mut [Row], order: &[Order]) {
    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|o| {
                let ordering = compare_values(a.get(&o.column), b.get(&o.column));
                if o.ascending { ordering } else { ordering.reverse() }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

impl Inner {
    fn check_failure(&self, target: &str, operation: &str) -> Result<()> {
        let failure = self.failures.iter().find(|f| {
            f.target == target && f.operation.as_deref().is_none_or(|op| op == operation)
        });
        match failure {
            Some(failure) => Err(exn::Exn::from(failure.kind.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TableClient for MemoryTables {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, query: Query) -> Result<Response> {
        self.serve().await;
        let mut inner = self.inner.write().await;
        inner.check_failure(&query.table, query.kind())?;

        let affected = match &query.operation {
            Operation::Select => {
                let mut rows: Vec<Row> = inner
                    .tables
                    .get(&query.table)
                    .map(|t| t.rows.as_slice())
                    .unwrap_or_default()
                    .iter()
                    .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect();
                sort_rows(&mut rows, &query.order);
                rows
            },
            Operation::Insert(rows) => self.insert(&mut inner, &query.table, rows.clone())?,
            Operation::Update(patch) => self.update(&mut inner, &query, patch)?,
            Operation::Upsert { rows, on_conflict } => self.upsert(&mut inner, &query.table, rows.clone(), on_conflict)?,
            Operation::Delete => {
                let state = inner.tables.entry(query.table.clone()).or_default();
                let (removed, kept): (Vec<Row>, Vec<Row>) =
                    state.rows.drain(..).partition(|row| query.filters.iter().all(|f| f.matches(row)));
                state.rows = kept;
                removed
            },
        };

        if query.count_only {
            return Ok(Response { rows: Vec::new(), count: Some(affected.len() as u64) });
        }
        let Some(projection) = &query.projection else {
            return Ok(Response::default());
        };
        let count = affected.len() as u64;
        let mut rows: Vec<Row> = affected.iter().map(|row| Self::project(&inner, row, projection)).collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        let rows = enforce_cardinality(query.cardinality, rows)?;
        Ok(Response { rows, count: Some(count) })
    }

    async fn rpc(&self, function: &str, params: Row) -> Result<Value> {
        self.serve().await;
        let mut inner = self.inner.write().await;
        inner.check_failure(function, "rpc")?;
        let Some(procedure) = self.procedures.get(function) else {
            exn::bail!(ErrorKind::remote("PGRST202", format!("Could not find the function public.{function}")));
        };
        procedure(&mut inner.tables, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NO_ROWS;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    async fn insert(tables: &MemoryTables, table: &str, value: Value) -> Row {
        tables
            .execute(Query::insert(table, [row(value)]).returning(Projection::all()).single())
            .await
            .unwrap()
            .into_row()
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let tables = MemoryTables::default();
        let first = insert(&tables, "sites", json!({"title": "one"})).await;
        let second = insert(&tables, "sites", json!({"title": "two"})).await;
        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
    }

    #[tokio::test]
    async fn test_explicit_id_advances_sequence() {
        let tables = MemoryTables::default();
        insert(&tables, "sites", json!({"id": 10, "title": "ten"})).await;
        let next = insert(&tables, "sites", json!({"title": "eleven"})).await;
        assert_eq!(next["id"], json!(11));
    }

    #[tokio::test]
    async fn test_interleaved_requests_take_turns() {
        let tables = MemoryTables::default().interleaved();
        let check_then_insert = |name: &'static str| {
            let tables = tables.clone();
            async move {
                let seen = tables.execute(Query::select("tags", Projection::all())).await.unwrap().into_rows().len();
                insert(&tables, "tags", json!({"name": name})).await;
                seen
            }
        };
        let (a, b) = tokio::join!(check_then_insert("a"), check_then_insert("b"));
        assert_eq!((a, b), (0, 0));
        assert_eq!(tables.rows("tags").await.len(), 2);
        assert_eq!(tables.request_count(), 4);
    }

    #[tokio::test]
    async fn test_unique_violation() {
        let tables = MemoryTables::default().with_unique("tags", ["name"]);
        insert(&tables, "tags", json!({"name": "rust"})).await;
        let err = tables.execute(Query::insert("tags", [row(json!({"name": "rust"}))])).await.unwrap_err();
        assert_eq!(err.code(), Some(UNIQUE_VIOLATION));
        assert_eq!(tables.rows("tags").await.len(), 1);
    }

    #[tokio::test]
    async fn test_select_filter_order_limit() {
        let tables = MemoryTables::default();
        for (name, index) in [("b", 2), ("a", 1), ("c", 3)] {
            insert(&tables, "categories", json!({"name": name, "order_index": index})).await;
        }
        let top = tables
            .execute(
                Query::select("categories", Projection::columns(["order_index"]))
                    .order("order_index", false)
                    .limit(1)
                    .single(),
            )
            .await
            .unwrap()
            .into_row()
            .unwrap();
        assert_eq!(Value::Object(top), json!({"order_index": 3}));

        let filtered =
            tables.execute(Query::select("categories", Projection::all()).neq("name", "a")).await.unwrap().into_rows();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn test_nulls_sort_last_ascending() {
        let tables = MemoryTables::default();
        insert(&tables, "t", json!({"v": null})).await;
        insert(&tables, "t", json!({"v": 1})).await;
        let rows =
            tables.execute(Query::select("t", Projection::columns(["v"])).order("v", true)).await.unwrap().into_rows();
        assert_eq!(rows[0]["v"], json!(1));
        assert_eq!(rows[1]["v"], Value::Null);
    }

    #[tokio::test]
    async fn test_single_without_rows_is_no_rows() {
        let tables = MemoryTables::default();
        let err = tables.execute(Query::select("tags", Projection::all()).eq("name", "x").single()).await.unwrap_err();
        assert_eq!(err.code(), Some(NO_ROWS));
        let none = tables
            .execute(Query::select("tags", Projection::all()).eq("name", "x").maybe_single())
            .await
            .unwrap()
            .into_row();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_upsert_composite_key() {
        let tables = MemoryTables::default().with_primary_key("orders", ["category_id", "site_id"]);
        let query = |index: i64| {
            Query::upsert("orders", [row(json!({"category_id": 1, "site_id": 2, "order_index": index}))], Vec::<String>::new())
        };
        tables.execute(query(1)).await.unwrap();
        tables.execute(query(5)).await.unwrap();
        let rows = tables.rows("orders").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["order_index"], json!(5));
        assert!(!rows[0].contains_key("id"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let tables = MemoryTables::default();
        let created = insert(&tables, "links", json!({"title": "old"})).await;
        let updated = tables
            .execute(
                Query::update("links", row(json!({"title": "new"})))
                    .eq("id", created["id"].clone())
                    .returning(Projection::all())
                    .single(),
            )
            .await
            .unwrap()
            .into_row()
            .unwrap();
        assert_eq!(updated["title"], json!("new"));
        tables.execute(Query::delete("links").eq("id", created["id"].clone())).await.unwrap();
        assert!(tables.rows("links").await.is_empty());
    }

    #[tokio::test]
    async fn test_embeds() {
        let tables = MemoryTables::default().with_primary_key("site_tags", ["site_id", "tag_id"]);
        let site = insert(&tables, "sites", json!({"title": "docs.rs"})).await;
        let tag = insert(&tables, "tags", json!({"name": "rust"})).await;
        tables
            .execute(Query::insert("site_tags", [row(json!({"site_id": site["id"], "tag_id": tag["id"]}))]))
            .await
            .unwrap();
        let link = Projection::columns(Vec::<String>::new()).embed_one(
            "tag",
            "tags",
            "tag_id",
            Projection::columns(["id", "name"]),
        );
        let projection = Projection::all().embed_many("tags", "site_tags", "site_id", link);
        let rows = tables.execute(Query::select("sites", projection)).await.unwrap().into_rows();
        assert_eq!(rows[0]["tags"], json!([{"tag": {"id": 1, "name": "rust"}}]));
    }

    #[tokio::test]
    async fn test_count_only() {
        let tables = MemoryTables::default();
        insert(&tables, "user_roles", json!({"role": "admin"})).await;
        let response = tables.execute(Query::select("user_roles", Projection::all()).count_only()).await.unwrap();
        assert_eq!(response.count, Some(1));
        assert!(response.rows.is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_request_count() {
        let tables = MemoryTables::default();
        let privileged = tables.privileged();
        tables.fail("sites", Some("select"), ErrorKind::remote("500", "boom")).await;
        assert!(privileged.execute(Query::select("sites", Projection::all())).await.is_err());
        assert!(tables.execute(Query::insert("sites", [Row::new()])).await.is_ok());
        tables.clear_failures().await;
        assert!(tables.execute(Query::select("sites", Projection::all())).await.is_ok());
        assert_eq!(tables.request_count(), 3);
        assert_eq!(privileged.name(), "service_role");
    }

    #[tokio::test]
    async fn test_created_at_is_monotonic() {
        let tables = MemoryTables::default().with_created_at("links");
        let a = insert(&tables, "links", json!({"title": "a"})).await;
        let b = insert(&tables, "links", json!({"title": "b"})).await;
        assert!(a["created_at"].as_str().unwrap() < b["created_at"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_rpc() {
        let tables = MemoryTables::default().with_procedure("echo", |_, params| Ok(Value::Object(params.clone())));
        let params = row(json!({"x": 1}));
        assert_eq!(tables.rpc("echo", params).await.unwrap(), json!({"x": 1}));
        let err = tables.rpc("missing", Row::new()).await.unwrap_err();
        assert_eq!(err.code(), Some("PGRST202"));
    }
}
