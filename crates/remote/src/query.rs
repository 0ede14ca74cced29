//! Structured description of a single table request.
//!
//! A [`Query`] names a table, an [`Operation`], filters, ordering, a limit
//! and (optionally) the [`Projection`] of rows to hand back. Clients turn it
//! into whatever the remote speaks; the in-memory client evaluates it
//! directly.

use crate::error::{ErrorKind, NO_ROWS, Result};
pub use serde_json::{Map, Value};

/// A single row, as a JSON object.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    Neq { column: String, value: Value },
}
impl Filter {
    /// Evaluate the filter against a row. Missing columns compare as `null`.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq { column, value } => row.get(column).unwrap_or(&Value::Null) == value,
            Self::Neq { column, value } => row.get(column).unwrap_or(&Value::Null) != value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    Only(Vec<String>),
}

/// How an embedded table relates to the row embedding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Child rows whose `foreign_key` column equals the parent's `id`.
    ToMany { foreign_key: String },
    /// The single row whose `id` equals the parent's `foreign_key` column.
    ToOne { foreign_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    /// Key the embedded value is stored under in the parent row.
    pub alias: String,
    pub table: String,
    pub relation: Relation,
    pub projection: Projection,
}

/// Which columns (and embedded relations) a request hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub columns: Columns,
    pub embeds: Vec<Embed>,
}
impl Projection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: Columns::Only(columns.into_iter().map(Into::into).collect()),
            embeds: Vec::new(),
        }
    }

    /// Embed the rows of `table` that point back at this row via `foreign_key`.
    pub fn embed_many(
        mut self,
        alias: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        projection: Projection,
    ) -> Self {
        self.embeds.push(Embed {
            alias: alias.into(),
            table: table.into(),
            relation: Relation::ToMany { foreign_key: foreign_key.into() },
            projection,
        });
        self
    }

    /// Embed the row of `table` this row points at via `foreign_key`.
    pub fn embed_one(
        mut self,
        alias: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        projection: Projection,
    ) -> Self {
        self.embeds.push(Embed {
            alias: alias.into(),
            table: table.into(),
            relation: Relation::ToOne { foreign_key: foreign_key.into() },
            projection,
        });
        self
    }

    /// Render as a PostgREST `select` parameter.
    ///
    /// ```
    /// use sitenav_remote::query::Projection;
    ///
    /// let tags = Projection::columns(["id", "name"]);
    /// let link = Projection::columns(Vec::<String>::new()).embed_one("tag", "tags", "tag_id", tags);
    /// let sites = Projection::all().embed_many("tags", "site_tags", "site_id", link);
    /// assert_eq!(sites.to_select(), "*,tags:site_tags(tag:tags!tag_id(id,name))");
    /// ```
    pub fn to_select(&self) -> String {
        let mut parts: Vec<String> = match &self.columns {
            Columns::All => vec!["*".to_string()],
            Columns::Only(columns) => columns.clone(),
        };
        for embed in &self.embeds {
            let inner = embed.projection.to_select();
            parts.push(match &embed.relation {
                Relation::ToMany { .. } => format!("{}:{}({})", embed.alias, embed.table, inner),
                Relation::ToOne { foreign_key } => {
                    format!("{}:{}!{}({})", embed.alias, embed.table, foreign_key, inner)
                },
            });
        }
        parts.join(",")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select,
    Insert(Vec<Row>),
    /// Merge the given columns into every matching row.
    Update(Row),
    /// Insert, or replace the row sharing the `on_conflict` columns.
    Upsert { rows: Vec<Row>, on_conflict: Vec<String> },
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cardinality {
    #[default]
    Many,
    /// Exactly one row, or a [`NO_ROWS`] error.
    Single,
    /// Zero or one row; more than one is a [`NO_ROWS`] error.
    MaybeSingle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub operation: Operation,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    /// Rows to hand back. `None` on a mutation returns nothing.
    pub projection: Option<Projection>,
    pub cardinality: Cardinality,
    /// Only count the matching rows; hand back none.
    pub count_only: bool,
}

impl Query {
    fn new(table: impl Into<String>, operation: Operation, projection: Option<Projection>) -> Self {
        Self {
            table: table.into(),
            operation,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            projection,
            cardinality: Cardinality::Many,
            count_only: false,
        }
    }

    pub fn select(table: impl Into<String>, projection: Projection) -> Self {
        Self::new(table, Operation::Select, Some(projection))
    }

    pub fn insert(table: impl Into<String>, rows: impl IntoIterator<Item = Row>) -> Self {
        Self::new(table, Operation::Insert(rows.into_iter().collect()), None)
    }

    pub fn update(table: impl Into<String>, patch: Row) -> Self {
        Self::new(table, Operation::Update(patch), None)
    }

    pub fn upsert(
        table: impl Into<String>,
        rows: impl IntoIterator<Item = Row>,
        on_conflict: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let operation = Operation::Upsert {
            rows: rows.into_iter().collect(),
            on_conflict: on_conflict.into_iter().map(Into::into).collect(),
        };
        Self::new(table, operation, None)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(table, Operation::Delete, None)
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq { column: column.into(), value: value.into() });
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq { column: column.into(), value: value.into() });
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order { column: column.into(), ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Hand back the affected rows of a mutation.
    pub fn returning(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn single(mut self) -> Self {
        self.cardinality = Cardinality::Single;
        self
    }

    pub fn maybe_single(mut self) -> Self {
        self.cardinality = Cardinality::MaybeSingle;
        self
    }

    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    /// Operation name, for logging.
    pub fn kind(&self) -> &'static str {
        match self.operation {
            Operation::Select => "select",
            Operation::Insert(_) => "insert",
            Operation::Update(_) => "update",
            Operation::Upsert { .. } => "upsert",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub rows: Vec<Row>,
    /// Exact number of matching rows, when requested.
    pub count: Option<u64>,
}
impl Response {
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// The first row, if any. Cardinality has already been enforced by the
    /// client for single-row queries.
    pub fn into_row(self) -> Option<Row> {
        self.rows.into_iter().next()
    }
}

/// Apply single-row semantics to a result set the same way the remote does.
pub(crate) fn enforce_cardinality(cardinality: Cardinality, rows: Vec<Row>) -> Result<Vec<Row>> {
    match (cardinality, rows.len()) {
        (Cardinality::Many, _) | (Cardinality::Single, 1) | (Cardinality::MaybeSingle, 0 | 1) => Ok(rows),
        (_, n) => exn::bail!(ErrorKind::remote(
            NO_ROWS,
            format!("JSON object requested, multiple (or no) rows returned ({n} rows)")
        )),
    }
}
