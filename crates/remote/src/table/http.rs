//! PostgREST table client.

use crate::error::{ErrorKind, Result};
use crate::http::{Credentials, send, text};
use crate::query::{Cardinality, Filter, Operation, Projection, Query, Response, Row, Value, enforce_cardinality};
use crate::table::TableClient;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{ACCEPT, CONTENT_RANGE};
use reqwest::{Client, Method};
use std::sync::Arc;
use tracing::instrument;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Table client speaking PostgREST over HTTP.
///
/// # Examples
///
/// ```no_run
/// use sitenav_remote::http::Credentials;
/// use sitenav_remote::table::HttpTables;
/// use std::sync::Arc;
///
/// # fn example() -> sitenav_remote::error::Result<()> {
/// let credentials = Arc::new(Credentials::new("https://project.supabase.co", "anon-key")?);
/// let tables = HttpTables::new("anon", credentials);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTables {
    name: String,
    http: Client,
    credentials: Arc<Credentials>,
}

impl HttpTables {
    pub fn new(name: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        Self { name: name.into(), http: Client::new(), credentials }
    }

    fn filter_param(filter: &Filter) -> (String, String) {
        match filter {
            Filter::Eq { column, value: Value::Null } => (column.clone(), "is.null".to_string()),
            Filter::Neq { column, value: Value::Null } => (column.clone(), "not.is.null".to_string()),
            Filter::Eq { column, value } => (column.clone(), format!("eq.{}", Self::literal(value))),
            Filter::Neq { column, value } => (column.clone(), format!("neq.{}", Self::literal(value))),
        }
    }

    fn literal(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn params(query: &Query) -> Vec<(String, String)> {
        let mut params = Vec::new();
        match (&query.operation, &query.projection) {
            (_, Some(projection)) => params.push(("select".to_string(), projection.to_select())),
            (Operation::Select, None) => params.push(("select".to_string(), Projection::all().to_select())),
            _ => {},
        }
        params.extend(query.filters.iter().map(Self::filter_param));
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Operation::Upsert { on_conflict, .. } = &query.operation
            && !on_conflict.is_empty()
        {
            params.push(("on_conflict".to_string(), on_conflict.join(",")));
        }
        params
    }

    fn prefer(query: &Query) -> String {
        let mut prefer = Vec::new();
        if query.projection.is_some() && query.operation != Operation::Select {
            prefer.push("return=representation");
        }
        if query.count_only {
            prefer.push("count=exact");
        }
        if matches!(query.operation, Operation::Upsert { .. }) {
            prefer.push("resolution=merge-duplicates");
        }
        prefer.join(",")
    }

    /// Total from a `Content-Range: 0-24/3573` (or `*/3573`) header.
    fn parse_count(header: &str) -> Option<u64> {
        header.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
    }

    fn parse_rows(body: &str, cardinality: Cardinality) -> Result<Vec<Row>> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(body).or_raise(|| ErrorKind::InvalidResponse("not JSON".to_string()))?;
        let rows = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    _ => exn::bail!(ErrorKind::InvalidResponse("expected an array of objects".to_string())),
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Object(row) if cardinality == Cardinality::Single => vec![row],
            _ => exn::bail!(ErrorKind::InvalidResponse("unexpected response shape".to_string())),
        };
        Ok(rows)
    }
}

#[async_trait]
impl TableClient for HttpTables {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, query), fields(client = %self.name, table = %query.table, operation = query.kind()))]
    async fn execute(&self, query: Query) -> Result<Response> {
        let url = self.credentials.url(&format!("rest/v1/{}", query.table))?;
        let method = match (&query.operation, query.count_only) {
            (Operation::Select, true) => Method::HEAD,
            (Operation::Select, false) => Method::GET,
            (Operation::Insert(_) | Operation::Upsert { .. }, _) => Method::POST,
            (Operation::Update(_), _) => Method::PATCH,
            (Operation::Delete, _) => Method::DELETE,
        };
        let mut request = self.credentials.authorize(self.http.request(method, url)).query(&Self::params(&query));
        let prefer = Self::prefer(&query);
        if !prefer.is_empty() {
            request = request.header("Prefer", prefer);
        }
        if query.cardinality == Cardinality::Single && !query.count_only {
            request = request.header(ACCEPT, SINGLE_OBJECT);
        }
        request = match &query.operation {
            Operation::Insert(rows) | Operation::Upsert { rows, .. } => request.json(rows),
            Operation::Update(patch) => request.json(patch),
            Operation::Select | Operation::Delete => request,
        };

        let response = send(request).await?;
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|h| h.to_str().ok())
            .and_then(Self::parse_count);
        if query.count_only {
            return Ok(Response { rows: Vec::new(), count });
        }
        if query.projection.is_none() && query.operation != Operation::Select {
            return Ok(Response { rows: Vec::new(), count });
        }
        let body = text(response).await?;
        let rows = enforce_cardinality(query.cardinality, Self::parse_rows(&body, query.cardinality)?)?;
        Ok(Response { rows, count })
    }

    #[instrument(skip(self, params), fields(client = %self.name))]
    async fn rpc(&self, function: &str, params: Row) -> Result<Value> {
        let url = self.credentials.url(&format!("rest/v1/rpc/{function}"))?;
        let request = self.credentials.authorize(self.http.post(url)).json(&params);
        let body = text(send(request).await?).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).or_raise(|| ErrorKind::InvalidResponse("not JSON".to_string()))
    }
}
