//! Table client trait and implementations.
//!
//! A [`TableClient`] executes [`Query`]s against the remote relational store
//! and calls its server-side procedures. Two instances usually exist side by
//! side: one bound by row-level security, one privileged.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpTables;
#[cfg(feature = "mock")]
pub use self::mock::{MemoryTables, Procedure, TableState};
use crate::error::Result;
use crate::query::{Query, Response, Row, Value};
use async_trait::async_trait;

/// Unified interface for relational table access.
///
/// # Examples
///
/// ```
/// use sitenav_remote::query::{Projection, Query};
/// use sitenav_remote::table::TableClient;
/// use sitenav_remote::error::Result;
///
/// async fn count_categories(tables: &dyn TableClient) -> Result<usize> {
///     let response = tables.execute(Query::select("categories", Projection::columns(["id"]))).await?;
///     Ok(response.rows.len())
/// }
/// ```
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Name of the client (e.g. `anon`, `service_role`), used for logging only.
    fn name(&self) -> &str;

    /// Execute a single request.
    ///
    /// Single-row queries that match zero (or several) rows fail with a
    /// [`Remote`](crate::error::ErrorKind::Remote) error carrying the
    /// [`NO_ROWS`](crate::error::NO_ROWS) code.
    async fn execute(&self, query: Query) -> Result<Response>;

    /// Call a server-side procedure with named parameters.
    ///
    /// Whatever atomicity the procedure promises is the remote's business;
    /// the client only marshals parameters.
    async fn rpc(&self, function: &str, params: Row) -> Result<Value>;
}
