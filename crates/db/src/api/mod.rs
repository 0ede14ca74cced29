//! One access object per entity.
//!
//! Every method is a single remote round-trip unless its documentation says
//! otherwise. Errors from the remote are surfaced unmodified (wrapped in
//! [`ErrorKind::Remote`]).

mod accounts;
mod categories;
mod friend_links;
mod links;
mod orders;
mod sites;
mod tags;
mod users;
mod visits;

pub use self::accounts::{Accounts, Registration};
pub use self::categories::Categories;
pub use self::friend_links::FriendLinks;
pub use self::links::{SiteCategories, SiteTags};
pub use self::orders::CategorySiteOrders;
pub use self::sites::Sites;
pub use self::tags::Tags;
pub use self::users::{UserRoles, Users};
pub use self::visits::Visits;
use crate::error::{ErrorKind, Result};
use sitenav_remote::TableClient;
use sitenav_remote::query::{Query, Row};

pub(crate) async fn fetch_many(tables: &dyn TableClient, query: Query) -> Result<Vec<Row>> {
    Ok(tables.execute(query).await.map_err(ErrorKind::remote)?.into_rows())
}

/// Run a single-row query; "no rows" becomes [`ErrorKind::NotFound`].
pub(crate) async fn fetch_one(tables: &dyn TableClient, query: Query, what: impl FnOnce() -> String) -> Result<Row> {
    match tables.execute(query).await {
        Ok(response) => response.into_row().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(what()))),
        Err(err) if err.is_no_rows() => {
            let what = what();
            Err(err.raise(ErrorKind::NotFound(what)))
        },
        Err(err) => Err(ErrorKind::remote(err)),
    }
}

/// Run a single-row query; "no rows" is success with `None`.
pub(crate) async fn fetch_optional(tables: &dyn TableClient, query: Query) -> Result<Option<Row>> {
    match tables.execute(query).await {
        Ok(response) => Ok(response.into_row()),
        Err(err) if err.is_no_rows() => Ok(None),
        Err(err) => Err(ErrorKind::remote(err)),
    }
}

pub(crate) async fn execute(tables: &dyn TableClient, query: Query) -> Result<()> {
    tables.execute(query).await.map_err(ErrorKind::remote)?;
    Ok(())
}
