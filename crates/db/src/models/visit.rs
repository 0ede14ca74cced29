use crate::models::Id;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One recorded visit. Append-only; the address is filled in server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    #[serde(default)]
    pub id: Option<Id>,
    pub site_id: Id,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}
