use crate::models::{Category, Id, Site};
use serde::{Deserialize, Serialize};

/// Position of a site within a category. Keyed by `(category_id, site_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySiteOrder {
    pub category_id: Id,
    pub site_id: Id,
    pub order_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithSite {
    #[serde(flatten)]
    pub order: CategorySiteOrder,
    #[serde(default)]
    pub site: Option<Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithCategory {
    #[serde(flatten)]
    pub order: CategorySiteOrder,
    #[serde(default)]
    pub category: Option<Category>,
}
