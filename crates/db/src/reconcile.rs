//! Pure reconciliation algorithms.
//!
//! Nothing in here talks to the remote; the facade feeds these functions
//! what it fetched and executes what they decide.

use crate::models::{CategorySiteOrder, Id, OrderedSite, SiteWithTags, Tag};
use std::collections::HashSet;

/// `order_index` for a new category given the current maximum.
pub fn next_order_index(max: Option<i64>) -> i64 {
    max.unwrap_or(0) + 1
}

/// What it takes to turn a site's current tag links into the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPlan {
    /// Linked tags whose name is no longer desired.
    pub unlink: Vec<Id>,
    /// Desired names, duplicates collapsed, first occurrence first.
    pub resolve: Vec<String>,
    /// Ids linked before anything was removed. A resolved tag is only linked
    /// again when its id is missing from this set.
    pub linked: HashSet<Id>,
}

impl TagPlan {
    pub fn needs_link(&self, tag_id: Id) -> bool {
        !self.linked.contains(&tag_id)
    }
}

pub fn plan_tags(current: &[Tag], desired: &[impl AsRef<str>]) -> TagPlan {
    let mut seen = HashSet::new();
    let resolve: Vec<String> = desired
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect();
    let mut unlinked = HashSet::new();
    let unlink = current
        .iter()
        .filter(|tag| !seen.contains(tag.name.as_str()))
        .map(|tag| tag.id)
        .filter(|id| unlinked.insert(*id))
        .collect();
    TagPlan { unlink, resolve, linked: current.iter().map(|tag| tag.id).collect() }
}

/// Give every site the `order_index` recorded for its own category (`0` if
/// there is none).
pub fn merge_site_orders(sites: Vec<SiteWithTags>, orders: &[CategorySiteOrder]) -> Vec<OrderedSite> {
    sites
        .into_iter()
        .map(|site| {
            let order_index = orders
                .iter()
                .find(|o| o.site_id == site.site.id && Some(o.category_id) == site.site.category_id)
                .map_or(0, |o| o.order_index);
            OrderedSite { site, order_index }
        })
        .collect()
}
