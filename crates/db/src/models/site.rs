use crate::models::{Category, Id, Tag, nullable};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Approved,
    #[default]
    Pending,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: Id,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Id>,
    #[serde(default)]
    pub status: SiteStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Site {
    /// Only approved sites are listed publicly.
    pub fn is_visible(&self) -> bool {
        self.status == SiteStatus::Approved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSite {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category_id: Option<Id>,
    pub status: SiteStatus,
}

impl NewSite {
    pub fn new(url: impl Into<String>, title: impl Into<String>, category_id: Option<Id>) -> Self {
        Self { url: url.into(), title: title.into(), description: None, category_id, status: SiteStatus::default() }
    }

    pub fn with_status(mut self, status: SiteStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable::deserialize", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SiteStatus>,
}

impl SitePatch {
    pub fn apply(&self, site: &mut Site) {
        if let Some(url) = &self.url {
            site.url.clone_from(url);
        }
        if let Some(title) = &self.title {
            site.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            site.description.clone_from(description);
        }
        if let Some(category_id) = self.category_id {
            site.category_id = category_id;
        }
        if let Some(status) = self.status {
            site.status = status;
        }
    }
}

/// A site with its tag links flattened into a plain tag list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteWithTags {
    #[serde(flatten)]
    pub site: Site,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A site with its category and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDetail {
    #[serde(flatten)]
    pub site: Site,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A site carrying its position within its own category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedSite {
    #[serde(flatten)]
    pub site: SiteWithTags,
    /// `0` when the site has no order record for its category.
    pub order_index: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{from_row, to_row};
    use serde_json::json;

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = SitePatch { title: Some("New".to_string()), description: Some(None), ..Default::default() };
        let row = to_row(&patch).unwrap();
        assert_eq!(serde_json::Value::Object(row), json!({"title": "New", "description": null}));
    }

    #[test]
    fn test_patch_deserializes_null_as_clear() {
        let patch: SitePatch = serde_json::from_value(json!({"category_id": null})).unwrap();
        assert_eq!(patch.category_id, Some(None));
        assert_eq!(patch.title, None);
    }

    #[test]
    fn test_apply_patch() {
        let mut site: Site = from_row(
            json!({"id": 1, "url": "https://docs.rs", "title": "Docs", "category_id": 2, "status": "pending"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        SitePatch { status: Some(SiteStatus::Approved), category_id: Some(None), ..Default::default() }.apply(&mut site);
        assert!(site.is_visible());
        assert_eq!(site.category_id, None);
        assert_eq!(site.title, "Docs");
    }

    #[test]
    fn test_ordered_site_flattens() {
        let site = Site {
            id: 1,
            url: "u".to_string(),
            title: "t".to_string(),
            description: None,
            category_id: Some(3),
            status: SiteStatus::Approved,
            created_at: None,
        };
        let ordered = OrderedSite { site: SiteWithTags { site, tags: Vec::new() }, order_index: 4 };
        let value = serde_json::to_value(&ordered).unwrap();
        assert_eq!(value["order_index"], json!(4));
        assert_eq!(value["category_id"], json!(3));
        assert_eq!(value["tags"], json!([]));
    }
}
