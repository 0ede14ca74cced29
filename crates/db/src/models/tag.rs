use crate::models::Id;
use serde::{Deserialize, Serialize};

/// Tags are de-duplicated by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TagPatch {
    pub fn apply(&self, tag: &mut Tag) {
        if let Some(name) = &self.name {
            tag.name.clone_from(name);
        }
    }
}
