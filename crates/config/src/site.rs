//! The site configuration document.
//!
//! A YAML document read by the public pages: branding, about page, theme
//! colours, footer, floating toolbar, header navigation and the search
//! engines offered by the search box. Every section is optional and falls
//! back to its default.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Format, Yaml};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

const DEFAULT_TITLE: &str = "Site Navigation";
const DEFAULT_DESCRIPTION: &str = "A personal website navigation hub.";
const DEFAULT_KEYWORDS: &str = "navigation,bookmarks,links";
const DEFAULT_AUTHOR: &str = "Admin";
const DEFAULT_FAVICON: &str = "/favicon.png";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub author: String,
    pub language: String,
    pub favicon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AboutSection {
    pub social: Vec<Value>,
    pub follow: Vec<Value>,
    pub reward: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeSection {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendlyLinks {
    pub enable: bool,
    /// How many friend links the footer shows.
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FooterSection {
    pub copyright_runtime: String,
    pub powered_by: String,
    pub friendly_links: FriendlyLinks,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatingButtonSection {
    pub enable: bool,
    pub go_to_top: bool,
    pub theme_switching: bool,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSection {
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchEngine {
    pub name: String,
    /// Query URL; the search terms are appended.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Values for the document's `<head>`, with fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub author: String,
    pub favicon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub about: AboutSection,
    pub theme: ThemeSection,
    pub footer: FooterSection,
    pub floating_button: FloatingButtonSection,
    pub header: HeaderSection,
    pub search_engine: Vec<SearchEngine>,
}

fn or_default(value: &str, default: &str) -> String {
    match value.trim().is_empty() {
        true => default.to_string(),
        false => value.to_string(),
    }
}

/// Replace one key of a section, going through JSON so that every section
/// is handled the same way and type mismatches are caught.
fn set_key<T: Serialize + DeserializeOwned>(target: &mut T, section: &str, key: &str, value: Value) -> Result<()> {
    let mut object: Map<String, Value> = match serde_json::to_value(&*target) {
        Ok(Value::Object(object)) => object,
        _ => exn::bail!(ErrorKind::Invalid(format!("section {section} is not a mapping"))),
    };
    let slot = object.get_mut(key).ok_or_raise(|| ErrorKind::UnknownKey {
        section: section.to_string(),
        key: key.to_string(),
    })?;
    *slot = value;
    *target = serde_json::from_value(Value::Object(object))
        .or_raise(|| ErrorKind::Invalid(format!("wrong type for {section}.{key}")))?;
    Ok(())
}

impl SiteConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Figment::from(Yaml::string(text))
            .extract()
            .or_raise(|| ErrorKind::Load("invalid site configuration document".to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::Load(format!("no such file: {}", path.display())));
        }
        Figment::from(Yaml::file_exact(path))
            .extract()
            .or_raise(|| ErrorKind::Load(format!("invalid site configuration document: {}", path.display())))
    }

    /// Update one key of one section.
    ///
    /// `search_engine` is a list rather than a mapping, so `value` replaces
    /// it whole and `key` is ignored.
    pub fn update(&mut self, section: &str, key: &str, value: Value) -> Result<()> {
        match section {
            "site" => set_key(&mut self.site, section, key, value),
            "about" => set_key(&mut self.about, section, key, value),
            "theme" => set_key(&mut self.theme, section, key, value),
            "footer" => set_key(&mut self.footer, section, key, value),
            "floating_button" => set_key(&mut self.floating_button, section, key, value),
            "header" => set_key(&mut self.header, section, key, value),
            "search_engine" => {
                self.search_engine =
                    serde_json::from_value(value).or_raise(|| ErrorKind::Invalid("search_engine must be a list".to_string()))?;
                Ok(())
            },
            other => exn::bail!(ErrorKind::UnknownSection(other.to_string())),
        }
    }

    pub fn document_meta(&self) -> DocumentMeta {
        DocumentMeta {
            title: or_default(&self.site.title, DEFAULT_TITLE),
            description: or_default(&self.site.description, DEFAULT_DESCRIPTION),
            keywords: or_default(&self.site.keywords, DEFAULT_KEYWORDS),
            author: or_default(&self.site.author, DEFAULT_AUTHOR),
            favicon: or_default(&self.site.favicon, DEFAULT_FAVICON),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const DOCUMENT: &str = r#"
site:
  title: Bookmarks
  favicon: /icon.svg
footer:
  powered_by: sitenav
  friendly_links:
    enable: true
    quantity: 6
  links:
    - name: GitHub
      url: https://github.com
search_engine:
  - name: DuckDuckGo
    url: https://duckduckgo.com/?q=
"#;

    #[test]
    fn test_missing_sections_default() {
        let config = SiteConfig::from_yaml(DOCUMENT).unwrap();
        assert_eq!(config.site.title, "Bookmarks");
        assert_eq!(config.footer.friendly_links.quantity, 6);
        assert_eq!(config.footer.links[0].name, "GitHub");
        assert_eq!(config.theme, ThemeSection::default());
        assert!(config.header.items.is_empty());
        assert_eq!(config.search_engine.len(), 1);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(SiteConfig::from_yaml("").unwrap(), SiteConfig::default());
    }

    #[test]
    fn test_document_meta_fallbacks() {
        let meta = SiteConfig::from_yaml(DOCUMENT).unwrap().document_meta();
        assert_eq!(meta.title, "Bookmarks");
        assert_eq!(meta.favicon, "/icon.svg");
        assert_eq!(meta.description, DEFAULT_DESCRIPTION);
        assert_eq!(meta.author, DEFAULT_AUTHOR);
    }

    #[test]
    fn test_update_key() {
        let mut config = SiteConfig::default();
        config.update("theme", "primary_color", json!("#336699")).unwrap();
        assert_eq!(config.theme.primary_color, "#336699");
        config.update("footer", "friendly_links", json!({"enable": true, "quantity": 3})).unwrap();
        assert!(config.footer.friendly_links.enable);
    }

    #[test]
    fn test_update_search_engine_replaces_list() {
        let mut config = SiteConfig::from_yaml(DOCUMENT).unwrap();
        config
            .update("search_engine", "ignored", json!([{"name": "Bing", "url": "https://bing.com/search?q="}]))
            .unwrap();
        assert_eq!(config.search_engine.len(), 1);
        assert_eq!(config.search_engine[0].name, "Bing");
    }

    #[rstest]
    #[case("nope", "title", json!("x"))]
    #[case("site", "nope", json!("x"))]
    #[case("floating_button", "enable", json!("not a bool"))]
    fn test_update_rejects(#[case] section: &str, #[case] key: &str, #[case] value: Value) {
        let mut config = SiteConfig::default();
        let before = config.clone();
        assert!(config.update(section, key, value).is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn test_update_error_kinds() {
        let mut config = SiteConfig::default();
        let err = config.update("nope", "x", Value::Null).unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownSection("nope".to_string()));
        let err = config.update("site", "nope", Value::Null).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownKey { key, .. } if key == "nope"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, DOCUMENT).unwrap();
        assert_eq!(SiteConfig::load(&path).unwrap().site.title, "Bookmarks");
        assert!(SiteConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}
