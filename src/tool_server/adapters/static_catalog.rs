//! Catalog source backed by a fixed list of templates.

use crate::tool_server::{
    domain::{CatalogTemplate, TemplateId},
    ports::{CatalogSourceError, CatalogSourceResult, CatalogTemplateSource},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable catalog loaded once, typically from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    templates: BTreeMap<TemplateId, CatalogTemplate>,
}

impl StaticCatalog {
    /// Builds a catalog; later templates replace earlier ones with the same
    /// identifier.
    #[must_use]
    pub fn new(templates: impl IntoIterator<Item = CatalogTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.template_id().clone(), template))
                .collect(),
        }
    }

    /// Parses a JSON array of templates.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogSourceError::Unavailable`] when the document does not
    /// decode.
    pub fn from_json(document: &str) -> CatalogSourceResult<Self> {
        let templates: Vec<CatalogTemplate> =
            serde_json::from_str(document).map_err(CatalogSourceError::unavailable)?;
        Ok(Self::new(templates))
    }

    /// Reads and parses a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogSourceError::Unavailable`] when the file cannot be
    /// read or decoded.
    pub fn from_path(path: impl AsRef<Path>) -> CatalogSourceResult<Self> {
        let document = std::fs::read_to_string(path).map_err(CatalogSourceError::unavailable)?;
        Self::from_json(&document)
    }
}

#[async_trait]
impl CatalogTemplateSource for StaticCatalog {
    async fn find(&self, template_id: &TemplateId) -> CatalogSourceResult<Option<CatalogTemplate>> {
        Ok(self.templates.get(template_id).cloned())
    }

    async fn list(&self) -> CatalogSourceResult<Vec<CatalogTemplate>> {
        Ok(self.templates.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_catalog_is_indexed_by_template_id() {
        let catalog = StaticCatalog::from_json(
            r#"[
                {"template_id": "time", "display_name": "Time",
                 "transport": {"kind": "process", "command": "uvx", "args": ["mcp-server-time"]}},
                {"template_id": "search", "display_name": "Search",
                 "transport": {"kind": "event_stream", "url": "https://search.example/sse"}}
            ]"#,
        )
        .expect("valid catalog");

        let time = TemplateId::new("time").expect("valid id");
        let found = catalog.find(&time).await.expect("lookup");
        assert_eq!(found.map(|template| template.display_name().to_owned()), Some("Time".to_owned()));
        assert_eq!(catalog.list().await.expect("list").len(), 2);
    }

    #[test]
    fn malformed_catalog_is_unavailable() {
        assert!(matches!(
            StaticCatalog::from_json("{not json"),
            Err(CatalogSourceError::Unavailable(_))
        ));
    }
}
