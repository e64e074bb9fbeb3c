//! Tool schema value objects and per-server tool catalogs.

use super::ToolServerDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Metadata for one tool exposed by a tool server.
///
/// The input schema is carried for validation and display only; the manager
/// never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_object_schema")]
    input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

impl ToolSchema {
    /// Creates a tool schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyToolName`] when the name is empty
    /// after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolServerDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolServerDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human description, possibly empty.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input parameter schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// The complete set of tools one server reported in a discovery pass.
///
/// Catalogs are replaced wholesale; they are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ToolSchema>", into = "Vec<ToolSchema>")]
pub struct ToolCatalog {
    tools: Vec<ToolSchema>,
}

impl ToolCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// Builds a catalog, preserving discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::DuplicateToolName`] when two tools
    /// share a name.
    pub fn from_tools(tools: Vec<ToolSchema>) -> Result<Self, ToolServerDomainError> {
        let mut seen = BTreeSet::new();
        for tool in &tools {
            if !seen.insert(tool.name()) {
                return Err(ToolServerDomainError::DuplicateToolName(
                    tool.name().to_owned(),
                ));
            }
        }
        Ok(Self { tools })
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Returns whether a tool with `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of tools.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the catalog holds no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Iterates over the tools in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.tools.iter()
    }

    /// Returns tool names in discovery order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(ToolSchema::name).collect()
    }
}

impl TryFrom<Vec<ToolSchema>> for ToolCatalog {
    type Error = ToolServerDomainError;

    fn try_from(value: Vec<ToolSchema>) -> Result<Self, Self::Error> {
        Self::from_tools(value)
    }
}

impl From<ToolCatalog> for Vec<ToolSchema> {
    fn from(value: ToolCatalog) -> Self {
        value.tools
    }
}
