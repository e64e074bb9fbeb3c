//! Static catalog templates used to pre-fill new server configurations.

use super::TemplateId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One user-supplied value a template expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    /// Placeholder name referenced as `{{ key }}` in the transport template.
    pub key: String,
    /// Operator-facing label.
    #[serde(default)]
    pub label: String,
    /// Whether installation fails when no value is supplied.
    #[serde(default)]
    pub required: bool,
    /// Value used when the operator supplies none.
    #[serde(default)]
    pub default: Option<String>,
    /// Whether the value is a credential that must not be echoed.
    #[serde(default)]
    pub secret: bool,
}

impl TemplateField {
    /// Creates an optional field with no default.
    #[must_use]
    pub fn optional(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            required: false,
            default: None,
            secret: false,
        }
    }

    /// Creates a required field.
    #[must_use]
    pub fn required(key: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::optional(key)
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field as secret.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Transport settings whose string values may contain `{{ field }}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransportTemplate {
    /// Local process template.
    Process {
        /// Command to execute.
        command: String,
        /// Command arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Environment entries; empty rendered values are dropped.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Optional working directory.
        #[serde(default)]
        working_directory: Option<String>,
    },
    /// HTTP event-stream template.
    EventStream {
        /// Stream URL.
        url: String,
        /// Request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// Socket template.
    Socket {
        /// Socket endpoint.
        endpoint: String,
        /// Connection headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

/// A pre-defined description of a tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTemplate {
    template_id: TemplateId,
    display_name: String,
    #[serde(default)]
    description: String,
    transport: TransportTemplate,
    #[serde(default)]
    fields: Vec<TemplateField>,
}

impl CatalogTemplate {
    /// Creates a template with no fields.
    #[must_use]
    pub fn new(
        template_id: TemplateId,
        display_name: impl Into<String>,
        transport: TransportTemplate,
    ) -> Self {
        Self {
            template_id,
            display_name: display_name.into(),
            description: String::new(),
            transport,
            fields: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: TemplateField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the template identifier.
    #[must_use]
    pub const fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    /// Returns the display name used for installed servers.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the transport template.
    #[must_use]
    pub const fn transport(&self) -> &TransportTemplate {
        &self.transport
    }

    /// Returns the declared fields.
    #[must_use]
    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }
}
