//! Tool server configuration aggregate.

use super::{ServerId, ServerName, TemplateId, TransportConfig, TransportKind};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Immutable description of how to reach one tool server.
///
/// A change to any field produces a new value through [`ServerConfig::revise`];
/// running sessions pick it up only on reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    id: ServerId,
    name: ServerName,
    #[serde(default)]
    template_id: Option<TemplateId>,
    transport: TransportConfig,
    #[serde(default = "default_enabled")]
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const fn default_enabled() -> bool {
    true
}

/// Parameter object for reconstructing a persisted server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedServerConfigData {
    /// Persisted server identifier.
    pub id: ServerId,
    /// Persisted display name.
    pub name: ServerName,
    /// Persisted catalog template identifier, if installed from a template.
    pub template_id: Option<TemplateId>,
    /// Persisted transport settings.
    pub transport: TransportConfig,
    /// Persisted enabled flag.
    pub enabled: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ServerConfig {
    /// Creates a new enabled server configuration.
    #[must_use]
    pub fn new(name: ServerName, transport: TransportConfig, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: ServerId::new(),
            name,
            template_id: None,
            transport,
            enabled: true,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a configuration from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedServerConfigData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            template_id: data.template_id,
            transport: data.transport,
            enabled: data.enabled,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Records the catalog template this configuration was installed from.
    #[must_use]
    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Produces a revised configuration with the same identity.
    #[must_use]
    pub fn revise(
        &self,
        transport: TransportConfig,
        enabled: bool,
        clock: &impl Clock,
    ) -> Self {
        Self {
            transport,
            enabled,
            updated_at: clock.utc(),
            ..self.clone()
        }
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> ServerId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the catalog template identifier, if any.
    #[must_use]
    pub const fn template_id(&self) -> Option<&TemplateId> {
        self.template_id.as_ref()
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Returns whether the server is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;

    fn build_config(clock: &DefaultClock) -> ServerConfig {
        let name = ServerName::new("Filesystem").expect("valid server name");
        let transport = TransportConfig::process("mcp-server-filesystem").expect("valid transport");
        ServerConfig::new(name, transport, clock)
    }

    #[test]
    fn new_config_is_enabled_without_template() {
        let config = build_config(&DefaultClock);

        assert!(config.is_enabled());
        assert!(config.template_id().is_none());
        assert_eq!(config.transport_kind(), TransportKind::Process);
        assert_eq!(config.created_at(), config.updated_at());
    }

    #[test]
    fn revise_keeps_identity() {
        let clock = DefaultClock;
        let original = build_config(&clock);
        let transport = TransportConfig::socket("tcp://127.0.0.1:9100").expect("valid transport");

        let revised = original.revise(transport, false, &clock);

        assert_eq!(revised.id(), original.id());
        assert_eq!(revised.name(), original.name());
        assert!(!revised.is_enabled());
        assert_eq!(revised.transport_kind(), TransportKind::Socket);
        assert!(revised.updated_at() >= original.updated_at());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = build_config(&DefaultClock)
            .with_template(TemplateId::new("filesystem").expect("valid template id"));

        let encoded = serde_json::to_string(&config).expect("serializable config");
        let decoded: ServerConfig = serde_json::from_str(&encoded).expect("deserializable config");

        assert_eq!(decoded, config);
    }
}
