//! Production connector selecting the adapter for each transport kind.

use super::{Connection, ConnectError, TransportConnector, event_stream, process, socket};
use crate::tool_server::domain::{ServerConfig, TransportConfig};
use crate::tool_server::settings::ManagerSettings;
use async_trait::async_trait;

/// Connector for process, event-stream, and socket tool servers.
#[derive(Debug, Clone)]
pub struct DefaultTransportConnector {
    client: reqwest::Client,
    settings: ManagerSettings,
}

impl DefaultTransportConnector {
    /// Creates a connector with a fresh HTTP client.
    #[must_use]
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Creates a connector sharing an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, settings: ManagerSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl TransportConnector for DefaultTransportConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Connection, ConnectError> {
        let server_id = config.id();
        match config.transport() {
            TransportConfig::Process(transport) => {
                process::open(server_id, transport, &self.settings)
            }
            TransportConfig::EventStream(transport) => {
                event_stream::open(server_id, &self.client, transport, &self.settings).await
            }
            TransportConfig::Socket(transport) => {
                socket::open(server_id, transport, &self.settings).await
            }
        }
    }
}
