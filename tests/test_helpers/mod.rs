//! Shared supervisor harness for transport integration tests.

use conduit::tool_server::{
    adapters::memory::{
        InMemoryInvocationLog, InMemoryServerConfigRepository, InMemoryToolSchemaStore,
    },
    domain::{ServerConfig, ServerId, ServerName, ServerStatus, SessionState, TransportConfig},
    services::{SupervisorPorts, ToolServerSupervisor},
    settings::ManagerSettings,
    transport::DefaultTransportConnector,
};
use mockable::DefaultClock;
use std::sync::Arc;
use std::time::Duration;

/// Supervisor wired to in-memory ports and the real transports.
pub type MemorySupervisor = ToolServerSupervisor<
    InMemoryServerConfigRepository,
    InMemoryToolSchemaStore,
    InMemoryInvocationLog,
    DefaultClock,
>;

/// A supervisor together with the invocation log it writes to.
pub struct Harness {
    pub supervisor: Arc<MemorySupervisor>,
    pub log: Arc<InMemoryInvocationLog>,
}

impl Harness {
    pub fn new() -> Self {
        let settings = ManagerSettings::for_tests();
        let log = Arc::new(InMemoryInvocationLog::new());
        let supervisor = ToolServerSupervisor::new(
            SupervisorPorts {
                repository: Arc::new(InMemoryServerConfigRepository::new()),
                schemas: Arc::new(InMemoryToolSchemaStore::new()),
                invocations: Arc::clone(&log),
            },
            Arc::new(DefaultTransportConnector::new(settings)),
            settings,
            Arc::new(DefaultClock),
        );
        Self {
            supervisor: Arc::new(supervisor),
            log,
        }
    }

    /// Registers a server named `name` using `transport`.
    pub async fn register(&self, name: &str, transport: TransportConfig) -> ServerId {
        let config = ServerConfig::new(
            ServerName::new(name).expect("valid server name"),
            transport,
            &DefaultClock,
        );
        let server_id = config.id();
        self.supervisor
            .register(config)
            .await
            .expect("registration succeeds");
        server_id
    }

    pub fn status(&self, server_id: ServerId) -> ServerStatus {
        self.supervisor.status(server_id).expect("server is registered")
    }

    /// Polls until the server reaches `state` or the deadline passes.
    pub async fn wait_for_state(&self, server_id: ServerId, state: SessionState) -> ServerStatus {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = self.status(server_id);
            if status.state == state || tokio::time::Instant::now() >= deadline {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
