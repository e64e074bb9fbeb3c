//! Shared world state for tool server lifecycle scenarios.

use conduit::tool_server::{
    adapters::{
        LoopbackConnector,
        memory::{InMemoryInvocationLog, InMemoryServerConfigRepository, InMemoryToolSchemaStore},
    },
    domain::{ServerId, ToolSchema},
    services::{SupervisorPorts, ToolServerSupervisor},
    session::InvocationError,
    settings::ManagerSettings,
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Supervisor type used by the lifecycle world.
pub type LifecycleSupervisor = ToolServerSupervisor<
    InMemoryServerConfigRepository,
    InMemoryToolSchemaStore,
    InMemoryInvocationLog,
    DefaultClock,
>;

/// Scenario world for lifecycle behaviour tests.
#[derive(Default)]
pub struct LifecycleWorld {
    /// Loopback connector standing in for the tool server.
    pub connector: Option<LoopbackConnector>,
    /// The supervisor under test.
    pub supervisor: Option<Arc<LifecycleSupervisor>>,
    /// Invocation log shared with the supervisor.
    pub log: Arc<InMemoryInvocationLog>,
    /// Identifier of the registered server.
    pub server_id: Option<ServerId>,
    /// Outcome of the last synchronous invocation.
    pub last_invocation: Option<Result<Value, InvocationError>>,
    /// Calls spawned and left waiting on the server.
    pub pending: Vec<JoinHandle<Result<Value, InvocationError>>>,
}

impl LifecycleWorld {
    /// Wires a supervisor to `connector`.
    pub fn install(&mut self, connector: LoopbackConnector) {
        let settings = ManagerSettings::for_tests();
        let supervisor = ToolServerSupervisor::new(
            SupervisorPorts {
                repository: Arc::new(InMemoryServerConfigRepository::new()),
                schemas: Arc::new(InMemoryToolSchemaStore::new()),
                invocations: Arc::clone(&self.log),
            },
            Arc::new(connector.clone()),
            settings,
            Arc::new(DefaultClock),
        );
        self.connector = Some(connector);
        self.supervisor = Some(Arc::new(supervisor));
    }

    pub fn supervisor(&self) -> Result<Arc<LifecycleSupervisor>, eyre::Report> {
        self.supervisor
            .clone()
            .ok_or_else(|| eyre::eyre!("no tool server configured in scenario world"))
    }

    pub fn connector(&self) -> Result<&LoopbackConnector, eyre::Report> {
        self.connector
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no tool server configured in scenario world"))
    }

    pub fn server_id(&self) -> Result<ServerId, eyre::Report> {
        self.server_id
            .ok_or_else(|| eyre::eyre!("no server registered in scenario world"))
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> LifecycleWorld {
    LifecycleWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Builds tool schemas from a comma-separated list of names.
pub fn tools_named(list: &str) -> Result<Vec<ToolSchema>, eyre::Report> {
    list.split(',')
        .map(|name| {
            ToolSchema::new(name.trim(), format!("{name} tool"), json!({"type": "object"}))
                .map_err(|err| eyre::eyre!("invalid tool '{name}': {err}"))
        })
        .collect()
}
