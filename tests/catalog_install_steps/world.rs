//! Shared world state for catalog installation scenarios.

use conduit::tool_server::{
    adapters::{
        LoopbackConnector, LoopbackServer, StaticCatalog,
        memory::{InMemoryInvocationLog, InMemoryServerConfigRepository, InMemoryToolSchemaStore},
    },
    domain::ToolSchema,
    services::{
        CatalogInstaller, InstallError, InstallReport, SupervisorPorts, ToolServerSupervisor,
    },
    settings::ManagerSettings,
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::json;
use std::sync::Arc;

/// Installer type used by the installation world.
pub type TestInstaller = CatalogInstaller<
    StaticCatalog,
    InMemoryServerConfigRepository,
    InMemoryToolSchemaStore,
    InMemoryInvocationLog,
    DefaultClock,
>;

/// Scenario world for catalog installation behaviour tests.
#[derive(Default)]
pub struct InstallWorld {
    /// Configuration store shared with the supervisor.
    pub repository: Arc<InMemoryServerConfigRepository>,
    /// Installer under test, available once a catalog is set up.
    pub installer: Option<TestInstaller>,
    /// Outcomes of every installation attempt, oldest first.
    pub outcomes: Vec<Result<InstallReport, InstallError>>,
}

impl InstallWorld {
    /// Builds an installer over `catalog` backed by a loopback server.
    pub fn install_catalog(&mut self, catalog: StaticCatalog) -> Result<(), eyre::Report> {
        let tool = ToolSchema::new("now", "current time", json!({"type": "object"}))
            .map_err(|err| eyre::eyre!("invalid tool: {err}"))?;
        let settings = ManagerSettings::for_tests();
        let clock = Arc::new(DefaultClock);
        let supervisor = ToolServerSupervisor::new(
            SupervisorPorts {
                repository: Arc::clone(&self.repository),
                schemas: Arc::new(InMemoryToolSchemaStore::new()),
                invocations: Arc::new(InMemoryInvocationLog::new()),
            },
            Arc::new(LoopbackConnector::new(LoopbackServer::new(vec![tool]))),
            settings,
            Arc::clone(&clock),
        );
        self.installer = Some(CatalogInstaller::new(
            Arc::new(catalog),
            Arc::new(supervisor),
            clock,
        ));
        Ok(())
    }

    pub fn installer(&self) -> Result<&TestInstaller, eyre::Report> {
        self.installer
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no catalog configured in scenario world"))
    }

    pub fn last_outcome(&self) -> Result<&Result<InstallReport, InstallError>, eyre::Report> {
        self.outcomes
            .last()
            .ok_or_else(|| eyre::eyre!("no installation attempted in scenario world"))
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> InstallWorld {
    InstallWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
