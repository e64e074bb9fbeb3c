//! Registry and lifecycle supervisor for configured tool servers.
//!
//! Each server id owns a slot whose control lock serializes every mutating
//! operation on that id. Slots are independent, so a hung server never
//! blocks work on another one.

use super::invocation_logger::{CompletedCall, InvocationLogger};
use crate::tool_server::{
    domain::{
        InvocationRecord, ServerConfig, ServerId, ServerStatus, SessionState, TemplateId,
        ToolCatalog,
    },
    ports::{
        InvocationLog, InvocationLogError, ServerConfigRepository, ServerConfigRepositoryError,
        ToolSchemaStore, ToolSchemaStoreError,
    },
    session::{ConnectOutcome, InvocationError, ServerSession, SessionError},
    settings::ManagerSettings,
    transport::TransportConnector,
};
use futures_util::future::join_all;
use mockable::Clock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, hash_map::Entry};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors for supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No server is registered under the identifier.
    #[error("tool server {0} not found")]
    NotFound(ServerId),

    /// The server is configured as disabled.
    #[error("tool server {0} is disabled")]
    Disabled(ServerId),

    /// Opening or handshaking with the server failed.
    #[error("failed to connect tool server {server_id}: {source}")]
    Connect {
        /// Affected server.
        server_id: ServerId,
        /// Session failure.
        #[source]
        source: SessionError,
    },

    /// The server is reachable but tool discovery failed.
    #[error("tool discovery failed for {server_id}: {source}")]
    Discovery {
        /// Affected server.
        server_id: ServerId,
        /// Session failure.
        #[source]
        source: SessionError,
    },

    /// Configuration persistence failed.
    #[error(transparent)]
    Repository(#[from] ServerConfigRepositoryError),

    /// Schema persistence failed.
    #[error(transparent)]
    SchemaStore(#[from] ToolSchemaStoreError),

    /// Invocation history could not be read.
    #[error(transparent)]
    InvocationLog(#[from] InvocationLogError),
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

struct ServerSlot<C> {
    control: tokio::sync::Mutex<()>,
    session: RwLock<ServerSession<C>>,
}

impl<C> ServerSlot<C> {
    fn new(session: ServerSession<C>) -> Self {
        Self {
            control: tokio::sync::Mutex::new(()),
            session: RwLock::new(session),
        }
    }

    fn session(&self) -> ServerSession<C> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, session: ServerSession<C>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

/// Persistence ports consumed by the supervisor.
pub struct SupervisorPorts<R, S, L> {
    /// Durable server configurations.
    pub repository: Arc<R>,
    /// Durable discovered catalogs.
    pub schemas: Arc<S>,
    /// Invocation audit sink.
    pub invocations: Arc<L>,
}

/// Holds every configured server and drives its session lifecycle.
pub struct ToolServerSupervisor<R, S, L, C> {
    repository: Arc<R>,
    schemas: Arc<S>,
    logger: InvocationLogger<L>,
    connector: Arc<dyn TransportConnector>,
    settings: ManagerSettings,
    clock: Arc<C>,
    slots: RwLock<HashMap<ServerId, Arc<ServerSlot<C>>>>,
}

impl<R, S, L, C> ToolServerSupervisor<R, S, L, C>
where
    R: ServerConfigRepository,
    S: ToolSchemaStore,
    L: InvocationLog,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an empty supervisor. Call [`Self::load`] to pick up stored
    /// configurations.
    #[must_use]
    pub fn new(
        ports: SupervisorPorts<R, S, L>,
        connector: Arc<dyn TransportConnector>,
        settings: ManagerSettings,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository: ports.repository,
            schemas: ports.schemas,
            logger: InvocationLogger::new(ports.invocations, settings.preview_chars),
            connector,
            settings,
            clock,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, server_id: ServerId) -> SupervisorResult<Arc<ServerSlot<C>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&server_id)
            .cloned()
            .ok_or(SupervisorError::NotFound(server_id))
    }

    fn all_slots(&self) -> Vec<(ServerId, Arc<ServerSlot<C>>)> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect()
    }

    fn build_session(&self, config: ServerConfig) -> ServerSession<C> {
        ServerSession::new(
            config,
            Arc::clone(&self.connector),
            self.settings,
            Arc::clone(&self.clock),
        )
    }

    fn insert_if_absent(&self, session: ServerSession<C>) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.entry(session.id()) {
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ServerSlot::new(session)));
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    async fn seed_from_store(&self, session: &ServerSession<C>) {
        match self.schemas.load(session.id()).await {
            Ok(Some(catalog)) => session.seed_catalog(catalog),
            Ok(None) => {}
            Err(err) => warn!(
                server_id = %session.id(),
                error = %err,
                "failed to load stored tool schema"
            ),
        }
    }

    async fn persist_catalog(&self, server_id: ServerId, catalog: &ToolCatalog) {
        if let Err(err) = self.schemas.replace(server_id, catalog).await {
            warn!(server_id = %server_id, error = %err, "failed to persist tool schema");
        }
    }

    /// Stores `config` and registers a session for it without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Repository`] when the repository rejects
    /// the configuration, including duplicate template installs.
    pub async fn register(&self, config: ServerConfig) -> SupervisorResult<ServerStatus> {
        self.repository.insert(&config).await?;
        let session = self.build_session(config);
        let status = session.status();
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id(), Arc::new(ServerSlot::new(session)));
        info!(server_id = %status.server_id, server_name = %status.name, "tool server registered");
        Ok(status)
    }

    /// Registers sessions for every stored configuration not yet known.
    /// Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Repository`] when configurations cannot be
    /// listed.
    pub async fn load(&self) -> SupervisorResult<usize> {
        let configs = self.repository.list_all().await?;
        let mut added = 0;
        for config in configs {
            if self.slot(config.id()).is_ok() {
                continue;
            }
            let session = self.build_session(config);
            self.seed_from_store(&session).await;
            if self.insert_if_absent(session) {
                added += 1;
            }
        }
        info!(loaded = added, "tool server configurations loaded");
        Ok(added)
    }

    async fn start_locked(
        &self,
        server_id: ServerId,
        session: &ServerSession<C>,
    ) -> SupervisorResult<ServerStatus> {
        match session.connect().await {
            Ok(ConnectOutcome::AlreadyConnected) => Ok(session.status()),
            Ok(ConnectOutcome::Established { discovery: Ok(catalog) }) => {
                self.persist_catalog(server_id, &catalog).await;
                Ok(session.status())
            }
            Ok(ConnectOutcome::Established { discovery: Err(source) }) => {
                Err(SupervisorError::Discovery { server_id, source })
            }
            Err(SessionError::Disabled) => Err(SupervisorError::Disabled(server_id)),
            Err(source) => Err(SupervisorError::Connect { server_id, source }),
        }
    }

    /// Connects the server and runs discovery.
    ///
    /// Starting a connected server is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`], [`SupervisorError::Disabled`],
    /// [`SupervisorError::Connect`] (the server is left in `error`), or
    /// [`SupervisorError::Discovery`] (the server stays connected).
    pub async fn start(&self, server_id: ServerId) -> SupervisorResult<ServerStatus> {
        let slot = self.slot(server_id)?;
        let _control = slot.control.lock().await;
        self.start_locked(server_id, &slot.session()).await
    }

    /// Starts every enabled server concurrently.
    pub async fn start_enabled(&self) -> BTreeMap<ServerId, SupervisorResult<ServerStatus>> {
        let enabled: Vec<ServerId> = self
            .all_slots()
            .into_iter()
            .filter(|(_, slot)| slot.session().config().is_enabled())
            .map(|(id, _)| id)
            .collect();
        let outcomes = join_all(enabled.iter().map(|id| self.start(*id))).await;
        enabled.into_iter().zip(outcomes).collect()
    }

    /// Disconnects the server, failing its pending calls with
    /// `ConnectionLost`. An in-flight connection attempt is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown servers.
    pub async fn stop(&self, server_id: ServerId) -> SupervisorResult<ServerStatus> {
        let slot = self.slot(server_id)?;
        // A start stuck opening the transport holds the control lock.
        slot.session().cancel_connect();
        let _control = slot.control.lock().await;
        let session = slot.session();
        session.disconnect().await;
        Ok(session.status())
    }

    /// Stops and starts the server as one serialized operation.
    ///
    /// # Errors
    ///
    /// As for [`Self::start`]. The previous connection's pending calls are
    /// always resolved before this returns.
    pub async fn restart(&self, server_id: ServerId) -> SupervisorResult<ServerStatus> {
        let slot = self.slot(server_id)?;
        let _control = slot.control.lock().await;
        let session = slot.session();
        session.disconnect().await;
        self.start_locked(server_id, &session).await
    }

    /// Replaces the session with one built from the stored configuration
    /// and starts it when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] when the server is unknown or
    /// no longer stored, repository failures, or start failures.
    pub async fn reload(&self, server_id: ServerId) -> SupervisorResult<ServerStatus> {
        let slot = self.slot(server_id)?;
        let _control = slot.control.lock().await;
        let config = self
            .repository
            .find_by_id(server_id)
            .await?
            .ok_or(SupervisorError::NotFound(server_id))?;

        slot.session().disconnect().await;
        let replacement = self.build_session(config);
        self.seed_from_store(&replacement).await;
        slot.replace(replacement.clone());
        info!(server_id = %server_id, "tool server configuration reloaded");

        if replacement.state() == SessionState::Disabled {
            return Ok(replacement.status());
        }
        self.start_locked(server_id, &replacement).await
    }

    /// Stops the server and deletes its configuration and stored catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown servers and
    /// persistence failures.
    pub async fn remove(&self, server_id: ServerId) -> SupervisorResult<()> {
        let slot = self.slot(server_id)?;
        slot.session().cancel_connect();
        let _control = slot.control.lock().await;
        slot.session().disconnect().await;
        self.schemas.remove(server_id).await?;
        self.repository.remove(server_id).await?;
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&server_id);
        info!(server_id = %server_id, "tool server removed");
        Ok(())
    }

    /// Disconnects every server.
    pub async fn shutdown(&self) {
        let slots = self.all_slots();
        join_all(slots.iter().map(|(_, slot)| async move {
            slot.session().cancel_connect();
            let _control = slot.control.lock().await;
            slot.session().disconnect().await
        }))
        .await;
        info!(servers = slots.len(), "tool servers shut down");
    }

    /// Re-runs discovery and persists the refreshed catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown servers and
    /// [`SupervisorError::Discovery`] when the session is not connected or
    /// discovery fails.
    pub async fn discover(&self, server_id: ServerId) -> SupervisorResult<Arc<ToolCatalog>> {
        let slot = self.slot(server_id)?;
        let _control = slot.control.lock().await;
        let catalog = slot
            .session()
            .discover()
            .await
            .map_err(|source| SupervisorError::Discovery { server_id, source })?;
        self.persist_catalog(server_id, &catalog).await;
        Ok(catalog)
    }

    /// Calls `tool` on the server and records exactly one invocation record.
    ///
    /// Unknown servers behave as disconnected ones.
    ///
    /// # Errors
    ///
    /// Returns the typed [`InvocationError`] of the call.
    pub async fn invoke(
        &self,
        server_id: ServerId,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, InvocationError> {
        let started_at = self.clock.utc();
        let started = Instant::now();
        let outcome = match self.slot(server_id) {
            Ok(slot) => slot.session().invoke(tool, arguments.clone(), timeout).await,
            Err(_) => Err(InvocationError::NotConnected(SessionState::Disconnected)),
        };
        self.logger
            .record(CompletedCall {
                server_id,
                tool,
                arguments: &arguments,
                outcome: outcome.as_ref(),
                started_at,
                duration: started.elapsed(),
            })
            .await;
        outcome
    }

    /// Returns the server's tool catalog.
    ///
    /// A connected server answers from its live catalog; otherwise the
    /// stored catalog is preferred.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown servers and schema
    /// store failures.
    pub async fn tools(&self, server_id: ServerId) -> SupervisorResult<Arc<ToolCatalog>> {
        let session = self.slot(server_id)?.session();
        if session.state() == SessionState::Connected {
            return Ok(session.catalog());
        }
        Ok(self
            .schemas
            .load(server_id)
            .await?
            .map_or_else(|| session.catalog(), Arc::new))
    }

    /// Returns the configuration installed from `template_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns repository failures.
    pub async fn find_by_template(
        &self,
        template_id: &TemplateId,
    ) -> SupervisorResult<Option<ServerConfig>> {
        Ok(self.repository.find_by_template(template_id).await?)
    }

    /// Returns the stored invocation history of the server.
    ///
    /// # Errors
    ///
    /// Returns invocation log read failures.
    pub async fn invocations(
        &self,
        server_id: ServerId,
    ) -> SupervisorResult<Vec<InvocationRecord>> {
        Ok(self.logger.history(server_id).await?)
    }

    /// Returns a point-in-time status of one server.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotFound`] for unknown servers.
    pub fn status(&self, server_id: ServerId) -> SupervisorResult<ServerStatus> {
        Ok(self.slot(server_id)?.session().status())
    }

    /// Returns a point-in-time copy of every server's status.
    #[must_use]
    pub fn status_snapshot(&self) -> BTreeMap<ServerId, ServerStatus> {
        self.all_slots()
            .into_iter()
            .map(|(id, slot)| (id, slot.session().status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_server::{
        adapters::{
            LoopbackCallMode, LoopbackConnector, LoopbackServer,
            memory::{InMemoryInvocationLog, InMemoryServerConfigRepository, InMemoryToolSchemaStore},
        },
        domain::{InvocationFailureKind, ServerName, ToolSchema, TransportConfig},
        transport::{ConnectError, Connection},
    };
    use async_trait::async_trait;
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};
    use serde_json::json;

    type TestSupervisor = ToolServerSupervisor<
        InMemoryServerConfigRepository,
        InMemoryToolSchemaStore,
        InMemoryInvocationLog,
        DefaultClock,
    >;

    struct Harness {
        connector: LoopbackConnector,
        repository: Arc<InMemoryServerConfigRepository>,
        schemas: Arc<InMemoryToolSchemaStore>,
        log: Arc<InMemoryInvocationLog>,
        supervisor: Arc<TestSupervisor>,
    }

    fn tool(name: &str) -> ToolSchema {
        ToolSchema::new(name, "", json!({"type": "object"})).expect("valid tool")
    }

    fn config(name: &str) -> ServerConfig {
        ServerConfig::new(
            ServerName::new(name).expect("valid name"),
            TransportConfig::process("loopback").expect("valid transport"),
            &DefaultClock,
        )
    }

    fn harness_with(connector: Arc<dyn TransportConnector>, loopback: LoopbackConnector) -> Harness {
        let repository = Arc::new(InMemoryServerConfigRepository::new());
        let schemas = Arc::new(InMemoryToolSchemaStore::new());
        let log = Arc::new(InMemoryInvocationLog::new());
        let supervisor = ToolServerSupervisor::new(
            SupervisorPorts {
                repository: Arc::clone(&repository),
                schemas: Arc::clone(&schemas),
                invocations: Arc::clone(&log),
            },
            connector,
            ManagerSettings::for_tests(),
            Arc::new(DefaultClock),
        );
        Harness {
            connector: loopback,
            repository,
            schemas,
            log,
            supervisor: Arc::new(supervisor),
        }
    }

    fn harness_for(server: LoopbackServer) -> Harness {
        let connector = LoopbackConnector::new(server);
        harness_with(Arc::new(connector.clone()), connector)
    }

    #[fixture]
    fn harness() -> Harness {
        harness_for(LoopbackServer::new(vec![tool("read_file"), tool("search")]))
    }

    async fn registered(harness: &Harness, name: &str) -> ServerId {
        harness
            .supervisor
            .register(config(name))
            .await
            .expect("registration succeeds")
            .server_id
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn start_discovers_and_persists_the_catalog(harness: Harness) {
        let id = registered(&harness, "Files").await;

        let status = harness.supervisor.start(id).await.expect("start succeeds");

        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.tool_count, 2);
        let stored = harness
            .schemas
            .load(id)
            .await
            .expect("store readable")
            .expect("catalog stored");
        assert!(stored.contains("search"));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_servers_are_not_found(harness: Harness) {
        let result = harness.supervisor.start(ServerId::new()).await;

        assert!(matches!(result, Err(SupervisorError::NotFound(_))));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_starts_open_one_connection(harness: Harness) {
        let id = registered(&harness, "Files").await;

        let starts = (0..8).map(|_| harness.supervisor.start(id));
        let outcomes = join_all(starts).await;

        assert!(outcomes.iter().all(Result::is_ok));
        assert_eq!(harness.connector.opens(), 1);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn every_invoke_writes_one_record(harness: Harness) {
        let id = registered(&harness, "Files").await;

        let before_start = harness.supervisor.invoke(id, "read_file", json!({}), None).await;
        harness.supervisor.start(id).await.expect("start succeeds");
        let success = harness
            .supervisor
            .invoke(id, "read_file", json!({"path": "a"}), None)
            .await;
        let unknown_tool = harness.supervisor.invoke(id, "nope", json!({}), None).await;
        let unknown_server = harness
            .supervisor
            .invoke(ServerId::new(), "read_file", json!({}), None)
            .await;

        assert!(matches!(before_start, Err(InvocationError::NotConnected(_))));
        assert!(success.is_ok());
        assert!(matches!(unknown_tool, Err(InvocationError::UnknownTool(_))));
        assert!(matches!(unknown_server, Err(InvocationError::NotConnected(_))));
        let records = harness.log.records().expect("records readable");
        assert_eq!(records.len(), 4);
        let kinds: Vec<_> = records
            .iter()
            .map(|record| record.failure().map(|failure| failure.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(InvocationFailureKind::NotConnected),
                None,
                Some(InvocationFailureKind::UnknownTool),
                Some(InvocationFailureKind::NotConnected),
            ]
        );
        let history = harness.supervisor.invocations(id).await.expect("history");
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|record| record.server_id() == id));
        assert_eq!(harness.connector.tool_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_resolves_pending_calls_before_returning() {
        let harness = harness_for(
            LoopbackServer::new(vec![tool("read_file")]).with_call_mode(LoopbackCallMode::Silent),
        );
        let id = registered(&harness, "Files").await;
        harness.supervisor.start(id).await.expect("start succeeds");
        let supervisor = Arc::clone(&harness.supervisor);
        let call =
            tokio::spawn(async move { supervisor.invoke(id, "read_file", json!({}), None).await });
        for _ in 0..200 {
            if harness.supervisor.status(id).expect("status").pending_requests == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = harness.supervisor.restart(id).await.expect("restart succeeds");

        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.pending_requests, 0);
        let outcome = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("pending call resolved by restart")
            .expect("call task completes");
        assert!(matches!(outcome, Err(InvocationError::ConnectionLost(_))));
        assert_eq!(harness.connector.opens(), 2);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn stop_disconnects_and_tools_fall_back_to_the_store(harness: Harness) {
        let id = registered(&harness, "Files").await;
        harness.supervisor.start(id).await.expect("start succeeds");

        let status = harness.supervisor.stop(id).await.expect("stop succeeds");

        assert_eq!(status.state, SessionState::Disconnected);
        let tools = harness.supervisor.tools(id).await.expect("tools readable");
        assert_eq!(tools.len(), 2);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn reload_applies_the_stored_configuration(harness: Harness) {
        let id = registered(&harness, "Files").await;
        harness.supervisor.start(id).await.expect("start succeeds");
        let stored = harness
            .repository
            .find_by_id(id)
            .await
            .expect("readable")
            .expect("stored");
        let disabled = stored.revise(stored.transport().clone(), false, &DefaultClock);
        harness.repository.update(&disabled).await.expect("update succeeds");

        let status = harness.supervisor.reload(id).await.expect("reload succeeds");

        assert_eq!(status.state, SessionState::Disabled);
        assert!(matches!(
            harness.supervisor.start(id).await,
            Err(SupervisorError::Disabled(_))
        ));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn load_registers_stored_servers_without_connecting(harness: Harness) {
        let stored = config("Stored");
        harness.repository.insert(&stored).await.expect("insert succeeds");

        let added = harness.supervisor.load().await.expect("load succeeds");
        let again = harness.supervisor.load().await.expect("second load succeeds");

        assert_eq!((added, again), (1, 0));
        let status = harness.supervisor.status(stored.id()).expect("registered");
        assert_eq!(status.state, SessionState::Disconnected);
        assert_eq!(harness.connector.opens(), 0);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn start_enabled_skips_disabled_servers(harness: Harness) {
        let enabled = registered(&harness, "On").await;
        let disabled = harness
            .supervisor
            .register(config("Off").with_enabled(false))
            .await
            .expect("registration succeeds")
            .server_id;

        let outcomes = harness.supervisor.start_enabled().await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes.get(&enabled).is_some_and(Result::is_ok));
        let snapshot = harness.supervisor.status_snapshot();
        assert_eq!(snapshot.get(&disabled).map(|status| status.state), Some(SessionState::Disabled));
        assert_eq!(snapshot.get(&enabled).map(|status| status.state), Some(SessionState::Connected));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_failures_leave_the_server_in_error() {
        let harness = harness_for(LoopbackServer::new(Vec::new()));
        harness.connector.fail_opens_with(Some(ConnectError::Spawn {
            command: "loopback".to_owned(),
            reason: "not found".to_owned(),
        }));
        let id = registered(&harness, "Broken").await;

        let result = harness.supervisor.start(id).await;

        assert!(matches!(result, Err(SupervisorError::Connect { .. })));
        assert_eq!(harness.supervisor.status(id).expect("status").state, SessionState::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discovery_failures_keep_the_server_connected() {
        let harness = harness_for(LoopbackServer::new(vec![tool("a")]).failing_discovery());
        let id = registered(&harness, "Flaky").await;

        let result = harness.supervisor.start(id).await;

        assert!(matches!(result, Err(SupervisorError::Discovery { .. })));
        assert_eq!(harness.supervisor.status(id).expect("status").state, SessionState::Connected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_with_failed_discovery_forgets_previous_tools() {
        let harness = harness_for(LoopbackServer::new(vec![tool("a")]));
        let id = registered(&harness, "Flaky").await;
        harness.supervisor.start(id).await.expect("start succeeds");
        harness.connector.set_server(LoopbackServer::new(vec![]).failing_discovery());

        let restarted = harness.supervisor.restart(id).await;
        let calls_before = harness.connector.tool_calls();
        let outcome = harness.supervisor.invoke(id, "a", json!({}), None).await;

        assert!(matches!(restarted, Err(SupervisorError::Discovery { .. })));
        let status = harness.supervisor.status(id).expect("status");
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.tool_count, 0);
        assert_eq!(outcome, Err(InvocationError::UnknownTool("a".to_owned())));
        assert_eq!(harness.connector.tool_calls(), calls_before);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn remove_forgets_the_server(harness: Harness) {
        let id = registered(&harness, "Files").await;
        harness.supervisor.start(id).await.expect("start succeeds");

        harness.supervisor.remove(id).await.expect("remove succeeds");

        assert!(matches!(harness.supervisor.status(id), Err(SupervisorError::NotFound(_))));
        assert!(harness.repository.find_by_id(id).await.expect("readable").is_none());
        assert!(harness.schemas.load(id).await.expect("readable").is_none());
    }

    struct StallingConnector {
        stalled: String,
        inner: LoopbackConnector,
    }

    #[async_trait]
    impl TransportConnector for StallingConnector {
        async fn open(&self, config: &ServerConfig) -> Result<Connection, ConnectError> {
            if config.name().as_str() == self.stalled {
                std::future::pending::<()>().await;
            }
            self.inner.open(config).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_stalled_server_does_not_block_others() {
        let loopback = LoopbackConnector::new(LoopbackServer::new(vec![tool("a")]));
        let connector = StallingConnector {
            stalled: "Stuck".to_owned(),
            inner: loopback.clone(),
        };
        let harness = harness_with(Arc::new(connector), loopback);
        let stuck = registered(&harness, "Stuck").await;
        let healthy = registered(&harness, "Healthy").await;
        let supervisor = Arc::clone(&harness.supervisor);
        let stalled = tokio::spawn(async move { supervisor.start(stuck).await });

        let started = tokio::time::timeout(Duration::from_secs(2), harness.supervisor.start(healthy))
            .await
            .expect("healthy server starts while another stalls");

        assert!(started.is_ok());
        assert_eq!(
            harness.supervisor.status(stuck).expect("status").state,
            SessionState::Connecting
        );
        let call = tokio::time::timeout(
            Duration::from_secs(2),
            harness.supervisor.invoke(healthy, "a", json!({}), None),
        )
        .await
        .expect("invoke is not blocked");
        assert!(call.is_ok());
        stalled.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_abandons_a_stalled_connection_attempt() {
        let loopback = LoopbackConnector::new(LoopbackServer::new(vec![tool("a")]));
        let connector = StallingConnector {
            stalled: "Stuck".to_owned(),
            inner: loopback.clone(),
        };
        let harness = harness_with(Arc::new(connector), loopback);
        let stuck = registered(&harness, "Stuck").await;
        let supervisor = Arc::clone(&harness.supervisor);
        let starting = tokio::spawn(async move { supervisor.start(stuck).await });
        for _ in 0..200 {
            if harness.supervisor.status(stuck).expect("status").state == SessionState::Connecting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stopped = tokio::time::timeout(Duration::from_secs(2), harness.supervisor.stop(stuck))
            .await
            .expect("stop does not wait out the connect timeout")
            .expect("stop succeeds");
        let started = starting.await.expect("start task completes");

        assert_eq!(stopped.state, SessionState::Disconnected);
        assert!(matches!(
            started,
            Err(SupervisorError::Connect {
                source: SessionError::Connect(ConnectError::Cancelled),
                ..
            })
        ));
    }
}
