//! One tool server's connection lifecycle, catalog, and invocation path.

use super::correlator::RequestCorrelator;
use super::error::{InvocationError, RemoteError, RequestFailure, SessionError};
use super::receive::{LinkObserver, ReceiveLoop};
use crate::tool_server::domain::{ServerConfig, ServerId, ServerStatus, SessionState, ToolCatalog};
use crate::tool_server::protocol::{
    CallToolOutcome, ProtocolError, call_tool_params, decode_call_result, decode_initialize,
    decode_tools_page, initialize_params, list_tools_params, methods, notification, request,
};
use crate::tool_server::settings::ManagerSettings;
use crate::tool_server::transport::{
    ConnectError, Connection, FrameSink, TransportConnector, TransportError,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of [`ServerSession::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The session was already connected; nothing changed.
    AlreadyConnected,
    /// A new connection was established and discovery ran.
    Established {
        /// Outcome of the discovery pass that followed the handshake.
        discovery: Result<Arc<ToolCatalog>, SessionError>,
    },
}

/// Runtime wrapper around one configured tool server.
///
/// Cloning yields another handle to the same session.
pub struct ServerSession<C> {
    inner: Arc<SessionInner<C>>,
}

impl<C> Clone for ServerSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<C> {
    config: ServerConfig,
    connector: Arc<dyn TransportConnector>,
    settings: ManagerSettings,
    clock: Arc<C>,
    control: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    runtime: RwLock<Runtime>,
    // Set while `connect` is opening or handshaking.
    connecting: Mutex<Option<CancellationToken>>,
}

struct Runtime {
    state: SessionState,
    last_error: Option<String>,
    connected_since: Option<DateTime<Utc>>,
    catalog: Arc<ToolCatalog>,
    catalog_stale: bool,
    link: Option<Arc<LiveLink>>,
    diagnostics: Vec<String>,
}

impl Runtime {
    fn transition(&mut self, target: SessionState) -> bool {
        if self.state == target {
            return false;
        }
        if !self.state.can_transition_to(target) {
            debug!(from = %self.state, to = %target, "refusing session state transition");
            return false;
        }
        self.state = target;
        true
    }

    /// Detaches the live link, keeping its last diagnostics.
    fn detach(&mut self) -> Option<Arc<LiveLink>> {
        let link = self.link.take()?;
        self.diagnostics = link.sink.diagnostics();
        self.connected_since = None;
        Some(link)
    }
}

struct LiveLink {
    generation: u64,
    sink: Arc<dyn FrameSink>,
    correlator: RequestCorrelator,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveLink {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RequestFailure> {
        let mut pending = self.correlator.register(timeout)?;
        debug!(correlation_id = pending.id(), method, "sending request");
        // The write shares the call's deadline; a peer that stops reading
        // must not hold the caller past it.
        let frame = request(pending.id(), method, params);
        pending
            .within(self.sink.send(frame))
            .await?
            .map_err(RequestFailure::Send)?;
        pending
            .wait()
            .await?
            .map_err(|err| RequestFailure::Remote(RemoteError::from(err)))
    }

    async fn notify(&self, method: &str) -> Result<(), TransportError> {
        self.sink.send(notification(method, None)).await
    }

    /// Fails pending requests, closes the transport, and stops the receive
    /// loop. Returns the number of requests failed.
    async fn shutdown(&self, reason: &str) -> usize {
        let failed = self.correlator.fail_all(reason);
        self.sink.close().await;
        self.abort_receiver();
        failed
    }

    fn abort_receiver(&self) {
        let task = self
            .receive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = task {
            handle.abort();
        }
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        // An abandoned handshake leaves its receive loop running otherwise.
        self.abort_receiver();
    }
}

impl<C> SessionInner<C> {
    fn runtime(&self) -> RwLockReadGuard<'_, Runtime> {
        self.runtime.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime_mut(&self) -> RwLockWriteGuard<'_, Runtime> {
        self.runtime.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn connecting(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.connecting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> LinkObserver for SessionInner<C>
where
    C: Send + Sync,
{
    fn link_failed(&self, generation: u64, reason: String) {
        let mut runtime = self.runtime_mut();
        if runtime.link.as_ref().map(|link| link.generation) != Some(generation) {
            debug!(server_id = %self.config.id(), generation, "ignoring failure of a retired link");
            return;
        }
        runtime.detach();
        runtime.transition(SessionState::Error);
        warn!(
            server_id = %self.config.id(),
            server_name = %self.config.name(),
            error = %reason,
            "tool server connection failed"
        );
        runtime.last_error = Some(reason);
    }

    fn catalog_changed(&self, generation: u64) {
        let mut runtime = self.runtime_mut();
        if runtime.link.as_ref().map(|link| link.generation) == Some(generation) {
            runtime.catalog_stale = true;
        }
    }
}

impl<C> Drop for SessionInner<C> {
    fn drop(&mut self) {
        let runtime = self.runtime.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = runtime.link.take() {
            link.correlator.fail_all("session dropped");
            link.abort_receiver();
        }
    }
}

impl<C> ServerSession<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a session in its initial state. No connection is opened.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        connector: Arc<dyn TransportConnector>,
        settings: ManagerSettings,
        clock: Arc<C>,
    ) -> Self {
        let runtime = Runtime {
            state: SessionState::initial(config.is_enabled()),
            last_error: None,
            connected_since: None,
            catalog: Arc::new(ToolCatalog::empty()),
            catalog_stale: false,
            link: None,
            diagnostics: Vec::new(),
        };
        Self {
            inner: Arc::new(SessionInner {
                config,
                connector,
                settings,
                clock,
                control: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                runtime: RwLock::new(runtime),
                connecting: Mutex::new(None),
            }),
        }
    }

    /// Replaces the catalog of a disconnected session, typically with a
    /// persisted copy.
    ///
    /// The copy is marked stale and is only shown while disconnected. A new
    /// connection starts from an empty catalog and admits calls only to
    /// tools its own discovery returned.
    pub fn seed_catalog(&self, catalog: ToolCatalog) {
        let mut runtime = self.inner.runtime_mut();
        if runtime.link.is_none() {
            runtime.catalog = Arc::new(catalog);
            runtime.catalog_stale = true;
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the server identifier.
    #[must_use]
    pub fn id(&self) -> ServerId {
        self.inner.config.id()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.runtime().state
    }

    /// Returns the current tool catalog.
    #[must_use]
    pub fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.inner.runtime().catalog)
    }

    /// Returns the number of outstanding requests on the live connection.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner
            .runtime()
            .link
            .as_ref()
            .map_or(0, |link| link.correlator.pending_count())
    }

    /// Returns a detached copy of the session's status.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        let runtime = self.inner.runtime();
        let (pending_requests, diagnostics) = runtime.link.as_ref().map_or_else(
            || (0, runtime.diagnostics.clone()),
            |link| (link.correlator.pending_count(), link.sink.diagnostics()),
        );
        ServerStatus {
            server_id: self.inner.config.id(),
            name: self.inner.config.name().clone(),
            transport: self.inner.config.transport_kind(),
            state: runtime.state,
            last_error: runtime.last_error.clone(),
            connected_since: runtime.connected_since,
            tool_count: runtime.catalog.len(),
            catalog_stale: runtime.catalog_stale,
            pending_requests,
            diagnostics,
        }
    }

    /// Opens the transport, performs the handshake, and runs discovery.
    ///
    /// A connected session is left untouched. Discovery failure is reported
    /// in [`ConnectOutcome::Established`] and does not change the state; the
    /// session then holds an empty catalog until discovery is retried.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disabled`] for disabled servers and
    /// [`SessionError::Connect`] when opening or handshaking fails or is
    /// cancelled, in which case the session is left in `error`.
    pub async fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let _control = self.inner.control.lock().await;
        let cancel = CancellationToken::new();
        {
            let mut runtime = self.inner.runtime_mut();
            match runtime.state {
                SessionState::Disabled => return Err(SessionError::Disabled),
                SessionState::Connected | SessionState::Connecting => {
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
                SessionState::Disconnected | SessionState::Error => {
                    // Published before the state so a stop observing
                    // `connecting` can always cancel.
                    *self.inner.connecting() = Some(cancel.clone());
                    runtime.transition(SessionState::Connecting);
                }
            }
        }
        info!(
            server_id = %self.id(),
            server_name = %self.inner.config.name(),
            transport = %self.inner.config.transport_kind(),
            "connecting to tool server"
        );

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let established = tokio::select! {
            established = self.establish(generation) => established,
            () = cancel.cancelled() => Err(ConnectError::Cancelled),
        };
        self.inner.connecting().take();
        let link = match established {
            Ok(link) => link,
            Err(err) => {
                let mut runtime = self.inner.runtime_mut();
                runtime.transition(SessionState::Error);
                runtime.last_error = Some(err.to_string());
                warn!(server_id = %self.id(), error = %err, "failed to connect to tool server");
                return Err(err.into());
            }
        };

        {
            let mut runtime = self.inner.runtime_mut();
            if link.correlator.is_closed() {
                // The transport died between handshake and installation.
                runtime.transition(SessionState::Error);
                runtime.last_error = Some("connection lost during handshake".to_owned());
                return Err(ConnectError::Handshake("connection lost".to_owned()).into());
            }
            runtime.transition(SessionState::Connected);
            runtime.connected_since = Some(self.inner.clock.utc());
            runtime.last_error = None;
            runtime.diagnostics.clear();
            // Tools are known only through this link's own discovery.
            runtime.catalog = Arc::new(ToolCatalog::empty());
            runtime.catalog_stale = false;
            runtime.link = Some(Arc::clone(&link));
        }
        info!(server_id = %self.id(), "tool server connected");

        let discovery = self.discover_on(&link).await;
        Ok(ConnectOutcome::Established { discovery })
    }

    async fn establish(&self, generation: u64) -> Result<Arc<LiveLink>, ConnectError> {
        let settings = &self.inner.settings;
        let timeout = settings.connect_timeout();
        let Connection { sink, inbound } =
            tokio::time::timeout(timeout, self.inner.connector.open(&self.inner.config))
                .await
                .map_err(|_| ConnectError::Timeout(timeout))??;

        let correlator =
            RequestCorrelator::new(settings.request_timeout(), settings.max_pending_requests);
        let sessions: Weak<SessionInner<C>> = Arc::downgrade(&self.inner);
        let observer: Weak<dyn LinkObserver> = sessions;
        let receive = ReceiveLoop {
            server_id: self.id(),
            generation,
            sink: Arc::clone(&sink),
            correlator: correlator.clone(),
            observer,
            sweep_interval: settings.sweep_interval(),
        };
        let link = Arc::new(LiveLink {
            generation,
            sink,
            correlator,
            receive_task: Mutex::new(Some(tokio::spawn(receive.run(inbound)))),
        });

        match self.handshake(&link, timeout).await {
            Ok(()) => Ok(link),
            Err(err) => {
                link.shutdown("handshake failed").await;
                Err(ConnectError::Handshake(err.to_string()))
            }
        }
    }

    async fn handshake(&self, link: &LiveLink, timeout: Duration) -> Result<(), SessionError> {
        let result = link
            .request(methods::INITIALIZE, Some(initialize_params()), Some(timeout))
            .await?;
        let initialized = decode_initialize(result)?;
        link.notify(methods::INITIALIZED).await?;
        info!(
            server_id = %self.id(),
            protocol_version = %initialized.protocol_version,
            remote_name = initialized.server_info.as_deref().unwrap_or("unknown"),
            "tool server handshake complete"
        );
        Ok(())
    }

    /// Abandons an in-flight [`ServerSession::connect`], which then fails
    /// with [`ConnectError::Cancelled`]. Returns whether one was running.
    pub fn cancel_connect(&self) -> bool {
        let Some(token) = self.inner.connecting().take() else {
            return false;
        };
        token.cancel();
        true
    }

    /// Tears down the live connection, failing every pending request with
    /// `ConnectionLost`. Returns the number of requests failed.
    pub async fn disconnect(&self) -> usize {
        let _control = self.inner.control.lock().await;
        let link = {
            let mut runtime = self.inner.runtime_mut();
            let link = runtime.detach();
            runtime.transition(SessionState::Disconnected);
            link
        };
        let Some(link) = link else {
            return 0;
        };
        let failed = link.shutdown("session stopped").await;
        info!(server_id = %self.id(), failed_requests = failed, "tool server disconnected");
        failed
    }

    /// Re-runs discovery and replaces the catalog on success.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected, or the
    /// request or protocol failure that aborted discovery. The previous
    /// catalog is kept on failure.
    pub async fn discover(&self) -> Result<Arc<ToolCatalog>, SessionError> {
        let _control = self.inner.control.lock().await;
        let link = {
            let runtime = self.inner.runtime();
            match (&runtime.link, runtime.state) {
                (Some(link), SessionState::Connected) => Arc::clone(link),
                (_, state) => return Err(SessionError::NotConnected(state)),
            }
        };
        self.discover_on(&link).await
    }

    async fn discover_on(&self, link: &Arc<LiveLink>) -> Result<Arc<ToolCatalog>, SessionError> {
        let result = self.fetch_catalog(link).await;
        match result {
            Ok(discovered) => {
                let catalog = Arc::new(discovered);
                let mut runtime = self.inner.runtime_mut();
                if runtime.link.as_ref().is_some_and(|live| Arc::ptr_eq(live, link)) {
                    runtime.catalog = Arc::clone(&catalog);
                    runtime.catalog_stale = false;
                }
                info!(server_id = %self.id(), tool_count = catalog.len(), "tool discovery complete");
                Ok(catalog)
            }
            Err(err) => {
                warn!(server_id = %self.id(), error = %err, "tool discovery failed");
                Err(err)
            }
        }
    }

    async fn fetch_catalog(&self, link: &LiveLink) -> Result<ToolCatalog, SessionError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let result = link
                .request(methods::TOOLS_LIST, list_tools_params(cursor.as_deref()), None)
                .await?;
            let page = decode_tools_page(result)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(ProtocolError::UnexpectedResult {
                        method: methods::TOOLS_LIST,
                        reason: format!("cursor '{next}' repeated"),
                    }
                    .into());
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        ToolCatalog::from_tools(tools).map_err(|err| {
            ProtocolError::UnexpectedResult {
                method: methods::TOOLS_LIST,
                reason: err.to_string(),
            }
            .into()
        })
    }

    /// Calls `tool` with `arguments`.
    ///
    /// Uses the configured default deadline when `timeout` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NotConnected`] unless connected and
    /// [`InvocationError::UnknownTool`] for names outside the catalog, both
    /// without touching the transport; otherwise the typed failure of the
    /// call.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, InvocationError> {
        let link = {
            let runtime = self.inner.runtime();
            let link = match (&runtime.link, runtime.state) {
                (Some(link), state) if state.accepts_invocations() => Arc::clone(link),
                (_, state) => return Err(InvocationError::NotConnected(state)),
            };
            if !runtime.catalog.contains(tool) {
                return Err(InvocationError::UnknownTool(tool.to_owned()));
            }
            link
        };

        let result = link
            .request(methods::TOOLS_CALL, Some(call_tool_params(tool, arguments)), timeout)
            .await?;
        match decode_call_result(result) {
            CallToolOutcome::Success(payload) => Ok(payload),
            CallToolOutcome::ToolError { message, payload } => {
                Err(InvocationError::Remote(RemoteError {
                    code: None,
                    message,
                    data: Some(payload),
                }))
            }
        }
    }
}

impl<C> std::fmt::Debug for ServerSession<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerSession")
            .field("server_id", &self.inner.config.id())
            .field("state", &self.inner.runtime().state)
            .finish_non_exhaustive()
    }
}
