//! Turns catalog templates plus operator values into registered servers.

use super::supervisor::{SupervisorError, ToolServerSupervisor};
use crate::tool_server::{
    domain::{
        CatalogTemplate, EventStreamTransportConfig, ProcessTransportConfig, ServerConfig,
        ServerId, ServerName, ServerStatus, SocketTransportConfig, TemplateId,
        ToolServerDomainError, TransportConfig, TransportTemplate,
    },
    ports::{
        CatalogSourceError, CatalogTemplateSource, InvocationLog, ServerConfigRepository,
        ServerConfigRepositoryError, ToolSchemaStore,
    },
};
use minijinja::Environment;
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Installation failures.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The catalog has no template with this identifier.
    #[error("unknown catalog template: {0}")]
    UnknownTemplate(TemplateId),

    /// A server from this template is already registered.
    #[error("a tool server from template {0} is already installed")]
    Conflict(TemplateId),

    /// A required field has no value and no default.
    #[error("template {template_id} requires a value for '{field}'")]
    MissingField {
        /// Template being installed.
        template_id: TemplateId,
        /// Field key.
        field: String,
    },

    /// A template value failed to render.
    #[error("failed to render {location}: {reason}")]
    Render {
        /// Which transport value failed, such as `env.API_KEY`.
        location: String,
        /// Renderer detail.
        reason: String,
    },

    /// The rendered configuration is invalid.
    #[error(transparent)]
    Domain(#[from] ToolServerDomainError),

    /// Configuration persistence failed.
    #[error(transparent)]
    Repository(ServerConfigRepositoryError),

    /// The supervisor rejected the new server.
    #[error(transparent)]
    Supervisor(SupervisorError),

    /// The catalog could not be read.
    #[error(transparent)]
    Catalog(#[from] CatalogSourceError),
}

impl From<SupervisorError> for InstallError {
    fn from(value: SupervisorError) -> Self {
        match value {
            SupervisorError::Repository(ServerConfigRepositoryError::DuplicateTemplate(id)) => {
                Self::Conflict(id)
            }
            SupervisorError::Repository(err) => Self::Repository(err),
            other => Self::Supervisor(other),
        }
    }
}

/// Operator input for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Template to install.
    pub template_id: TemplateId,
    /// Field values keyed by field key; they override template defaults.
    pub values: BTreeMap<String, String>,
    /// Display name; the template's name is used when absent.
    pub name: Option<String>,
}

impl InstallRequest {
    /// Creates a request with no values.
    #[must_use]
    pub const fn new(template_id: TemplateId) -> Self {
        Self {
            template_id,
            values: BTreeMap::new(),
            name: None,
        }
    }

    /// Adds one field value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Overrides the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Outcome of a completed installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Identifier of the registered server.
    pub server_id: ServerId,
    /// Status after the first start attempt.
    pub status: ServerStatus,
    /// Why the first start failed, if it did. The server stays registered.
    pub start_error: Option<String>,
}

/// Installs catalog templates through a supervisor.
pub struct CatalogInstaller<T, R, S, L, C> {
    catalog: Arc<T>,
    supervisor: Arc<ToolServerSupervisor<R, S, L, C>>,
    clock: Arc<C>,
}

impl<T, R, S, L, C> CatalogInstaller<T, R, S, L, C>
where
    T: CatalogTemplateSource,
    R: ServerConfigRepository,
    S: ToolSchemaStore,
    L: InvocationLog,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an installer.
    #[must_use]
    pub const fn new(
        catalog: Arc<T>,
        supervisor: Arc<ToolServerSupervisor<R, S, L, C>>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            catalog,
            supervisor,
            clock,
        }
    }

    /// Returns every installable template.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Catalog`] when the catalog cannot be read.
    pub async fn templates(&self) -> Result<Vec<CatalogTemplate>, InstallError> {
        Ok(self.catalog.list().await?)
    }

    /// Renders, registers, and starts a server from a template.
    ///
    /// A failed first start is reported in the returned
    /// [`InstallReport`]; the server stays registered in its failed state.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnknownTemplate`], [`InstallError::Conflict`]
    /// when the template is already installed, or a field, render, or
    /// persistence failure. Nothing is registered in those cases.
    pub async fn install(&self, request: InstallRequest) -> Result<InstallReport, InstallError> {
        let template = self
            .catalog
            .find(&request.template_id)
            .await?
            .ok_or_else(|| InstallError::UnknownTemplate(request.template_id.clone()))?;
        if self
            .supervisor
            .find_by_template(template.template_id())
            .await?
            .is_some()
        {
            return Err(InstallError::Conflict(template.template_id().clone()));
        }

        let config = build_config(&template, &request, &*self.clock)?;
        let server_id = config.id();
        self.supervisor.register(config).await?;
        info!(
            server_id = %server_id,
            template_id = %template.template_id(),
            "catalog template installed"
        );

        match self.supervisor.start(server_id).await {
            Ok(status) => Ok(InstallReport {
                server_id,
                status,
                start_error: None,
            }),
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "installed tool server failed to start");
                Ok(InstallReport {
                    server_id,
                    status: self.supervisor.status(server_id)?,
                    start_error: Some(err.to_string()),
                })
            }
        }
    }
}

/// Renders `template` with the request's values into a new configuration.
///
/// # Errors
///
/// Returns [`InstallError::MissingField`], [`InstallError::Render`], or
/// [`InstallError::Domain`] when the rendered values are invalid.
pub fn build_config(
    template: &CatalogTemplate,
    request: &InstallRequest,
    clock: &impl Clock,
) -> Result<ServerConfig, InstallError> {
    let renderer = Renderer::new(merge_values(template, &request.values)?);
    let transport = render_transport(&renderer, template.transport())?;
    let name = ServerName::new(
        request
            .name
            .clone()
            .unwrap_or_else(|| template.display_name().to_owned()),
    )?;
    Ok(ServerConfig::new(name, transport, clock).with_template(template.template_id().clone()))
}

fn merge_values(
    template: &CatalogTemplate,
    values: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, InstallError> {
    let mut merged = BTreeMap::new();
    for field in template.fields() {
        let supplied = values
            .get(&field.key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());
        match (supplied, field.default.as_deref()) {
            (Some(value), _) | (None, Some(value)) => {
                merged.insert(field.key.clone(), value.to_owned());
            }
            (None, None) if field.required => {
                return Err(InstallError::MissingField {
                    template_id: template.template_id().clone(),
                    field: field.key.clone(),
                });
            }
            (None, None) => {}
        }
    }
    Ok(merged)
}

struct Renderer {
    environment: Environment<'static>,
    context: BTreeMap<String, String>,
}

impl Renderer {
    fn new(context: BTreeMap<String, String>) -> Self {
        Self {
            environment: Environment::new(),
            context,
        }
    }

    fn render(&self, location: &str, source: &str) -> Result<String, InstallError> {
        self.environment
            .render_str(source, &self.context)
            .map(|rendered| rendered.trim().to_owned())
            .map_err(|err| InstallError::Render {
                location: location.to_owned(),
                reason: err.to_string(),
            })
    }

    /// Renders every value, dropping entries that render empty.
    fn render_map(
        &self,
        prefix: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<Vec<(String, String)>, InstallError> {
        let mut rendered = Vec::with_capacity(entries.len());
        for (key, source) in entries {
            let value = self.render(&format!("{prefix}.{key}"), source)?;
            if !value.is_empty() {
                rendered.push((key.clone(), value));
            }
        }
        Ok(rendered)
    }
}

fn render_transport(
    renderer: &Renderer,
    template: &TransportTemplate,
) -> Result<TransportConfig, InstallError> {
    match template {
        TransportTemplate::Process {
            command,
            args,
            env,
            working_directory,
        } => {
            let mut rendered_args = Vec::with_capacity(args.len());
            for (index, arg) in args.iter().enumerate() {
                let value = renderer.render(&format!("args[{index}]"), arg)?;
                if !value.is_empty() {
                    rendered_args.push(value);
                }
            }
            let mut config = ProcessTransportConfig::new(renderer.render("command", command)?)?
                .with_args(rendered_args)
                .with_env(renderer.render_map("env", env)?);
            if let Some(directory) = working_directory {
                let rendered = renderer.render("working_directory", directory)?;
                if !rendered.is_empty() {
                    config = config.with_working_directory(rendered)?;
                }
            }
            Ok(TransportConfig::Process(config))
        }
        TransportTemplate::EventStream { url, headers } => Ok(TransportConfig::EventStream(
            EventStreamTransportConfig::new(renderer.render("url", url)?)?
                .with_headers(renderer.render_map("headers", headers)?),
        )),
        TransportTemplate::Socket { endpoint, headers } => Ok(TransportConfig::Socket(
            SocketTransportConfig::new(renderer.render("endpoint", endpoint)?)?
                .with_headers(renderer.render_map("headers", headers)?),
        )),
    }
}
