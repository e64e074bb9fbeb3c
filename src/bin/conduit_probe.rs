//! Connects to one tool server, lists its tools, and optionally calls one.
//!
//! Usage:
//!
//! ```text
//! conduit-probe <config-path> [--call <tool>] [--args <json>] [--timeout-ms <ms>]
//! ```
//!
//! `config-path` names a JSON-encoded `ServerConfig`. Manager settings come
//! from `CONDUIT_*` environment variables. The outcome is written to
//! standard output as one JSON document; logs go to standard error.

use conduit::telemetry::init_tracing;
use conduit::tool_server::{
    adapters::{
        TracingInvocationLog,
        memory::{InMemoryInvocationLog, InMemoryServerConfigRepository, InMemoryToolSchemaStore},
    },
    domain::ServerConfig,
    services::{SupervisorPorts, ToolServerSupervisor},
    settings::{ManagerSettings, SettingsError},
    transport::DefaultTransportConnector,
};
use mockable::DefaultClock;
use serde_json::{Map, Value, json};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
enum ProbeError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug)]
struct ProbeArgs {
    config_path: String,
    call: Option<String>,
    arguments: Value,
    timeout: Option<Duration>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ProbeArgs, ProbeError> {
    let config_path = args
        .next()
        .ok_or_else(|| ProbeError::InvalidArgs("missing <config-path>".to_owned()))?;
    let mut parsed = ProbeArgs {
        config_path,
        call: None,
        arguments: json!({}),
        timeout: None,
    };
    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| ProbeError::InvalidArgs(format!("{flag} needs a value")))?;
        match flag.as_str() {
            "--call" => parsed.call = Some(value),
            "--args" => {
                parsed.arguments = serde_json::from_str(&value).map_err(|source| ProbeError::Json {
                    what: "--args",
                    source,
                })?;
            }
            "--timeout-ms" => {
                let millis = value
                    .parse::<u64>()
                    .map_err(|_| ProbeError::InvalidArgs(format!("bad --timeout-ms '{value}'")))?;
                parsed.timeout = Some(Duration::from_millis(millis));
            }
            other => return Err(ProbeError::InvalidArgs(format!("unknown flag {other}"))),
        }
    }
    Ok(parsed)
}

fn load_config(path: &str) -> Result<ServerConfig, ProbeError> {
    let document = std::fs::read_to_string(path).map_err(|source| ProbeError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&document).map_err(|source| ProbeError::Json {
        what: "server config",
        source,
    })
}

async fn probe(args: ProbeArgs) -> Result<Value, ProbeError> {
    let settings = ManagerSettings::from_env()?;
    let config = load_config(&args.config_path)?;
    let server_id = config.id();
    let supervisor = ToolServerSupervisor::new(
        SupervisorPorts {
            repository: Arc::new(InMemoryServerConfigRepository::new()),
            schemas: Arc::new(InMemoryToolSchemaStore::new()),
            invocations: Arc::new(TracingInvocationLog::new(InMemoryInvocationLog::new())),
        },
        Arc::new(DefaultTransportConnector::new(settings)),
        settings,
        Arc::new(DefaultClock),
    );

    let mut report = Map::new();
    report.insert("server_id".to_owned(), json!(server_id));
    if let Err(err) = supervisor.register(config).await {
        report.insert("error".to_owned(), json!(err.to_string()));
        return Ok(Value::Object(report));
    }
    let started = supervisor.start(server_id).await;
    if let Err(err) = &started {
        report.insert("error".to_owned(), json!(err.to_string()));
    }
    if let Ok(catalog) = supervisor.tools(server_id).await {
        report.insert("tools".to_owned(), json!(&*catalog));
    }
    if let (Ok(_), Some(tool)) = (&started, args.call.as_deref()) {
        let call = match supervisor
            .invoke(server_id, tool, args.arguments, args.timeout)
            .await
        {
            Ok(result) => json!({"tool": tool, "result": result}),
            Err(err) => json!({"tool": tool, "error": err.to_string(), "kind": err.failure_kind()}),
        };
        report.insert("call".to_owned(), call);
    }
    if let Ok(status) = supervisor.status(server_id) {
        report.insert("status".to_owned(), json!(status));
    }
    supervisor.shutdown().await;
    Ok(Value::Object(report))
}

fn main() -> Result<(), BoxError> {
    init_tracing("conduit=info");
    let args = parse_args(std::env::args().skip(1))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(probe(args))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{report:#}").map_err(ProbeError::Output)?;
    Ok(())
}
