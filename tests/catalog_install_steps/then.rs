//! Then steps for catalog installation scenarios.

use super::world::{InstallWorld, run_async};
use conduit::tool_server::{
    domain::TransportConfig, ports::ServerConfigRepository, services::InstallError,
};
use eyre::WrapErr;
use rstest_bdd_macros::then;

#[then(r#"the installation reports state "{state}""#)]
fn installation_reports_state(world: &InstallWorld, state: String) -> Result<(), eyre::Report> {
    match world.last_outcome()? {
        Ok(report) if report.status.state.as_str() == state => Ok(()),
        Ok(report) => Err(eyre::eyre!(
            "expected state '{state}', got '{}' ({:?})",
            report.status.state,
            report.start_error
        )),
        Err(err) => Err(eyre::eyre!("installation failed: {err}")),
    }
}

#[then("the repository holds {count:usize} configurations")]
fn repository_holds(world: &InstallWorld, count: usize) -> Result<(), eyre::Report> {
    let stored = run_async(world.repository.list_all()).wrap_err("repository is readable")?;
    if stored.len() != count {
        return Err(eyre::eyre!("expected {count} configurations, got {}", stored.len()));
    }
    Ok(())
}

#[then(r#"the installed server runs with argument "{argument}""#)]
fn installed_server_argument(world: &InstallWorld, argument: String) -> Result<(), eyre::Report> {
    let stored = run_async(world.repository.list_all()).wrap_err("repository is readable")?;
    let config = stored
        .first()
        .ok_or_else(|| eyre::eyre!("no configuration stored"))?;
    match config.transport() {
        TransportConfig::Process(process) if process.args().contains(&argument) => Ok(()),
        other => Err(eyre::eyre!("expected argument '{argument}' in {other:?}")),
    }
}

#[then("the installation fails with a conflict")]
fn installation_conflicts(world: &InstallWorld) -> Result<(), eyre::Report> {
    match world.last_outcome()? {
        Err(InstallError::Conflict(_)) => Ok(()),
        other => Err(eyre::eyre!("expected a conflict, got {other:?}")),
    }
}

#[then(r#"the installation fails for missing field "{field}""#)]
fn installation_missing_field(world: &InstallWorld, field: String) -> Result<(), eyre::Report> {
    match world.last_outcome()? {
        Err(InstallError::MissingField { field: missing, .. }) if *missing == field => Ok(()),
        other => Err(eyre::eyre!("expected missing field '{field}', got {other:?}")),
    }
}

#[then("the installation fails for an unknown template")]
fn installation_unknown_template(world: &InstallWorld) -> Result<(), eyre::Report> {
    match world.last_outcome()? {
        Err(InstallError::UnknownTemplate(_)) => Ok(()),
        other => Err(eyre::eyre!("expected an unknown template error, got {other:?}")),
    }
}
