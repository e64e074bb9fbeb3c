//! When steps for catalog installation scenarios.

use super::world::{InstallWorld, run_async};
use conduit::tool_server::{domain::TemplateId, services::InstallRequest};
use eyre::WrapErr;
use rstest_bdd_macros::when;

fn install(world: &mut InstallWorld, request: InstallRequest) -> Result<(), eyre::Report> {
    let outcome = run_async(world.installer()?.install(request));
    world.outcomes.push(outcome);
    Ok(())
}

#[when(r#"template "{template_id}" is installed with "{field}" set to "{value}""#)]
fn install_with_value(
    world: &mut InstallWorld,
    template_id: String,
    field: String,
    value: String,
) -> Result<(), eyre::Report> {
    let request = InstallRequest::new(TemplateId::new(template_id).wrap_err("valid template id")?)
        .with_value(field, value);
    install(world, request)
}

#[when(r#"template "{template_id}" is installed without values"#)]
fn install_without_values(world: &mut InstallWorld, template_id: String) -> Result<(), eyre::Report> {
    let request = InstallRequest::new(TemplateId::new(template_id).wrap_err("valid template id")?);
    install(world, request)
}
