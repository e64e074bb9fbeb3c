//! Given steps for tool server lifecycle scenarios.

use super::world::{LifecycleWorld, run_async, tools_named};
use conduit::tool_server::{
    adapters::{LoopbackCallMode, LoopbackConnector, LoopbackServer},
    domain::{ServerConfig, ServerName, TransportConfig},
};
use eyre::WrapErr;
use mockable::DefaultClock;
use rstest_bdd_macros::given;

#[given(r#"a loopback tool server offering "{tools}""#)]
fn loopback_server(world: &mut LifecycleWorld, tools: String) -> Result<(), eyre::Report> {
    world.install(LoopbackConnector::new(LoopbackServer::new(tools_named(&tools)?)));
    Ok(())
}

#[given(r#"a silent loopback tool server offering "{tools}""#)]
fn silent_loopback_server(world: &mut LifecycleWorld, tools: String) -> Result<(), eyre::Report> {
    let server =
        LoopbackServer::new(tools_named(&tools)?).with_call_mode(LoopbackCallMode::Silent);
    world.install(LoopbackConnector::new(server));
    Ok(())
}

/// Registers the scenario server without connecting it.
pub fn register(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let config = ServerConfig::new(
        ServerName::new("loopback").wrap_err("valid server name")?,
        TransportConfig::process("loopback").wrap_err("valid transport")?,
        &DefaultClock,
    );
    let server_id = config.id();
    run_async(world.supervisor()?.register(config)).wrap_err("registration succeeds")?;
    world.server_id = Some(server_id);
    Ok(())
}

#[given("the server is registered")]
fn server_registered(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    register(world)
}
