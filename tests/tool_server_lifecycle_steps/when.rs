//! When steps for tool server lifecycle scenarios.

use super::given::register;
use super::world::{LifecycleWorld, run_async};
use eyre::WrapErr;
use futures_util::future::join_all;
use rstest_bdd_macros::when;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[when("the server is registered and started")]
fn register_and_start(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    register(world)?;
    run_async(world.supervisor()?.start(world.server_id()?)).wrap_err("start succeeds")?;
    Ok(())
}

#[when("the server is started {count:usize} times concurrently")]
fn start_concurrently(world: &mut LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    let server_id = world.server_id()?;
    let starts = (0..count).map(|_| {
        let shared = Arc::clone(&supervisor);
        async move { shared.start(server_id).await }
    });
    let outcomes = run_async(join_all(starts));
    if outcomes.iter().all(Result::is_err) {
        return Err(eyre::eyre!("no concurrent start succeeded: {outcomes:?}"));
    }
    Ok(())
}

#[when(r#"tool "{tool}" is invoked"#)]
fn invoke_tool(world: &mut LifecycleWorld, tool: String) -> Result<(), eyre::Report> {
    let outcome = run_async(world.supervisor()?.invoke(
        world.server_id()?,
        &tool,
        json!({}),
        None,
    ));
    world.last_invocation = Some(outcome);
    Ok(())
}

#[when(r#"{count:usize} calls to "{tool}" are left pending"#)]
fn leave_calls_pending(
    world: &mut LifecycleWorld,
    count: usize,
    tool: String,
) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    let server_id = world.server_id()?;
    for index in 0..count {
        let shared = Arc::clone(&supervisor);
        let name = tool.clone();
        world.pending.push(tokio::spawn(async move {
            shared
                .invoke(server_id, &name, json!({"index": index}), Some(Duration::from_secs(30)))
                .await
        }));
    }
    run_async(async {
        for _ in 0..200 {
            let waiting = supervisor
                .status(server_id)
                .map(|status| status.pending_requests)
                .unwrap_or_default();
            if waiting == count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(eyre::eyre!("calls never became pending"))
    })
}

#[when("the server is stopped")]
fn stop_server(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    run_async(world.supervisor()?.stop(world.server_id()?)).wrap_err("stop succeeds")?;
    Ok(())
}

#[when("the server is restarted")]
fn restart_server(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    run_async(world.supervisor()?.restart(world.server_id()?)).wrap_err("restart succeeds")?;
    Ok(())
}

#[when("the connection drops")]
fn connection_drops(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    run_async(world.connector()?.sever());
    Ok(())
}
