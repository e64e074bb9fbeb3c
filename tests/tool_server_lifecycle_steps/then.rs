//! Then steps for tool server lifecycle scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use std::time::Duration;

#[then(r#"the server state is "{state}""#)]
fn server_state_is(world: &LifecycleWorld, state: String) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    let server_id = world.server_id()?;
    // Link failures are observed by the receive loop asynchronously.
    let observed = run_async(async {
        let mut current = supervisor.status(server_id)?.state;
        for _ in 0..200 {
            if current.as_str() == state {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            current = supervisor.status(server_id)?.state;
        }
        Ok::<_, eyre::Report>(current)
    })?;
    if observed.as_str() != state {
        return Err(eyre::eyre!("expected state '{state}', got '{observed}'"));
    }
    Ok(())
}

#[then("the catalog lists {count:usize} tools")]
fn catalog_lists(world: &LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let catalog = run_async(world.supervisor()?.tools(world.server_id()?))
        .wrap_err("catalog lookup succeeds")?;
    if catalog.len() != count {
        return Err(eyre::eyre!("expected {count} tools, got {:?}", catalog.names()));
    }
    Ok(())
}

#[then("the transport was opened {count:usize} times")]
fn transport_opened(world: &LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let opens = world.connector()?.opens();
    if opens != count {
        return Err(eyre::eyre!("expected {count} opens, got {opens}"));
    }
    Ok(())
}

#[then("the server received {count:usize} tool calls")]
fn server_received_calls(world: &LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let calls = world.connector()?.tool_calls();
    if calls != count {
        return Err(eyre::eyre!("expected {count} tool calls, got {calls}"));
    }
    Ok(())
}

#[then(r#"the invocation fails with "{kind}""#)]
fn invocation_fails_with(world: &LifecycleWorld, kind: String) -> Result<(), eyre::Report> {
    let outcome = world
        .last_invocation
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no invocation in scenario world"))?;
    match outcome {
        Err(err) if err.failure_kind().as_str() == kind => Ok(()),
        other => Err(eyre::eyre!("expected '{kind}' failure, got {other:?}")),
    }
}

#[then(r#"all pending calls fail with "{kind}""#)]
fn pending_calls_fail_with(world: &mut LifecycleWorld, kind: String) -> Result<(), eyre::Report> {
    let handles = std::mem::take(&mut world.pending);
    if handles.is_empty() {
        return Err(eyre::eyre!("no pending calls in scenario world"));
    }
    for handle in handles {
        let outcome = run_async(tokio::time::timeout(Duration::from_secs(5), handle))
            .wrap_err("pending call resolves promptly")?
            .wrap_err("pending call task completes")?;
        match outcome {
            Err(err) if err.failure_kind().as_str() == kind => {}
            other => return Err(eyre::eyre!("expected '{kind}' failure, got {other:?}")),
        }
    }
    Ok(())
}

#[then("the invocation log holds {count:usize} records")]
fn invocation_log_holds(world: &LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let records = world
        .log
        .records()
        .map_err(|err| eyre::eyre!("log unreadable: {err}"))?;
    if records.len() != count {
        return Err(eyre::eyre!("expected {count} records, got {}", records.len()));
    }
    Ok(())
}
