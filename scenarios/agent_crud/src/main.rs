use std::sync::Arc;
use std::time::Duration;

use agent_crud::{ping, run_iteration};
use anyhow::Context;
use http_client_instrumented::prelude::{HttpClient, ReqwestHttpClient};
use surge_runner::prelude::*;

#[derive(Debug, Default)]
struct AgentCrudRunnerContext {
    client: Option<Arc<dyn HttpClient>>,
}

impl AgentCrudRunnerContext {
    fn client(&self) -> anyhow::Result<Arc<dyn HttpClient>> {
        self.client
            .clone()
            .context("HTTP client was not created during setup")
    }
}

impl UserValuesConstraint for AgentCrudRunnerContext {}

#[derive(Debug, Default)]
struct AgentCrudVuContext {
    aborted_iterations: u64,
}

impl UserValuesConstraint for AgentCrudVuContext {}

fn setup(ctx: &mut RunnerContext<AgentCrudRunnerContext>) -> HookResult {
    let client = ReqwestHttpClient::new(ctx.reporter(), ctx.target().request_timeout)?;
    ctx.get_mut().client = Some(Arc::new(client));

    Ok(())
}

fn agent_crud_behaviour(
    ctx: &mut VuContext<AgentCrudRunnerContext, AgentCrudVuContext>,
) -> HookResult {
    let runner_context = ctx.runner_context().clone();
    let client = runner_context.get().client()?;
    let vu_id = ctx.vu_id();

    let result = runner_context.executor().execute_in_place(async {
        let mut rng = rand::thread_rng();
        Ok(run_iteration(
            client.as_ref(),
            runner_context.target(),
            runner_context.checks(),
            ctx.iteration_mut(),
            &mut rng,
        )
        .await)
    })?;

    if let Err(e) = result {
        log::warn!("Iteration aborted for vu-{vu_id}: {e}");
        ctx.get_mut().aborted_iterations += 1;
    }

    Ok(())
}

fn ping_behaviour(ctx: &mut VuContext<AgentCrudRunnerContext, AgentCrudVuContext>) -> HookResult {
    let runner_context = ctx.runner_context().clone();
    let client = runner_context.get().client()?;

    let result = runner_context.executor().execute_in_place(async {
        Ok(ping(
            client.as_ref(),
            runner_context.target(),
            runner_context.checks(),
        )
        .await)
    })?;

    if let Err(e) = result {
        log::warn!("Ping failed for vu-{}: {e}", ctx.vu_id());
        ctx.get_mut().aborted_iterations += 1;
    }

    Ok(())
}

fn vu_teardown(ctx: &mut VuContext<AgentCrudRunnerContext, AgentCrudVuContext>) -> HookResult {
    if ctx.get().aborted_iterations > 0 {
        log::info!(
            "vu-{} had {} aborted iterations",
            ctx.vu_id(),
            ctx.get().aborted_iterations
        );
    }

    Ok(())
}

fn main() -> SurgeResult<()> {
    let builder = ScenarioDefinitionBuilder::<AgentCrudRunnerContext, AgentCrudVuContext>::new_with_init(
        env!("CARGO_PKG_NAME"),
    )
    .with_default_stages(vec![
        Stage::new(Duration::from_secs(25), 10),
        Stage::new(Duration::from_secs(35), 30),
        Stage::new(Duration::from_secs(25), 20),
        Stage::new(Duration::from_secs(20), 0),
    ])
    .use_setup(setup)
    .use_vu_behaviour(agent_crud_behaviour)
    .use_named_vu_behaviour("ping", ping_behaviour)
    .use_vu_teardown(vu_teardown);

    let report = run(builder)?;

    if report.checks.total_fails() > 0 {
        log::warn!(
            "{} of {} checks failed",
            report.checks.total_fails(),
            report.checks.total_fails() + report.checks.total_passes()
        );
    }

    Ok(())
}
