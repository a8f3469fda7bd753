use std::sync::Arc;

use anyhow::Context;
use surge_core::prelude::ShutdownHandle;
use surge_instruments::{CheckSummary, ReportConfig};
use surge_summary_model::{append_run_summary, CheckCounts, RunSummary, StageSummary};

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::pool::VuPool;
use crate::progress::start_progress;
use crate::scheduler::StageScheduler;
use crate::shutdown::start_shutdown_listener;
use crate::types::RunReport;

/// Run a scenario through its stage plan.
///
/// Configuration errors are returned before anything starts. A failing global setup hook is also
/// returned as an error. Everything that goes wrong once virtual users are running is logged and
/// counted instead, so a run always ends with a [RunReport].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunReport> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario: {} with behaviour: {}",
        definition.name,
        definition.behaviour_name
    );

    let started_at = chrono::Utc::now();
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let reporter = Arc::new(ReportConfig::default().enable_in_memory().init());
    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    log::info!("Run ID: {run_id}");

    let mut runner_context = RunnerContext::new(
        executor,
        reporter,
        shutdown_handle.clone(),
        definition.target.clone(),
        run_id.clone(),
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);

    // Separate from the run-wide shutdown so that stopping the progress bar does not cancel work
    // done by the teardown hook.
    let progress_stop = ShutdownHandle::new();
    let progress = if definition.no_progress {
        None
    } else {
        start_progress(
            definition.plan.total_duration(),
            runner_context.clone(),
            progress_stop.new_listener(),
        )
    };

    let mut pool = VuPool::new(runner_context.clone(), &definition, shutdown_handle.clone());
    let scheduler = StageScheduler::new(definition.plan.clone(), definition.tick);
    let outcome = scheduler.run(&mut pool, &mut shutdown_handle.new_listener());
    pool.drain();

    progress_stop.shutdown();
    if let Some(progress) = progress {
        if progress.join().is_err() {
            log::warn!("Progress thread panicked");
        }
    }

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    runner_context.reporter().finalize();

    let checks = runner_context.checks().snapshot();
    checks.print_summary_of_checks();

    let report = RunReport {
        run_id,
        checks,
        iterations: runner_context.iterations(),
        peak_vus: pool.peak(),
        final_live_vus: outcome.end_live,
        stopped_early: shutdown_handle.is_shutdown(),
        timeline: outcome.timeline,
    };
    log::info!(
        "Run {} finished: {} iterations, peak of {} virtual users, {} live at the end",
        report.run_id,
        report.iterations,
        report.peak_vus,
        report.final_live_vus
    );
    if report.stopped_early {
        log::warn!("Run {} was stopped before the stage plan completed", report.run_id);
    }

    if let Some(path) = &definition.summary_file {
        let summary = build_run_summary(&definition, &report, started_at.timestamp());
        append_run_summary(&summary, path.clone())
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(report)
}

fn build_run_summary<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    report: &RunReport,
    started_at: i64,
) -> RunSummary {
    let stages = definition
        .plan
        .stages()
        .iter()
        .map(|stage| StageSummary {
            duration_ms: stage.duration.as_millis() as u64,
            target: stage.target,
        })
        .collect();

    let mut summary = RunSummary::new(
        report.run_id.clone(),
        definition.name.clone(),
        definition.behaviour_name.clone(),
        started_at,
        stages,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.set_vu_counts(report.peak_vus, report.final_live_vus);
    summary.set_iterations(report.iterations);
    add_checks(&mut summary, &report.checks);
    summary.add_env("SURGE_BASE_URL".to_string(), definition.target.base_url.clone());
    summary.seal_fingerprint();

    summary
}

fn add_checks(summary: &mut RunSummary, checks: &CheckSummary) {
    for (name, tally) in checks.iter() {
        summary.add_check(
            name.to_string(),
            CheckCounts {
                passes: tally.passes,
                fails: tally.fails,
            },
        );
    }
}
