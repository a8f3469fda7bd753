use surge_instruments::CheckSummary;

use crate::scheduler::PoolSample;

/// Recommended error type for your scenario `main` function and any shared behaviour code that you
/// write for hooks. This type is compatible with the [crate::definition::HookResult] type so you can
/// use `?` to propagate errors.
pub type SurgeResult<T> = anyhow::Result<T>;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    /// Check outcomes from every virtual user, keyed by check name
    pub checks: CheckSummary,
    /// Completed scenario iterations across all virtual users
    pub iterations: u64,
    /// The highest number of virtual users that were live at once
    pub peak_vus: usize,
    /// Virtual users that were live when the plan ended or the run was stopped, counted before
    /// they were retired. This is the plan's final target unless the run was stopped early.
    pub final_live_vus: usize,
    /// The run-wide shutdown fired, from Ctrl-C or a forced stop.
    pub stopped_early: bool,
    /// One sample per scheduler tick
    pub timeline: Vec<PoolSample>,
}
