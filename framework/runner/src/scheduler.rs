use std::time::{Duration, Instant};

use surge_core::prelude::DelegatedShutdownListener;

use crate::context::UserValuesConstraint;
use crate::pool::VuPool;
use crate::stage::StagePlan;

/// What the pool looked like at one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSample {
    /// Time since the start of the plan.
    pub elapsed: Duration,
    /// The target the plan asked for at `elapsed`.
    pub target: usize,
    /// The number of live virtual users after the pool was adjusted.
    pub live: usize,
}

/// How the scheduler left the pool.
#[derive(Debug)]
pub(crate) struct ScheduleOutcome {
    pub(crate) timeline: Vec<PoolSample>,
    /// Live virtual users when the plan ended or was stopped, before they were retired.
    pub(crate) end_live: usize,
}

/// Drives the pool through a stage plan, on a fixed tick.
pub(crate) struct StageScheduler {
    plan: StagePlan,
    tick: Duration,
}

impl StageScheduler {
    pub(crate) fn new(plan: StagePlan, tick: Duration) -> Self {
        Self { plan, tick }
    }

    /// Run the plan to completion, or until the run is shut down.
    ///
    /// Every tick the target for the elapsed time is computed and the pool is scaled to it. Ticks
    /// are scheduled against the start of the plan rather than the previous tick so a slow tick
    /// does not push the whole plan back. The last tick lands on the end of the plan so the final
    /// target is always applied.
    ///
    /// When this returns every virtual user has been asked to retire. Use [VuPool::drain] to wait
    /// for them.
    pub(crate) fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
        &self,
        pool: &mut VuPool<RV, V>,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> ScheduleOutcome {
        let total = self.plan.total_duration();
        let mut timeline = Vec::new();
        let mut stopped_early = false;

        log::info!(
            "Running {} stages over {:?}, peak target is {} virtual users",
            self.plan.stages().len(),
            total,
            self.plan.peak_target()
        );

        let start = Instant::now();
        let mut ticks: u32 = 0;
        loop {
            if shutdown_listener.should_shutdown() {
                log::info!("Shutdown requested, stopping the stage plan early");
                stopped_early = true;
                break;
            }

            let elapsed = start.elapsed();
            let Some(target) = self.plan.target_at(elapsed) else {
                break;
            };

            pool.scale_to(target);
            timeline.push(PoolSample {
                elapsed,
                target,
                live: pool.live(),
            });
            log::trace!("Tick at {elapsed:?}: target {target}, live {}", pool.live());

            if elapsed >= total {
                break;
            }

            ticks = ticks.saturating_add(1);
            let next_tick = self.tick.saturating_mul(ticks).min(total);
            std::thread::sleep(next_tick.saturating_sub(start.elapsed()));
        }

        if !stopped_early {
            let final_target = self.plan.final_target();
            if pool.live() != final_target {
                pool.scale_to(final_target);
                timeline.push(PoolSample {
                    elapsed: start.elapsed(),
                    target: final_target,
                    live: pool.live(),
                });
            }
            log::info!("Stage plan complete after {:?}", start.elapsed());
        }

        let end_live = pool.live();
        pool.retire_all();
        timeline.push(PoolSample {
            elapsed: start.elapsed(),
            target: 0,
            live: pool.live(),
        });

        ScheduleOutcome { timeline, end_live }
    }
}
