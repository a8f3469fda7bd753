use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use surge_core::prelude::{
    DelegatedShutdownListener, RetireHandle, RetireListener, ShutdownHandle, ShutdownSignalError,
};

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::{ScenarioDefinition, VuHookMut};

/// Identifies a virtual user for the lifetime of a run. Ids are never reused.
pub type VuId = usize;

struct VuHandle {
    id: VuId,
    retire: RetireHandle,
    thread: JoinHandle<()>,
}

impl VuHandle {
    fn join(self) {
        if let Err(e) = self.thread.join() {
            log::error!("Virtual user vu-{} panicked: {:?}", self.id, e);
        }
    }
}

/// The set of running virtual users.
///
/// Only the stage scheduler mutates the pool. Each virtual user is its own thread, looping over
/// "run one iteration, then pace" until it is retired.
pub(crate) struct VuPool<RV: UserValuesConstraint, V: UserValuesConstraint> {
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_handle: ShutdownHandle,
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    vu_behaviour: Option<VuHookMut<RV, V>>,
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pacing: Duration,
    live: Vec<VuHandle>,
    /// Asked to stop but possibly still finishing their current iteration.
    retiring: Vec<VuHandle>,
    next_id: VuId,
    peak: usize,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuPool<RV, V> {
    pub(crate) fn new(
        runner_context: Arc<RunnerContext<RV>>,
        definition: &ScenarioDefinition<RV, V>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            runner_context,
            shutdown_handle,
            setup_vu_fn: definition.setup_vu_fn,
            vu_behaviour: definition.vu_behaviour,
            teardown_vu_fn: definition.teardown_vu_fn,
            pacing: definition.pacing,
            live: Vec::new(),
            retiring: Vec::new(),
            next_id: 0,
            peak: 0,
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    /// Spawn or retire virtual users until `target` are live.
    ///
    /// Best effort: if a thread cannot be spawned the error is logged and the next call tries again.
    pub(crate) fn scale_to(&mut self, target: usize) {
        self.reap();

        while self.live.len() < target {
            if let Err(e) = self.spawn_vu() {
                log::error!("Failed to spawn a virtual user, will retry on the next tick: {e:?}");
                break;
            }
        }

        while self.live.len() > target {
            self.retire_vu();
        }

        self.peak = self.peak.max(self.live.len());
        self.runner_context.set_live_vus(self.live.len());
    }

    /// Ask every live virtual user to stop after its current iteration.
    pub(crate) fn retire_all(&mut self) {
        while !self.live.is_empty() {
            self.retire_vu();
        }
        self.runner_context.set_live_vus(0);
    }

    /// Retire everything and wait for every virtual user thread to exit.
    pub(crate) fn drain(&mut self) {
        self.retire_all();

        let retiring = std::mem::take(&mut self.retiring);
        log::debug!("Waiting for {} virtual users to finish", retiring.len());
        for handle in retiring {
            handle.join();
        }
    }

    fn spawn_vu(&mut self) -> std::io::Result<()> {
        let vu_id = self.next_id;

        let runner_context = self.runner_context.clone();
        let setup_vu_fn = self.setup_vu_fn;
        let vu_behaviour = self.vu_behaviour;
        let teardown_vu_fn = self.teardown_vu_fn;
        let pacing = self.pacing;
        let (retire, retire_listener) = RetireHandle::new();
        // For us to check if the virtual user should stop between iterations
        let cycle_shutdown_listener = self.shutdown_handle.new_listener();
        // For the behaviour implementation to listen for shutdown and respond appropriately
        let delegated_shutdown_listener = self.shutdown_handle.new_listener();

        let thread = std::thread::Builder::new()
            .name(format!("vu-{vu_id}"))
            .spawn(move || {
                let mut context =
                    VuContext::new(vu_id, runner_context.clone(), delegated_shutdown_listener);
                let mut signals = VuSignals {
                    retire: retire_listener,
                    shutdown: cycle_shutdown_listener,
                };

                if let Some(setup_vu_fn) = setup_vu_fn {
                    if let Err(e) = setup_vu_fn(&mut context) {
                        log::error!("Setup failed for virtual user vu-{vu_id}: {e:?}");
                        return;
                    }
                }

                log::debug!("Starting virtual user vu-{vu_id}");
                loop {
                    if signals.should_stop() {
                        break;
                    }

                    context.start_iteration();
                    if let Some(behaviour) = vu_behaviour {
                        match behaviour(&mut context) {
                            Ok(()) => runner_context.add_iteration(),
                            Err(e) if e.is::<ShutdownSignalError>() => {
                                // Expected while the run is being shut down. The check at the top
                                // of the loop will catch this and break out.
                            }
                            Err(e) => {
                                log::error!("Behaviour failed for virtual user vu-{vu_id}: {e:?}");
                            }
                        }
                    }

                    if !signals.pace(&runner_context, pacing) {
                        break;
                    }
                }
                log::debug!("Stopping virtual user vu-{vu_id}");

                if let Some(teardown_vu_fn) = teardown_vu_fn {
                    if let Err(e) = teardown_vu_fn(&mut context) {
                        log::error!("Teardown failed for virtual user vu-{vu_id}: {e:?}");
                    }
                }
            })?;

        self.next_id += 1;
        self.live.push(VuHandle {
            id: vu_id,
            retire,
            thread,
        });

        Ok(())
    }

    /// The most recently spawned virtual user is retired first.
    fn retire_vu(&mut self) {
        if let Some(handle) = self.live.pop() {
            log::trace!("Retiring virtual user vu-{}", handle.id);
            handle.retire.retire();
            self.retiring.push(handle);
        }
    }

    /// Join virtual users that have exited. A live virtual user that exited on its own, for
    /// example because its setup hook failed, no longer counts towards the target.
    fn reap(&mut self) {
        let (finished, retiring) = std::mem::take(&mut self.retiring)
            .into_iter()
            .partition::<Vec<_>, _>(|handle| handle.thread.is_finished());
        self.retiring = retiring;
        finished.into_iter().for_each(VuHandle::join);

        let (exited, live) = std::mem::take(&mut self.live)
            .into_iter()
            .partition::<Vec<_>, _>(|handle| handle.thread.is_finished());
        self.live = live;
        for handle in exited {
            log::warn!("Virtual user vu-{} exited without being retired", handle.id);
            handle.join();
        }
    }
}

/// The stop signals a virtual user listens to between iterations.
struct VuSignals {
    retire: RetireListener,
    shutdown: DelegatedShutdownListener,
}

impl VuSignals {
    fn should_stop(&mut self) -> bool {
        self.retire.is_retired() || self.shutdown.should_shutdown()
    }

    /// Wait out the pacing delay. Returns false if the virtual user was told to stop meanwhile.
    fn pace<RV: UserValuesConstraint>(
        &mut self,
        runner_context: &RunnerContext<RV>,
        pacing: Duration,
    ) -> bool {
        if pacing.is_zero() {
            return !self.should_stop();
        }

        let retire = &mut self.retire;
        let shutdown = &mut self.shutdown;
        runner_context.executor().block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(pacing) => true,
                _ = retire.retired() => false,
                _ = shutdown.wait_for_shutdown() => false,
            }
        })
    }
}
