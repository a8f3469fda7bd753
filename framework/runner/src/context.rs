use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use surge_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use surge_instruments::{CheckRecorder, Reporter};

use crate::executor::Executor;
use crate::pool::VuId;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// Where the API under test lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl TargetConfig {
    /// Join a path such as `/api/v1/agents` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Run-wide state, shared read-only by every virtual user once the setup hook has run.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    checks: Arc<CheckRecorder>,
    shutdown_handle: ShutdownHandle,
    target: TargetConfig,
    run_id: String,
    live_vus: AtomicUsize,
    iterations: AtomicU64,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        target: TargetConfig,
        run_id: String,
    ) -> Self {
        Self {
            executor,
            reporter,
            checks: Arc::new(CheckRecorder::new()),
            shutdown_handle,
            target,
            run_id,
            live_vus: AtomicUsize::new(0),
            iterations: AtomicU64::new(0),
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The recorder that every virtual user reports its checks to.
    pub fn checks(&self) -> &CheckRecorder {
        &self.checks
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The number of virtual users currently live, as last set by the pool.
    pub fn live_vus(&self) -> usize {
        self.live_vus.load(Ordering::Relaxed)
    }

    pub(crate) fn set_live_vus(&self, live: usize) {
        self.live_vus.store(live, Ordering::Relaxed);
    }

    /// Completed scenario iterations across all virtual users.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub(crate) fn add_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop the run early, as if the user had pressed Ctrl-C.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// Scenario-local state for one iteration of one virtual user.
///
/// Steps use it to pass values, such as the id of an entity they created, to later steps of the
/// same iteration. The pool clears it before every iteration so nothing leaks between iterations.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IterationState {
    values: HashMap<String, serde_json::Value>,
}

impl IterationState {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }
}

/// Per virtual user state handed to the setup, behaviour and teardown hooks.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: VuId,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    iteration: IterationState,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_id: VuId,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            runner_context,
            shutdown_listener,
            iteration: IterationState::default(),
            value: Default::default(),
        }
    }

    pub fn vu_id(&self) -> VuId {
        self.vu_id
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn iteration(&self) -> &IterationState {
        &self.iteration
    }

    pub fn iteration_mut(&mut self) -> &mut IterationState {
        &mut self.iteration
    }

    pub(crate) fn start_iteration(&mut self) {
        self.iteration.clear();
    }

    /// Values that live as long as this virtual user, across iterations.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
