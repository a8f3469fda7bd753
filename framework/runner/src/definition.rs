use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::SurgeScenarioCli;
use crate::config::{load_plan_file, ConfigError};
use crate::context::{RunnerContext, TargetConfig, UserValuesConstraint, VuContext};
use crate::stage::{Stage, StagePlan};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

pub(crate) const DEFAULT_BEHAVIOUR: &str = "default";

/// The builder for a scenario definition.
///
/// This must be used at the start of a scenario `main` to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// The parsed command line.
    cli: SurgeScenarioCli,
    /// The stage plan to use when none is given on the command line.
    default_stages: Vec<Stage>,
    /// The delay between two iterations of one virtual user, unless overridden on the command line.
    default_pacing: Duration,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, run once when the scheduler spawns it.
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    /// The behaviours this scenario offers. One of them is selected for the run, see
    /// [ScenarioDefinitionBuilder::use_named_vu_behaviour].
    vu_behaviour: HashMap<String, VuHookMut<RV, V>>,
    /// Teardown hook for a virtual user, run once when it stops.
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    /// Global teardown hook, run once after every virtual user has stopped.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub plan: StagePlan,
    pub target: TargetConfig,
    pub pacing: Duration,
    pub tick: Duration,
    pub behaviour_name: String,
    pub no_progress: bool,
    pub run_id: Option<String>,
    pub summary_file: Option<std::path::PathBuf>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub vu_behaviour: Option<VuHookMut<RV, V>>,
    pub teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and parsed command line.
    pub fn new(name: &str, cli: SurgeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_stages: Vec::new(),
            default_pacing: Duration::from_secs(1),
            setup_fn: None,
            setup_vu_fn: None,
            vu_behaviour: HashMap::new(),
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging, parse the command line and create the builder.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Set the stage plan used when the command line does not provide one.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.default_stages = stages;
        self
    }

    /// Set the pause between iterations of one virtual user. Defaults to one second.
    pub fn with_default_pacing(mut self, pacing: Duration) -> Self {
        self.default_pacing = pacing;
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_vu_fn] for this scenario.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the default behaviour [ScenarioDefinitionBuilder::vu_behaviour] for this scenario.
    pub fn use_vu_behaviour(self, behaviour: VuHookMut<RV, V>) -> Self {
        self.use_named_vu_behaviour(DEFAULT_BEHAVIOUR, behaviour)
    }

    /// Add a named behaviour [ScenarioDefinitionBuilder::vu_behaviour]. It runs when selected with
    /// `--behaviour <name>`.
    pub fn use_named_vu_behaviour(mut self, name: &str, behaviour: VuHookMut<RV, V>) -> Self {
        let previous = self.vu_behaviour.insert(name.to_string(), behaviour);

        if previous.is_some() {
            panic!("Behaviour [{}] is already defined", name);
        }

        self
    }

    /// Set the virtual user teardown hook [ScenarioDefinitionBuilder::teardown_vu_fn] for this scenario.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    ///
    /// Teardown is best effort, an error is logged but does not fail the run.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Validate the configuration. Every configuration error is reported here, before the runtime
    /// starts or any virtual user is spawned.
    pub(crate) fn build(self) -> Result<ScenarioDefinition<RV, V>, ConfigError> {
        let stages = match (&self.cli.plan, self.cli.stages.is_empty()) {
            (Some(path), _) => load_plan_file(path)?,
            (None, false) => self.cli.stages.clone(),
            (None, true) => self.default_stages.clone(),
        };
        let plan = StagePlan::new(stages)?;

        let base_url = self.cli.base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.cli.base_url.clone(),
            source,
        })?;

        let api_key = self.cli.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        if self.cli.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }

        let behaviour_name = self
            .cli
            .behaviour
            .clone()
            .unwrap_or_else(|| DEFAULT_BEHAVIOUR.to_string());
        let vu_behaviour = self.vu_behaviour.get(&behaviour_name).copied();
        // A scenario without any behaviour only exercises the pool, which is allowed. Asking for a
        // behaviour that was never registered is a mistake.
        if vu_behaviour.is_none() && (self.cli.behaviour.is_some() || !self.vu_behaviour.is_empty()) {
            return Err(ConfigError::UnknownBehaviour(behaviour_name));
        }

        Ok(ScenarioDefinition {
            name: self.name,
            plan,
            target: TargetConfig {
                base_url,
                api_key,
                request_timeout: Duration::from_millis(self.cli.request_timeout_ms),
            },
            pacing: self
                .cli
                .pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(self.default_pacing),
            tick: Duration::from_millis(self.cli.tick_ms),
            behaviour_name,
            no_progress: self.cli.no_progress,
            run_id: self.cli.run_id,
            summary_file: self.cli.summary_file,
            setup_fn: self.setup_fn,
            setup_vu_fn: self.setup_vu_fn,
            vu_behaviour,
            teardown_vu_fn: self.teardown_vu_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Values;

    impl UserValuesConstraint for Values {}

    fn cli() -> SurgeScenarioCli {
        SurgeScenarioCli {
            base_url: "http://localhost:8080/".to_string(),
            api_key: "secret".to_string(),
            stages: vec![],
            plan: None,
            behaviour: None,
            pacing_ms: None,
            tick_ms: 100,
            request_timeout_ms: 1_000,
            no_progress: true,
            run_id: None,
            summary_file: None,
        }
    }

    fn behaviour(_ctx: &mut VuContext<Values, Values>) -> HookResult {
        Ok(())
    }

    fn builder(cli: SurgeScenarioCli) -> ScenarioDefinitionBuilder<Values, Values> {
        ScenarioDefinitionBuilder::new("test", cli)
            .with_default_stages(vec![Stage::new(Duration::from_secs(1), 1)])
    }

    #[test]
    fn default_stages_and_pacing_apply() {
        let definition = builder(cli()).use_vu_behaviour(behaviour).build().unwrap();

        assert_eq!(
            &[Stage::new(Duration::from_secs(1), 1)],
            definition.plan.stages()
        );
        assert_eq!(Duration::from_secs(1), definition.pacing);
        assert_eq!("http://localhost:8080", definition.target.base_url);
        assert_eq!("default", definition.behaviour_name);
        assert!(definition.vu_behaviour.is_some());
    }

    #[test]
    fn cli_stages_override_defaults() {
        let mut cli = cli();
        cli.stages = vec![Stage::new(Duration::from_secs(5), 3)];
        cli.pacing_ms = Some(10);

        let definition = builder(cli).build().unwrap();

        assert_eq!(&[Stage::new(Duration::from_secs(5), 3)], definition.plan.stages());
        assert_eq!(Duration::from_millis(10), definition.pacing);
    }

    #[test]
    fn missing_plan_is_a_config_error() {
        let result = ScenarioDefinitionBuilder::<Values, Values>::new("test", cli()).build();
        assert!(matches!(result, Err(ConfigError::EmptyPlan)));
    }

    #[test]
    fn blank_api_key_is_a_config_error() {
        let mut cli = cli();
        cli.api_key = "  ".to_string();

        assert!(matches!(builder(cli).build(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let mut cli = cli();
        cli.base_url = "not a url".to_string();

        assert!(matches!(
            builder(cli).build(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn unknown_behaviour_is_a_config_error() {
        let mut cli = cli();
        cli.behaviour = Some("missing".to_string());

        let result = builder(cli).use_vu_behaviour(behaviour).build();
        assert!(matches!(result, Err(ConfigError::UnknownBehaviour(name)) if name == "missing"));
    }

    #[test]
    fn named_behaviour_is_selected() {
        let mut cli = cli();
        cli.behaviour = Some("ping".to_string());

        let definition = builder(cli)
            .use_vu_behaviour(behaviour)
            .use_named_vu_behaviour("ping", behaviour)
            .build()
            .unwrap();

        assert_eq!("ping", definition.behaviour_name);
    }

    #[test]
    #[should_panic(expected = "Behaviour [default] is already defined")]
    fn duplicate_behaviour_panics() {
        let _ = builder(cli())
            .use_vu_behaviour(behaviour)
            .use_vu_behaviour(behaviour);
    }
}
