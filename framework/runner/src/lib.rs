mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod pool;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod stage;
mod types;

pub use cli::parse_stage;

pub mod prelude {
    pub use crate::cli::SurgeScenarioCli;
    pub use crate::config::ConfigError;
    pub use crate::context::{
        IterationState, RunnerContext, TargetConfig, UserValuesConstraint, VuContext,
    };
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::pool::VuId;
    pub use crate::run::run;
    pub use crate::scheduler::PoolSample;
    pub use crate::stage::{Stage, StagePlan};
    pub use crate::types::{RunReport, SurgeResult};

    pub use surge_instruments::{CheckRecorder, CheckSummary, CheckTally, Reporter};
}
