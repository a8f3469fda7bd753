use std::path::PathBuf;

use clap::Parser;

use crate::config::ConfigError;
use crate::stage::{parse_duration, parse_target, Stage};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct SurgeScenarioCli {
    /// The base URL of the API under test, for example `http://localhost:8080`
    #[clap(long, env = "SURGE_BASE_URL")]
    pub base_url: String,

    /// The API key sent with every request in the `API-Key` header
    #[clap(long, env = "SURGE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Add a stage to the load plan in the format `duration:target`. For example `--stage=30s:10`
    /// ramps to 10 virtual users over 30 seconds.
    ///
    /// Durations accept the units `ms`, `s`, `m` and `h`. Use the flag multiple times to build
    /// the plan, stages run in the order they are given.
    ///
    /// If neither this flag nor `--plan` is given then the scenario's default plan is used.
    #[clap(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Load the stage plan from a TOML file with a `[[stages]]` list. Cannot be combined with `--stage`.
    #[clap(long, conflicts_with = "stages")]
    pub plan: Option<PathBuf>,

    /// The behaviour that every virtual user runs. Defaults to the scenario's default behaviour.
    #[clap(long, short)]
    pub behaviour: Option<String>,

    /// Delay in milliseconds between two iterations of the same virtual user. Defaults to the
    /// scenario's pacing.
    #[clap(long)]
    pub pacing_ms: Option<u64>,

    /// How often, in milliseconds, the scheduler recomputes the target and adjusts the pool
    #[clap(long, default_value = "100")]
    pub tick_ms: u64,

    /// Timeout in milliseconds for a single HTTP request
    #[clap(long, default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long)]
    pub no_progress: bool,

    /// Set the ID of this run
    ///
    /// If not set, a random ID is used.
    #[arg(long, short)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file, one line per run
    #[clap(long)]
    pub summary_file: Option<PathBuf>,
}

/// Parse a `duration:target` stage such as `25s:10`.
pub fn parse_stage(s: &str) -> Result<Stage, ConfigError> {
    let (duration, target) = s
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidStage(s.to_string()))?;

    Ok(Stage::new(parse_duration(duration)?, parse_target(target)?))
}
