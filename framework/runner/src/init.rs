use crate::cli::SurgeScenarioCli;
use clap::Parser;

/// Initialise logging and parse the command line for a Surge scenario.
///
/// Logging is configured with `RUST_LOG`, for example `RUST_LOG=info`.
pub fn init() -> SurgeScenarioCli {
    env_logger::init();

    SurgeScenarioCli::parse()
}
