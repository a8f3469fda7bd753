use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::stage::{parse_duration, Stage};

/// Problems with the scenario configuration. These are always reported before any virtual user
/// is started.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The stage plan is empty, configure at least one stage")]
    EmptyPlan,
    #[error("Invalid stage `{0}`, expected `<duration>:<target>` such as `30s:10`")]
    InvalidStage(String),
    #[error("Invalid duration `{0}`, expected a whole number with an optional unit of ms, s, m or h")]
    InvalidDuration(String),
    #[error("Stage duration `{0}` is negative")]
    NegativeDuration(String),
    #[error("The stage plan is too long, the total duration does not fit in a duration")]
    PlanTooLong,
    #[error("Invalid stage target `{0}`")]
    InvalidTarget(String),
    #[error("Stage target {0} is negative")]
    NegativeTarget(i64),
    #[error("Invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("An API key is required, set --api-key or SURGE_API_KEY")]
    MissingApiKey,
    #[error("Behaviour [{0}] is not defined by this scenario")]
    UnknownBehaviour(String),
    #[error("The scheduler tick interval must be greater than zero")]
    ZeroTick,
    #[error("Failed to read plan file {path}: {source}")]
    ReadPlan {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse plan file {path}: {source}")]
    ParsePlan {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A stage plan stored on disk.
///
/// ```toml
/// [[stages]]
/// duration = "25s"
/// target = 10
///
/// [[stages]]
/// duration = "20s"
/// target = 0
/// ```
#[derive(Debug, Deserialize)]
struct PlanFile {
    stages: Vec<PlanFileStage>,
}

#[derive(Debug, Deserialize)]
struct PlanFileStage {
    duration: String,
    target: i64,
}

pub(crate) fn load_plan_file(path: &Path) -> Result<Vec<Stage>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadPlan {
        path: path.to_path_buf(),
        source,
    })?;

    parse_plan(&content).map_err(|e| match e {
        PlanError::Toml(source) => ConfigError::ParsePlan {
            path: path.to_path_buf(),
            source,
        },
        PlanError::Config(e) => e,
    })
}

enum PlanError {
    Toml(toml::de::Error),
    Config(ConfigError),
}

fn parse_plan(content: &str) -> Result<Vec<Stage>, PlanError> {
    let plan: PlanFile = toml::from_str(content).map_err(PlanError::Toml)?;

    plan.stages
        .into_iter()
        .map(|stage| {
            if stage.target < 0 {
                return Err(PlanError::Config(ConfigError::NegativeTarget(stage.target)));
            }
            let duration = parse_duration(&stage.duration).map_err(PlanError::Config)?;
            let target = usize::try_from(stage.target)
                .map_err(|_| PlanError::Config(ConfigError::InvalidTarget(stage.target.to_string())))?;
            Ok(Stage::new(duration, target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn load_plan_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[stages]]
duration = "25s"
target = 10

[[stages]]
duration = "500ms"
target = 0
"#
        )
        .unwrap();

        let stages = load_plan_file(file.path()).unwrap();

        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(25), 10),
                Stage::new(Duration::from_millis(500), 0),
            ],
            stages
        );
    }

    #[test]
    fn negative_target_in_file_is_rejected() {
        let result = parse_plan(
            r#"
[[stages]]
duration = "5s"
target = -2
"#,
        );

        assert!(matches!(
            result,
            Err(PlanError::Config(ConfigError::NegativeTarget(-2)))
        ));
    }

    #[test]
    fn negative_duration_in_file_is_rejected() {
        let result = parse_plan(
            r#"
[[stages]]
duration = "-5s"
target = 2
"#,
        );

        assert!(matches!(
            result,
            Err(PlanError::Config(ConfigError::NegativeDuration(_)))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = load_plan_file(Path::new("/definitely/not/a/plan.toml"));
        assert!(matches!(result, Err(ConfigError::ReadPlan { .. })));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stages = 5").unwrap();

        let result = load_plan_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParsePlan { .. })));
    }
}
