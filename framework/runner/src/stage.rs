use std::time::Duration;

use crate::config::ConfigError;

/// Ramp to `target` virtual users over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// A validated, immutable list of stages.
///
/// The plan starts from 0 virtual users. During each stage the target moves linearly from the
/// previous stage's target to this stage's target, so it equals the declared target exactly at
/// the end of every stage. A stage with a zero duration is an instantaneous step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyPlan);
        }

        // Every sum of stage durations below is safe once the total fits.
        stages
            .iter()
            .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
            .ok_or(ConfigError::PlanTooLong)?;

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The planned length of the run, the sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn peak_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// The target of the last stage, which the pool should have reached when the plan ends.
    pub fn final_target(&self) -> usize {
        self.stages.last().map(|s| s.target).unwrap_or(0)
    }

    /// The desired number of virtual users `elapsed` after the start of the run, or `None` once
    /// the plan is over.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut from = 0usize;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            if stage.duration.is_zero() {
                from = stage.target;
                continue;
            }

            let stage_end = stage_start + stage.duration;
            if elapsed <= stage_end {
                let progress = elapsed.saturating_sub(stage_start).as_secs_f64()
                    / stage.duration.as_secs_f64();
                let value = from as f64 + (stage.target as f64 - from as f64) * progress;
                return Some(value.round() as usize);
            }

            from = stage.target;
            stage_start = stage_end;
        }

        // Only reachable at the very end of a plan that finishes with zero length steps.
        if elapsed <= stage_start {
            Some(from)
        } else {
            None
        }
    }
}

/// Parse a duration such as `500ms`, `25s`, `2m` or `1h`. A bare number is read as seconds.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let s = input.trim();
    if s.starts_with('-') {
        return Err(ConfigError::NegativeDuration(input.to_string()));
    }

    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split_at);
    let value = value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidDuration(input.to_string()))?;

    let seconds = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(60 * 60),
        _ => None,
    };

    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidDuration(input.to_string()))
}

/// Parse a stage target, rejecting negative counts with a dedicated error.
pub(crate) fn parse_target(input: &str) -> Result<usize, ConfigError> {
    let s = input.trim();
    match s.parse::<i64>() {
        Ok(n) if n < 0 => Err(ConfigError::NegativeTarget(n)),
        Ok(n) => usize::try_from(n).map_err(|_| ConfigError::InvalidTarget(input.to_string())),
        Err(_) => Err(ConfigError::InvalidTarget(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn ramp_up_down() -> StagePlan {
        StagePlan::new(vec![Stage::new(secs(5), 2), Stage::new(secs(5), 0)]).unwrap()
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(matches!(StagePlan::new(vec![]), Err(ConfigError::EmptyPlan)));
    }

    #[test]
    fn ramps_linearly_between_targets() {
        let plan = ramp_up_down();

        assert_eq!(Some(0), plan.target_at(Duration::ZERO));
        assert_eq!(Some(1), plan.target_at(ms(2_500)));
        assert_eq!(Some(2), plan.target_at(secs(5)));
        assert_eq!(Some(1), plan.target_at(ms(7_500)));
        assert_eq!(Some(0), plan.target_at(secs(10)));
        assert_eq!(None, plan.target_at(ms(10_001)));
    }

    #[test]
    fn target_at_each_stage_end_equals_declared_target() {
        let plan = StagePlan::new(vec![
            Stage::new(secs(25), 10),
            Stage::new(secs(35), 30),
            Stage::new(secs(25), 20),
            Stage::new(secs(20), 0),
        ])
        .unwrap();

        let mut end = Duration::ZERO;
        for stage in plan.stages() {
            end += stage.duration;
            assert_eq!(Some(stage.target), plan.target_at(end));
        }
        assert_eq!(secs(105), plan.total_duration());
        assert_eq!(30, plan.peak_target());
        assert_eq!(0, plan.final_target());
    }

    #[test]
    fn target_never_leaves_the_range_of_its_stage() {
        let plan = StagePlan::new(vec![Stage::new(secs(10), 7), Stage::new(secs(10), 3)]).unwrap();

        for step in 0..=200 {
            let elapsed = ms(step * 100);
            let target = plan.target_at(elapsed).unwrap();
            if elapsed <= secs(10) {
                assert!(target <= 7, "{target} at {elapsed:?}");
            } else {
                assert!((3..=7).contains(&target), "{target} at {elapsed:?}");
            }
        }
    }

    #[test]
    fn zero_duration_stage_is_a_step() {
        let plan = StagePlan::new(vec![Stage::new(Duration::ZERO, 4), Stage::new(secs(4), 0)]).unwrap();

        assert_eq!(Some(4), plan.target_at(Duration::ZERO));
        assert_eq!(Some(2), plan.target_at(secs(2)));
        assert_eq!(Some(0), plan.target_at(secs(4)));
        assert_eq!(None, plan.target_at(ms(4_001)));
    }

    #[test]
    fn plan_of_only_steps_ends_immediately() {
        let plan = StagePlan::new(vec![Stage::new(Duration::ZERO, 3)]).unwrap();

        assert_eq!(Some(3), plan.target_at(Duration::ZERO));
        assert_eq!(None, plan.target_at(ms(1)));
        assert_eq!(Duration::ZERO, plan.total_duration());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(ms(500), parse_duration("500ms").unwrap());
        assert_eq!(secs(25), parse_duration("25s").unwrap());
        assert_eq!(secs(120), parse_duration("2m").unwrap());
        assert_eq!(secs(3600), parse_duration("1h").unwrap());
        assert_eq!(secs(7), parse_duration("7").unwrap());
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(matches!(
            parse_duration("-5s"),
            Err(ConfigError::NegativeDuration(_))
        ));
        assert!(matches!(
            parse_duration("5 days"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_duration("s"),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn rejects_durations_that_overflow() {
        assert!(matches!(
            parse_duration("307445734561825861m"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_duration("5124095576030432h"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert_eq!(secs(u64::MAX), parse_duration(&u64::MAX.to_string()).unwrap());
    }

    #[test]
    fn plan_longer_than_a_duration_is_rejected() {
        let result = StagePlan::new(vec![
            Stage::new(secs(u64::MAX), 1),
            Stage::new(secs(u64::MAX), 0),
        ]);
        assert!(matches!(result, Err(ConfigError::PlanTooLong)));

        let plan = StagePlan::new(vec![Stage::new(secs(u64::MAX), 1)]).unwrap();
        assert_eq!(secs(u64::MAX), plan.total_duration());
        assert_eq!(Some(0), plan.target_at(Duration::ZERO));
    }

    #[test]
    fn parses_targets() {
        assert_eq!(10, parse_target("10").unwrap());
        assert!(matches!(parse_target("-1"), Err(ConfigError::NegativeTarget(-1))));
        assert!(matches!(parse_target("ten"), Err(ConfigError::InvalidTarget(_))));
    }
}
