use std::collections::BTreeMap;

use parking_lot::Mutex;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Pass and fail counts for one named check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Records named pass/fail assertions made by virtual users.
///
/// Recording never fails and never panics, whatever the outcome of the assertion. Every virtual
/// user shares one recorder, so updates are serialized behind a lock and no observation is lost
/// when two users record the same check at the same time.
#[derive(Debug, Default)]
pub struct CheckRecorder {
    tallies: Mutex<BTreeMap<String, CheckTally>>,
}

impl CheckRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation for the check `name`. Returns `passed` so that callers can branch
    /// on the outcome.
    pub fn record(&self, name: &str, passed: bool) -> bool {
        {
            let mut tallies = self.tallies.lock();
            let tally = tallies.entry(name.to_string()).or_default();
            if passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }

        if !passed {
            log::debug!("Check failed: {name}");
        }

        passed
    }

    /// Evaluate `predicate` against `value` and record the result under `name`.
    pub fn check<T: ?Sized>(&self, name: &str, value: &T, predicate: impl FnOnce(&T) -> bool) -> bool {
        self.record(name, predicate(value))
    }

    /// A consistent copy of the counts recorded so far.
    pub fn snapshot(&self) -> CheckSummary {
        CheckSummary {
            tallies: self.tallies.lock().clone(),
        }
    }
}

/// Point in time view of a [CheckRecorder], ordered by check name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    tallies: BTreeMap<String, CheckTally>,
}

impl CheckSummary {
    pub fn get(&self, name: &str) -> Option<CheckTally> {
        self.tallies.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CheckTally)> {
        self.tallies.iter().map(|(name, tally)| (name.as_str(), tally))
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    pub fn total_passes(&self) -> u64 {
        self.tallies.values().map(|t| t.passes).sum()
    }

    pub fn total_fails(&self) -> u64 {
        self.tallies.values().map(|t| t.fails).sum()
    }

    /// Fraction of all recorded checks that passed, or `None` if nothing was recorded.
    pub fn pass_rate(&self) -> Option<f64> {
        let total = self.total_passes() + self.total_fails();
        if total == 0 {
            None
        } else {
            Some(self.total_passes() as f64 / total as f64)
        }
    }

    pub fn print_summary_of_checks(&self) {
        println!("\nSummary of checks");
        if self.is_empty() {
            println!("No checks were recorded");
            return;
        }

        let mut table = Table::new(self.rows());
        table.with(Style::modern());

        println!("{table}");
    }

    fn rows(&self) -> Vec<CheckRow> {
        self.iter()
            .map(|(name, tally)| CheckRow {
                check: name.to_string(),
                passes: tally.passes,
                fails: tally.fails,
                pass_rate: if tally.total() == 0 {
                    0.0
                } else {
                    tally.passes as f64 * 100.0 / tally.total() as f64
                },
            })
            .collect()
    }
}

#[derive(Tabled)]
struct CheckRow {
    check: String,
    passes: u64,
    fails: u64,
    #[tabled(rename = "pass %", display = "percent")]
    pass_rate: f64,
}

fn percent(n: &f64) -> String {
    format!("{:.2}", n)
}
