use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// One stage of the load plan, as it was configured for the run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    /// Length of the stage in milliseconds
    pub duration_ms: u64,
    /// The number of virtual users reached at the end of the stage
    pub target: usize,
}

/// Pass and fail counts for one named check
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The behaviour every virtual user ran
    pub behaviour: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The planned duration of the run in milliseconds, the sum of all stage durations
    ///
    /// The actual run takes a little longer while in-flight iterations drain.
    pub planned_duration_ms: u64,
    /// The stage plan, in execution order
    pub stages: Vec<StageSummary>,
    /// The highest number of virtual users that were live at the same time
    pub peak_vus: usize,
    /// The number of virtual users live when the stage plan ended, counted before they were retired
    ///
    /// This is the final stage target unless the run was stopped early.
    pub end_vus: usize,
    /// The number of scenario iterations completed by all virtual users
    pub iterations: u64,
    /// Check outcomes, keyed by check name
    pub checks: BTreeMap<String, CheckCounts>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Surge that was used for this run
    pub surge_version: String,
    /// The configuration fingerprint, see [RunSummary::fingerprint]
    ///
    /// Empty until [RunSummary::seal_fingerprint] is called.
    #[serde(default)]
    pub fingerprint: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        behaviour: String,
        started_at: i64,
        stages: Vec<StageSummary>,
        surge_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            behaviour,
            started_at,
            planned_duration_ms: stages.iter().map(|s| s.duration_ms).sum(),
            stages,
            peak_vus: 0,
            end_vus: 0,
            iterations: 0,
            checks: BTreeMap::new(),
            env: HashMap::with_capacity(0),
            surge_version,
            fingerprint: String::new(),
        }
    }

    /// Set the peak and end counts of live virtual users
    pub fn set_vu_counts(&mut self, peak_vus: usize, end_vus: usize) {
        self.peak_vus = peak_vus;
        self.end_vus = end_vus;
    }

    /// Set the number of completed iterations
    pub fn set_iterations(&mut self, iterations: u64) {
        self.iterations = iterations;
    }

    /// Add the outcome counts of a check
    pub fn add_check(&mut self, name: String, counts: CheckCounts) {
        self.checks.insert(name, counts);
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Behaviour
    ///     - Stage plan
    ///     - Selected environment variables
    ///     - Surge version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.behaviour.as_bytes());
        self.stages.iter().for_each(|stage| {
            Digest::update(&mut hasher, stage.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, (stage.target as u64).to_le_bytes());
        });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.surge_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Store the current [RunSummary::fingerprint] on the summary so it is written out with it.
    ///
    /// Call this once the stages and environment are final.
    pub fn seal_fingerprint(&mut self) {
        self.fingerprint = self.fingerprint();
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
