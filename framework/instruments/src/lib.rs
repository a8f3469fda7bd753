mod checks;
mod report;

use std::collections::HashMap;
use std::fmt::Display;
use std::time::{Duration, Instant};

pub use checks::{CheckRecorder, CheckSummary, CheckTally};
pub use report::{ReportCollector, ReportConfig, Reporter};

/// A single timed operation, such as one HTTP request made by a virtual user.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation_id: String,
    started: Instant,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
    pub attr: HashMap<String, String>,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            is_error: false,
            attr: HashMap::new(),
        }
    }

    /// Attach a tag to the record, for example the response status of an HTTP call.
    pub fn add_attr(&mut self, key: impl Into<String>, value: impl Display) {
        self.attr.insert(key.into(), value.to_string());
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }
}

/// Stop the clock on an operation and hand it to the reporter.
///
/// The record is marked as an error if the response is an `Err`.
pub fn report_operation<T, E>(
    reporter: &Reporter,
    mut operation_record: OperationRecord,
    response: &Result<T, E>,
) {
    operation_record.elapsed = Some(operation_record.started.elapsed());
    operation_record.is_error = response.is_err();

    reporter.add_operation(&operation_record);
}
