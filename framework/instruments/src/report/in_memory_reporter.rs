mod operations_table;

use std::collections::BTreeMap;
use std::time::Duration;

use tabled::settings::Style;
use tabled::Table;

use crate::report::ReportCollector;
use crate::OperationRecord;
use operations_table::OperationRow;

/// A very basic reporter that keeps every operation in memory and prints a summary of the
/// operations at the end of the run.
pub struct InMemoryReporter {
    operation_records: Vec<OperationRecord>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self {
            operation_records: Vec::new(),
        }
    }

    fn print_summary_of_operations(&self) {
        println!("\nSummary of operations");
        let rows = summarize(&self.operation_records);
        if rows.is_empty() {
            println!("No operations were recorded");
            return;
        }

        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }
}

impl ReportCollector for InMemoryReporter {
    fn add_operation(&mut self, operation_record: &OperationRecord) {
        self.operation_records.push(operation_record.clone());
    }

    fn finalize(&self) {
        self.print_summary_of_operations();
    }
}

/// Group records by operation id. Min and max only consider successful operations, because a
/// refused connection returns much faster than a real response.
fn summarize(records: &[OperationRecord]) -> Vec<OperationRow> {
    let grouped = records.iter().fold(
        BTreeMap::<&str, Vec<&OperationRecord>>::new(),
        |mut acc, record| {
            acc.entry(record.operation_id.as_str())
                .or_default()
                .push(record);
            acc
        },
    );

    grouped
        .into_iter()
        .map(|(operation_id, operations)| {
            let total_operations = operations.len();
            let total_duration_micro = operations
                .iter()
                .filter_map(|record| record.duration())
                .map(|d| d.as_micros())
                .sum::<u128>();
            let successful = operations
                .iter()
                .filter(|op| !op.is_error)
                .filter_map(|op| op.duration())
                .collect::<Vec<_>>();

            OperationRow {
                operation_id: operation_id.to_string(),
                total_operations,
                errors: total_operations - successful.len(),
                total_duration_ms: total_duration_micro as f64 / 1000.0,
                avg_time_ms: (total_duration_micro as f64 / total_operations as f64) / 1000.0,
                min_time_ms: successful.iter().min().map(as_ms).unwrap_or_default(),
                max_time_ms: successful.iter().max().map(as_ms).unwrap_or_default(),
            }
        })
        .collect()
}

fn as_ms(duration: &Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}
