mod in_memory_reporter;

use std::fmt::{Debug, Formatter};

use parking_lot::Mutex;

use crate::OperationRecord;

pub use in_memory_reporter::InMemoryReporter;

/// A sink for operation records.
pub trait ReportCollector {
    fn add_operation(&mut self, operation_record: &OperationRecord);

    /// Called once at the end of the run, after every virtual user has stopped.
    fn finalize(&self);
}

/// Choose which collectors the [Reporter] should feed.
#[derive(Debug, Default)]
pub struct ReportConfig {
    enable_in_memory: bool,
}

impl ReportConfig {
    /// Keep every operation in memory and print a latency table when the run finishes.
    pub fn enable_in_memory(mut self) -> Self {
        self.enable_in_memory = true;
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Box<dyn ReportCollector + Send>> = Vec::new();
        if self.enable_in_memory {
            collectors.push(Box::new(InMemoryReporter::new()));
        }

        Reporter {
            collectors: Mutex::new(collectors),
        }
    }
}

/// Fans operation records out to the configured collectors. Shared by every virtual user.
pub struct Reporter {
    collectors: Mutex<Vec<Box<dyn ReportCollector + Send>>>,
}

impl Reporter {
    pub fn add_operation(&self, operation_record: &OperationRecord) {
        for collector in self.collectors.lock().iter_mut() {
            collector.add_operation(operation_record);
        }
    }

    pub fn finalize(&self) {
        for collector in self.collectors.lock().iter() {
            collector.finalize();
        }
    }
}

impl Debug for Reporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.collectors.lock().len())
            .finish()
    }
}
