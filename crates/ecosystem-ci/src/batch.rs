//! Collect per-item failures across a batch and report them together.

use ecosystem_ci_core::{EcosystemError, Result};
use tracing::{error, info};

/// Outcomes of a batch of repositories, keyed by item name.
#[derive(Debug)]
pub struct BatchReport {
    label: String,
    succeeded: Vec<String>,
    failed: Vec<(String, EcosystemError)>,
}

impl BatchReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Record one item; failures are kept, never raised.
    pub fn record<T>(&mut self, item: impl Into<String>, outcome: Result<T>) {
        let item = item.into();
        match outcome {
            Ok(_) => self.succeeded.push(item),
            Err(e) => self.failed.push((item, e)),
        }
    }

    /// `BatchFailed` naming every failed item, or `Ok` when all passed.
    pub fn into_result(self) -> Result<()> {
        for (item, e) in &self.failed {
            error!("{item} test failed: {e}");
        }
        if self.failed.is_empty() {
            info!("{} test all passed!", self.label);
            return Ok(());
        }
        Err(EcosystemError::BatchFailed {
            label: self.label,
            succeeded: self.succeeded.len(),
            failed: self.failed.into_iter().map(|(item, _)| item).collect(),
        })
    }
}
