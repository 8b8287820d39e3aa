//! Results report consumed by the history recorder.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::stack::Stack;

/// Tri-state outcome of a suite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuiteStatus {
    Success,
    Failure,
    Cancelled,
}

impl SuiteStatus {
    /// Map free-form status text (workflow conclusions, summary cells) to a status.
    pub fn normalize(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.starts_with("success") {
            SuiteStatus::Success
        } else if lower.starts_with("cancelled")
            || lower.starts_with("skipped")
            || lower.starts_with("neutral")
        {
            SuiteStatus::Cancelled
        } else {
            SuiteStatus::Failure
        }
    }
}

/// Result of a single suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub name: String,

    pub status: SuiteStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,

    /// Failure message, when the suite failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>, status: SuiteStatus) -> Self {
        Self {
            name: name.into(),
            status,
            duration_ms: None,
            log_url: None,
            notes: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Report for one orchestration run over a stack commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stack: Stack,

    pub overall_status: SuiteStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,

    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn new(stack: Stack, suites: Vec<SuiteReport>) -> Self {
        let overall_status = overall_status(&suites);
        Self {
            stack,
            overall_status,
            commit_sha: None,
            commit_timestamp: None,
            suites,
        }
    }

    pub fn with_commit(mut self, sha: Option<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        self.commit_sha = sha;
        self.commit_timestamp = timestamp;
        self
    }

    /// Number of suites that passed.
    pub fn passed_count(&self) -> usize {
        self.suites
            .iter()
            .filter(|s| s.status == SuiteStatus::Success)
            .count()
    }

    /// Number of suites that failed.
    pub fn failed_count(&self) -> usize {
        self.suites
            .iter()
            .filter(|s| s.status == SuiteStatus::Failure)
            .count()
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Failure beats cancelled beats success.
pub fn overall_status(suites: &[SuiteReport]) -> SuiteStatus {
    if suites.iter().any(|s| s.status == SuiteStatus::Failure) {
        SuiteStatus::Failure
    } else if suites.iter().any(|s| s.status == SuiteStatus::Cancelled) {
        SuiteStatus::Cancelled
    } else {
        SuiteStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status_text() {
        assert_eq!(SuiteStatus::normalize(" Success "), SuiteStatus::Success);
        assert_eq!(SuiteStatus::normalize("skipped"), SuiteStatus::Cancelled);
        assert_eq!(SuiteStatus::normalize("neutral"), SuiteStatus::Cancelled);
        assert_eq!(SuiteStatus::normalize("cancelled"), SuiteStatus::Cancelled);
        assert_eq!(SuiteStatus::normalize("timed_out"), SuiteStatus::Failure);
    }

    #[test]
    fn test_overall_status_precedence() {
        let ok = SuiteReport::new("a", SuiteStatus::Success);
        let cancelled = SuiteReport::new("b", SuiteStatus::Cancelled);
        let failed = SuiteReport::new("c", SuiteStatus::Failure);

        assert_eq!(overall_status(&[ok.clone()]), SuiteStatus::Success);
        assert_eq!(
            overall_status(&[ok.clone(), cancelled.clone()]),
            SuiteStatus::Cancelled
        );
        assert_eq!(
            overall_status(&[cancelled, failed, ok]),
            SuiteStatus::Failure
        );
        assert_eq!(overall_status(&[]), SuiteStatus::Success);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = RunReport::new(
            Stack::Rsbuild,
            vec![SuiteReport::new("examples", SuiteStatus::Success).with_duration_ms(1200)],
        )
        .with_commit(Some("abc123".to_string()), None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stack"], "rsbuild");
        assert_eq!(json["overallStatus"], "success");
        assert_eq!(json["commitSha"], "abc123");
        assert_eq!(json["suites"][0]["durationMs"], 1200);
        assert!(json["suites"][0].get("logUrl").is_none());
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/rsbuild.json");
        let report = RunReport::new(
            Stack::Rsbuild,
            vec![SuiteReport::new("plugins", SuiteStatus::Failure).with_notes("boom")],
        );
        report.write_json(&path).unwrap();

        let back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.overall_status, SuiteStatus::Failure);
        assert_eq!(back.suites[0].notes.as_deref(), Some("boom"));
    }
}
