//! Suite reporting
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                         SuiteReport                                    │
//! │  run_id, suite, started_at                                             │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐                          │
//! │  │ CaseReport │ │ CaseReport │ │ CaseReport │  ... declaration order   │
//! │  └────────────┘ └────────────┘ └────────────┘                          │
//! │        │                                                               │
//! │        ├──► to_json()       machine-readable report                    │
//! │        └──► render_junit()  CI integration                             │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::check::CheckOutcome;
use crate::expectation::CheckResult;
use crate::result::{ErrorKind, PageCheckError, PageCheckResult};
use crate::wait::millis;

/// Failure mode for a check
///
/// Andon Cord: stop evaluating a case at its first failing expectation
/// CollectAll: evaluate every expectation and report all failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop on first failure
    #[default]
    AndonCord,
    /// Collect all failures
    CollectAll,
}

/// Case status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Every expectation passed
    Passed,
    /// Navigation, an expectation, or the case itself failed
    Failed,
    /// Not run (fail-fast)
    Skipped,
}

impl CaseStatus {
    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Result of one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    /// Case name
    pub name: String,
    /// Target URL
    pub url: String,
    /// Status
    pub status: CaseStatus,
    /// Per-expectation results, in declaration order
    pub results: Vec<CheckResult>,
    /// First failure message
    pub error: Option<String>,
    /// First failure classification
    pub error_kind: Option<ErrorKind>,
    /// Wall time for the case
    pub duration_ms: u64,
}

impl CaseReport {
    /// Build a report from a finished check
    #[must_use]
    pub fn from_outcome(
        name: impl Into<String>,
        url: impl Into<String>,
        outcome: CheckOutcome,
        duration: Duration,
    ) -> Self {
        let passed = outcome.passed();
        let (error, error_kind) = match &outcome.error {
            Some(err) => (Some(err.to_string()), Some(err.kind())),
            None => (None, None),
        };
        Self {
            name: name.into(),
            url: url.into(),
            status: if passed {
                CaseStatus::Passed
            } else {
                CaseStatus::Failed
            },
            results: outcome.results,
            error,
            error_kind,
            duration_ms: millis(duration),
        }
    }

    /// A case that failed before or outside its check (e.g. the page could
    /// not be opened)
    #[must_use]
    pub fn errored(
        name: impl Into<String>,
        url: impl Into<String>,
        err: &PageCheckError,
        duration: Duration,
    ) -> Self {
        Self::interrupted(name, url, err.kind(), err.to_string(), duration)
    }

    /// A case cut short by its time budget or by an abort
    #[must_use]
    pub fn interrupted(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status: CaseStatus::Failed,
            results: Vec::new(),
            error: Some(message.into()),
            error_kind: Some(kind),
            duration_ms: millis(duration),
        }
    }

    /// A case that was never started
    #[must_use]
    pub fn skipped(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status: CaseStatus::Skipped,
            results: Vec::new(),
            error: None,
            error_kind: None,
            duration_ms: 0,
        }
    }

    /// Failed expectation results
    pub fn failed_results(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Report for a whole suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Suite name
    pub suite: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Case reports, in declaration order
    pub cases: Vec<CaseReport>,
    /// Wall time for the run
    pub duration_ms: u64,
}

impl SuiteReport {
    /// Start a new report
    #[must_use]
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            started_at: Utc::now(),
            cases: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Get number of passed cases
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.status.is_passed()).count()
    }

    /// Get number of failed cases
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.status.is_failed()).count()
    }

    /// Get number of skipped cases
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.status == CaseStatus::Skipped)
            .count()
    }

    /// Get total case count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.cases.len()
    }

    /// Get pass rate (0.0 to 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> f64 {
        if self.cases.is_empty() {
            return 1.0;
        }
        self.passed_count() as f64 / self.cases.len() as f64
    }

    /// True when no case failed or was skipped
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed_count() == self.total_count()
    }

    /// Get failing cases
    #[must_use]
    pub fn failures(&self) -> Vec<&CaseReport> {
        self.cases.iter().filter(|c| c.status.is_failed()).collect()
    }

    /// Generate summary string
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {}/{} passed ({:.1}%)",
            self.suite,
            self.passed_count(),
            self.total_count(),
            self.pass_rate() * 100.0
        );
        let skipped = self.skipped_count();
        if skipped > 0 {
            summary.push_str(&format!(", {skipped} skipped"));
        }
        summary
    }

    /// Serialize the report as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> PageCheckResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn write_json(&self, output_path: &Path) -> PageCheckResult<()> {
        std::fs::write(output_path, self.to_json()?)?;
        Ok(())
    }

    /// Write JUnit XML for CI integration
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn write_junit(&self, output_path: &Path) -> PageCheckResult<()> {
        std::fs::write(output_path, self.render_junit())?;
        Ok(())
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
            escape_xml(&self.suite),
            self.total_count(),
            self.failed_count(),
            self.skipped_count(),
            secs(self.duration_ms),
            self.started_at.to_rfc3339()
        ));
        xml.push('\n');

        for case in &self.cases {
            xml.push_str(&format!(
                r#"  <testcase name="{}" classname="{}" time="{:.3}">"#,
                escape_xml(&case.name),
                escape_xml(&self.suite),
                secs(case.duration_ms)
            ));
            xml.push('\n');

            match case.status {
                CaseStatus::Passed => {}
                CaseStatus::Skipped => xml.push_str("    <skipped/>\n"),
                CaseStatus::Failed => {
                    let message = case.error.as_deref().unwrap_or("failed");
                    let kind = case
                        .error_kind
                        .map_or_else(|| "Failure".to_string(), |k| k.to_string());
                    let mut body = format!("{} {}", kind, case.url);
                    for result in case.failed_results() {
                        body.push_str(&format!(
                            "\n{}: expected {:?}, observed {:?}",
                            result.expectation.describe(),
                            result.expected,
                            result.observed
                        ));
                    }
                    xml.push_str(&format!(
                        r#"    <failure message="{}" type="{}">{}</failure>"#,
                        escape_xml(message),
                        escape_xml(&kind),
                        escape_xml(&body)
                    ));
                    xml.push('\n');
                }
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

#[allow(clippy::cast_precision_loss)]
fn secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Escape XML special characters and replace characters XML 1.0 forbids
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => out.push(char::REPLACEMENT_CHARACTER),
        }
    }
    out
}

const fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}
