//! Test result models
//!
//! Defines test identities, completion statuses and outcome records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a test: the qualified name of its group plus the method name.
///
/// Start times and replayed worker outcomes are correlated through this key,
/// never through item instances, so it must stay stable across processes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId {
    pub group: String,
    pub method: String,
}

impl TestId {
    pub fn new(group: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group, self.method)
    }
}

/// Test completion status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Success,
    Failure,
    Error,
    Skipped,
    ExpectedFailure,
    UnexpectedSuccess,
}

impl TestStatus {
    pub fn all() -> [TestStatus; 6] {
        [
            TestStatus::Success,
            TestStatus::Failure,
            TestStatus::Error,
            TestStatus::Skipped,
            TestStatus::ExpectedFailure,
            TestStatus::UnexpectedSuccess,
        ]
    }

    /// Single character progress marker
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Success => ".",
            TestStatus::Failure => "F",
            TestStatus::Error => "E",
            TestStatus::Skipped => "s",
            TestStatus::ExpectedFailure => "x",
            TestStatus::UnexpectedSuccess => "u",
        }
    }

    /// Whether this status leaves the run successful.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TestStatus::Success | TestStatus::Skipped | TestStatus::ExpectedFailure
        )
    }

    /// Statuses that capture output is merged into.
    pub fn carries_output(&self) -> bool {
        matches!(self, TestStatus::Failure | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Success => write!(f, "ok"),
            TestStatus::Failure => write!(f, "FAIL"),
            TestStatus::Error => write!(f, "ERROR"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::ExpectedFailure => write!(f, "expected failure"),
            TestStatus::UnexpectedSuccess => write!(f, "unexpected success"),
        }
    }
}

/// Immutable record of one reported test result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub test: TestId,
    pub status: TestStatus,
    pub exception: Option<String>,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl Outcome {
    pub fn new(
        test: TestId,
        status: TestStatus,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        // Clock adjustments must not produce a negative duration.
        let completed_at = completed_at.max(started_at);
        Self {
            test,
            status,
            exception: None,
            message: None,
            started_at,
            completed_at,
        }
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn duration(&self) -> Duration {
        self.completed_at - self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration().num_milliseconds().max(0) as u64
    }
}

// Timestamps are deliberately left out of equality.
impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        self.test == other.test
            && self.status == other.status
            && self.exception == other.exception
            && self.message == other.message
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ... {} [{}ms]",
            self.test,
            self.status,
            self.duration_ms()
        )?;
        if let Some(msg) = &self.message {
            write!(f, " '{msg}'")?;
        }
        Ok(())
    }
}

/// Aggregate counts for a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tests_run: usize,
    pub successes: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    pub expected_failures: usize,
    pub unexpected_successes: usize,
    pub was_successful: bool,
    /// Wall-clock length of the run
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut summary = Self {
            was_successful: true,
            ..Self::default()
        };
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for outcome in outcomes {
            summary.tests_run += 1;
            summary.record(outcome.status);
            span = Some(match span {
                Some((first, last)) => (
                    first.min(outcome.started_at),
                    last.max(outcome.completed_at),
                ),
                None => (outcome.started_at, outcome.completed_at),
            });
        }
        if let Some((first, last)) = span {
            summary.duration_ms = (last - first).num_milliseconds().max(0) as u64;
        }
        summary
    }

    pub(crate) fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Success => self.successes += 1,
            TestStatus::Failure => self.failures += 1,
            TestStatus::Error => self.errors += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::ExpectedFailure => self.expected_failures += 1,
            TestStatus::UnexpectedSuccess => self.unexpected_successes += 1,
        }
        if !status.is_success() {
            self.was_successful = false;
        }
    }

    pub fn pass_rate(&self) -> f64 {
        let judged = self.successes + self.failures + self.errors + self.unexpected_successes;
        if judged == 0 {
            0.0
        } else {
            (self.successes as f64 / judged as f64) * 100.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Error: {} | Skip: {} | XFail: {} | XPass: {} | Duration: {}ms",
            self.tests_run,
            self.successes,
            self.failures,
            self.errors,
            self.skipped,
            self.expected_failures,
            self.unexpected_successes,
            self.duration_ms
        )
    }
}
