//! Console result handler
//!
//! Prints progress while tests run and the familiar failure listing and
//! summary once the run stops.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::time::Instant;
use tracing::debug;

use crate::models::{Outcome, RunSummary, TestId, TestStatus};
use crate::result::ResultHandler;

const SEPARATOR_HEAVY: &str =
    "======================================================================";
const SEPARATOR_LIGHT: &str =
    "----------------------------------------------------------------------";

/// How much the console prints per test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Listing and summary only
    Quiet,
    /// One progress character per outcome
    #[default]
    Standard,
    /// One line per outcome
    Verbose,
}

impl Verbosity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quiet" | "0" => Some(Verbosity::Quiet),
            "standard" | "normal" | "1" => Some(Verbosity::Standard),
            "verbose" | "2" => Some(Verbosity::Verbose),
            _ => None,
        }
    }
}

/// Core handler writing human-readable progress and a final report
pub struct ConsoleHandler {
    writer: Box<dyn Write + Send>,
    verbosity: Verbosity,
    colorize: bool,
    total: Option<usize>,
    started: usize,
    /// Distinct tests seen; a replayed batch may start one test twice.
    seen: HashSet<TestId>,
    run_started: Option<Instant>,
    problems: Vec<Outcome>,
    summary: RunSummary,
}

impl ConsoleHandler {
    pub fn new(writer: Box<dyn Write + Send>, verbosity: Verbosity) -> Self {
        Self {
            writer,
            verbosity,
            colorize: true,
            total: None,
            started: 0,
            seen: HashSet::new(),
            run_started: None,
            problems: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::new(Box::new(std::io::stdout()), verbosity)
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Number of tests expected, shown as `[n/total]` in verbose mode.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self
            .writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
        {
            debug!("Console write failed: {}", e);
        }
    }

    fn paint(&self, status: TestStatus, text: &str) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let code = match status {
            TestStatus::Success => "32",
            TestStatus::Failure | TestStatus::Error | TestStatus::UnexpectedSuccess => "31",
            TestStatus::Skipped | TestStatus::ExpectedFailure => "33",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn progress_line(&self, outcome: &Outcome) -> String {
        let status = self.paint(outcome.status, &outcome.status.to_string());
        match &outcome.message {
            Some(message) if outcome.status == TestStatus::Skipped => {
                format!("{status} '{message}'\n")
            }
            _ => format!("{status}\n"),
        }
    }

    fn listing(&self) -> String {
        let mut output = String::new();
        for outcome in &self.problems {
            let label = match outcome.status {
                TestStatus::Error => "ERROR",
                TestStatus::Failure => "FAIL",
                _ => "UNEXPECTED SUCCESS",
            };
            output.push_str(&format!("{SEPARATOR_HEAVY}\n{label}: {}\n", outcome.test));
            output.push_str(&format!("{SEPARATOR_LIGHT}\n"));
            if let Some(exception) = &outcome.exception {
                output.push_str(exception.trim_end());
                output.push('\n');
            }
            output.push('\n');
        }
        output
    }

    fn verdict(&self) -> String {
        let summary = &self.summary;
        let mut details = Vec::new();
        if summary.failures > 0 {
            details.push(format!("failures={}", summary.failures));
        }
        if summary.errors > 0 {
            details.push(format!("errors={}", summary.errors));
        }
        if summary.skipped > 0 {
            details.push(format!("skipped={}", summary.skipped));
        }
        if summary.expected_failures > 0 {
            details.push(format!("expected failures={}", summary.expected_failures));
        }
        if summary.unexpected_successes > 0 {
            details.push(format!(
                "unexpected successes={}",
                summary.unexpected_successes
            ));
        }

        let (word, status) = if summary.was_successful {
            ("OK", TestStatus::Success)
        } else {
            ("FAILED", TestStatus::Failure)
        };
        let word = self.paint(status, word);
        if details.is_empty() {
            word
        } else {
            format!("{word} ({})", details.join(", "))
        }
    }

    /// Final report: listing, run count with elapsed time, verdict.
    pub fn report(&self, elapsed_secs: f64) -> String {
        let run = self.summary.tests_run;
        format!(
            "{}{SEPARATOR_LIGHT}\nRan {run} test{} in {elapsed_secs:.3}s\n\n{}\n",
            self.listing(),
            if run == 1 { "" } else { "s" },
            self.verdict()
        )
    }
}

impl ResultHandler for ConsoleHandler {
    fn start_test_run(&mut self) {
        self.run_started = Some(Instant::now());
        self.started = 0;
        self.seen.clear();
        self.problems.clear();
        self.summary = RunSummary {
            was_successful: true,
            ..RunSummary::default()
        };
    }

    fn stop_test_run(&mut self) {
        let elapsed = self
            .run_started
            .map_or(0.0, |started| started.elapsed().as_secs_f64());
        if self.verbosity == Verbosity::Standard && self.started > 0 {
            self.emit("\n");
        }
        let report = self.report(elapsed);
        self.emit(&report);
    }

    fn start_test(&mut self, test: &TestId) {
        self.started += 1;
        self.summary.tests_run += 1;
        if !self.seen.contains(test) {
            self.seen.insert(test.clone());
        }
        if self.verbosity == Verbosity::Verbose {
            let prefix = match self.total {
                Some(total) => format!("[{}/{}] ", self.seen.len(), total),
                None => String::new(),
            };
            self.emit(&format!("{prefix}{test} ... "));
        }
    }

    fn handle(&mut self, outcome: &Outcome) {
        self.summary.record(outcome.status);
        if !outcome.status.is_success() {
            self.problems.push(outcome.clone());
        }
        match self.verbosity {
            Verbosity::Quiet => {}
            Verbosity::Standard => {
                let symbol = self.paint(outcome.status, outcome.status.symbol());
                self.emit(&symbol);
            }
            Verbosity::Verbose => {
                let line = self.progress_line(outcome);
                self.emit(&line);
            }
        }
    }

    fn is_core(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn handler(verbosity: Verbosity) -> (ConsoleHandler, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let handler = ConsoleHandler::new(Box::new(buffer.clone()), verbosity).no_color();
        (handler, buffer)
    }

    fn feed(handler: &mut ConsoleHandler, method: &str, status: TestStatus) {
        let id = TestId::new("ns::G", method);
        let now = Utc::now();
        let mut outcome = Outcome::new(id.clone(), status, now, now);
        if !status.is_success() {
            outcome = outcome.with_exception(format!("{method} went wrong"));
        }
        if status == TestStatus::Skipped {
            outcome = outcome.with_message("later");
        }
        handler.start_test(&id);
        handler.handle(&outcome);
        handler.stop_test(&id);
    }

    #[test]
    fn test_verbosity_from_str() {
        assert_eq!(Verbosity::from_str("VERBOSE"), Some(Verbosity::Verbose));
        assert_eq!(Verbosity::from_str("0"), Some(Verbosity::Quiet));
        assert_eq!(Verbosity::from_str("loud"), None);
    }

    #[test]
    fn test_standard_progress_and_failed_summary() {
        let (mut console, buffer) = handler(Verbosity::Standard);
        console.start_test_run();
        feed(&mut console, "a", TestStatus::Success);
        feed(&mut console, "b", TestStatus::Failure);
        feed(&mut console, "c", TestStatus::Skipped);
        console.stop_test_run();

        let text = buffer.text();
        assert!(text.starts_with(".Fs\n"));
        assert!(text.contains("FAIL: ns::G::b\n"));
        assert!(text.contains("b went wrong"));
        assert!(text.contains("Ran 3 tests in "));
        assert!(text.ends_with("FAILED (failures=1, skipped=1)\n"));
    }

    #[test]
    fn test_verbose_lines_with_total() {
        let (console, buffer) = handler(Verbosity::Verbose);
        let mut console = console.with_total(2);
        console.start_test_run();
        feed(&mut console, "a", TestStatus::Success);
        feed(&mut console, "c", TestStatus::Skipped);
        console.stop_test_run();

        let text = buffer.text();
        assert!(text.contains("[1/2] ns::G::a ... ok\n"));
        assert!(text.contains("[2/2] ns::G::c ... skipped 'later'\n"));
        assert!(text.ends_with("OK (skipped=1)\n"));
    }

    #[test]
    fn test_verbose_counter_counts_tests_not_outcomes() {
        let (console, buffer) = handler(Verbosity::Verbose);
        let mut console = console.with_total(2);
        console.start_test_run();
        feed(&mut console, "a", TestStatus::Error);
        feed(&mut console, "a", TestStatus::Error);
        feed(&mut console, "b", TestStatus::Success);
        console.stop_test_run();

        let text = buffer.text();
        assert_eq!(text.matches("[1/2] ns::G::a ... ERROR\n").count(), 2);
        assert!(text.contains("[2/2] ns::G::b ... ok\n"));
        assert!(!text.contains("[3/2]"));
    }

    #[test]
    fn test_quiet_prints_only_report() {
        let (mut console, buffer) = handler(Verbosity::Quiet);
        console.start_test_run();
        feed(&mut console, "a", TestStatus::Success);
        console.stop_test_run();

        let text = buffer.text();
        assert!(text.starts_with(SEPARATOR_LIGHT));
        assert!(text.contains("Ran 1 test in "));
        assert!(text.ends_with("OK\n"));
    }

    #[test]
    fn test_unexpected_success_fails_run() {
        let (mut console, buffer) = handler(Verbosity::Quiet);
        console.start_test_run();
        feed(&mut console, "x", TestStatus::UnexpectedSuccess);
        feed(&mut console, "y", TestStatus::ExpectedFailure);
        console.stop_test_run();

        let text = buffer.text();
        assert!(text.contains("UNEXPECTED SUCCESS: ns::G::x"));
        assert!(text.ends_with("FAILED (expected failures=1, unexpected successes=1)\n"));
    }

    #[test]
    fn test_console_is_core() {
        let (console, _) = handler(Verbosity::Quiet);
        assert!(console.is_core());
    }
}
