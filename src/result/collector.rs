//! Result collector
//!
//! Every lifecycle event of a run passes through a [`ResultCollector`]. It
//! stamps outcomes, owns the captured-output sink, dispatches to handlers and
//! tracks whether the run is still successful and whether it should stop.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::capture::CapturedOutput;
use super::handler::{sort_handlers, ResultHandler};
use crate::error::EngineError;
use crate::models::{Outcome, RunSummary, TestId, TestItem, TestStatus};

/// Collector behaviour switches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorOptions {
    /// Buffer test output and attach it to failures and errors
    pub buffer: bool,
    /// Stop the run after the first failure, error or unexpected success
    pub failfast: bool,
}

impl CollectorOptions {
    pub fn buffered() -> Self {
        Self {
            buffer: true,
            failfast: false,
        }
    }

    pub fn with_failfast(mut self, failfast: bool) -> Self {
        self.failfast = failfast;
        self
    }
}

/// Single funnel for all test lifecycle events
pub struct ResultCollector {
    options: CollectorOptions,
    handlers: Vec<Box<dyn ResultHandler>>,
    handler_order: Option<Vec<usize>>,
    start_times: HashMap<TestId, DateTime<Utc>>,
    output: CapturedOutput,
    tests_run: usize,
    successes: usize,
    failures: Vec<Outcome>,
    errors: Vec<Outcome>,
    skipped: Vec<Outcome>,
    expected_failures: Vec<Outcome>,
    unexpected_successes: Vec<Outcome>,
    successful: bool,
    should_stop: bool,
    run_started: Option<Instant>,
    run_duration: Option<Duration>,
}

impl ResultCollector {
    pub fn new(options: CollectorOptions) -> Self {
        Self {
            options,
            handlers: Vec::new(),
            handler_order: None,
            start_times: HashMap::new(),
            output: CapturedOutput::new(options.buffer),
            tests_run: 0,
            successes: 0,
            failures: Vec::new(),
            errors: Vec::new(),
            skipped: Vec::new(),
            expected_failures: Vec::new(),
            unexpected_successes: Vec::new(),
            successful: true,
            should_stop: false,
            run_started: None,
            run_duration: None,
        }
    }

    pub fn options(&self) -> CollectorOptions {
        self.options
    }

    /// Register a handler. Invalidates the cached dispatch order.
    pub fn add_handler(&mut self, handler: impl ResultHandler + 'static) {
        self.handlers.push(Box::new(handler));
        self.handler_order = None;
    }

    pub fn with_handler(mut self, handler: impl ResultHandler + 'static) -> Self {
        self.add_handler(handler);
        self
    }

    fn dispatch(&mut self, mut f: impl FnMut(&mut dyn ResultHandler)) {
        let handlers = &mut self.handlers;
        let order = self
            .handler_order
            .get_or_insert_with(|| sort_handlers(handlers));
        for &index in order.iter() {
            f(handlers[index].as_mut());
        }
    }

    pub fn start_run(&mut self) {
        debug!("Starting test run with {} handlers", self.handlers.len());
        self.run_started = Some(Instant::now());
        self.run_duration = None;
        self.dispatch(|handler| handler.start_test_run());
    }

    pub fn stop_run(&mut self) {
        self.run_duration = self.run_started.map(|started| started.elapsed());
        self.dispatch(|handler| handler.stop_test_run());
        debug!(
            "Test run stopped: {} run, successful={}",
            self.tests_run, self.successful
        );
    }

    /// Indicate that a test is starting.
    ///
    /// `started_at` lets replayed outcomes keep the start time recorded where
    /// the test actually ran.
    pub fn start_test(&mut self, test: &TestId, started_at: Option<DateTime<Utc>>) {
        self.start_times
            .insert(test.clone(), started_at.unwrap_or_else(Utc::now));
        self.output.clear();
        self.tests_run += 1;
        self.dispatch(|handler| handler.start_test(test));
    }

    /// Indicate that a test has completed. Buffered output is discarded.
    pub fn stop_test(&mut self, test: &TestId) {
        self.dispatch(|handler| handler.stop_test(test));
        self.output.clear();
        self.start_times.remove(test);
    }

    pub fn is_started(&self, test: &TestId) -> bool {
        self.start_times.contains_key(test)
    }

    /// Build an outcome for `item` and record it.
    ///
    /// Reporting for a test that was never started is a lifecycle defect in the
    /// caller; only error placeholders are exempt.
    pub fn report_outcome(
        &mut self,
        item: &TestItem,
        status: TestStatus,
        exception: Option<String>,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        let completed_at = Utc::now();
        let started_at = match self.start_times.get(item.id()) {
            Some(started_at) => *started_at,
            None if item.is_placeholder() => completed_at,
            None => {
                error!("Outcome reported for {} before start_test", item.id());
                return Err(EngineError::LifecyclePairing(item.id().clone()));
            }
        };

        let exception = exception.map(|mut text| {
            if self.output.is_buffering() && status.carries_output() {
                self.output.merge_into(&mut text);
            }
            text
        });

        let mut outcome = Outcome::new(item.id().clone(), status, started_at, completed_at);
        outcome.exception = exception;
        outcome.message = message;

        self.add_outcome(outcome);
        Ok(())
    }

    /// Record an already-built outcome, e.g. one replayed from a worker.
    pub fn add_outcome(&mut self, outcome: Outcome) {
        self.bucket(&outcome);
        self.dispatch(|handler| handler.handle(&outcome));

        if !outcome.status.is_success() {
            self.successful = false;
            if self.options.failfast {
                debug!("Fail-fast triggered by {}", outcome.test);
                self.stop();
            }
        }
    }

    /// Record an error raised outside any test body, such as a failing
    /// fixture hook. `test` names the hook rather than a registered test.
    pub fn add_error(&mut self, test: TestId, exception: String) {
        let now = Utc::now();
        let outcome = Outcome::new(test, TestStatus::Error, now, now).with_exception(exception);
        self.add_outcome(outcome);
    }

    fn bucket(&mut self, outcome: &Outcome) {
        let bucket = match outcome.status {
            TestStatus::Success => {
                self.successes += 1;
                return;
            }
            TestStatus::Failure => &mut self.failures,
            TestStatus::Error => &mut self.errors,
            TestStatus::Skipped => &mut self.skipped,
            TestStatus::ExpectedFailure => &mut self.expected_failures,
            TestStatus::UnexpectedSuccess => &mut self.unexpected_successes,
        };
        bucket.push(outcome.clone());
    }

    /// Lend the output sink to running test code.
    pub fn output_mut(&mut self) -> &mut CapturedOutput {
        &mut self.output
    }

    pub fn stop(&mut self) {
        self.should_stop = true;
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }

    pub fn was_successful(&self) -> bool {
        self.successful
    }

    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    pub fn success_count(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> &[Outcome] {
        &self.failures
    }

    pub fn errors(&self) -> &[Outcome] {
        &self.errors
    }

    pub fn skipped(&self) -> &[Outcome] {
        &self.skipped
    }

    pub fn expected_failures(&self) -> &[Outcome] {
        &self.expected_failures
    }

    pub fn unexpected_successes(&self) -> &[Outcome] {
        &self.unexpected_successes
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            tests_run: self.tests_run,
            successes: self.successes,
            failures: self.failures.len(),
            errors: self.errors.len(),
            skipped: self.skipped.len(),
            expected_failures: self.expected_failures.len(),
            unexpected_successes: self.unexpected_successes.len(),
            was_successful: self.successful,
            duration_ms: self
                .run_duration
                .or_else(|| self.run_started.map(|started| started.elapsed()))
                .map_or(0, |elapsed| elapsed.as_millis() as u64),
        }
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new(CollectorOptions::default())
    }
}
