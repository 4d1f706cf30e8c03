//! Test items
//!
//! A [`TestItem`] is the leaf unit of work. It is either a registered test
//! (a body bound to a group) or an error placeholder standing in for a
//! failure that happened outside any test body.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::group::{Group, Namespace, TestHook};
use super::test_result::{TestId, TestStatus};
use crate::error::EngineError;
use crate::result::{CapturedOutput, OutputStream, ResultCollector};

/// Ways a test body or per-test hook can end other than passing
#[derive(Debug, Error)]
pub enum TestError {
    /// Assertion-style failure
    #[error("{0}")]
    Failure(String),

    /// The test asked to be skipped
    #[error("skipped: {0}")]
    Skip(String),

    /// Unexpected error
    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl TestError {
    pub fn failure(message: impl Into<String>) -> Self {
        TestError::Failure(message.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        TestError::Skip(reason.into())
    }
}

impl From<std::io::Error> for TestError {
    fn from(err: std::io::Error) -> Self {
        TestError::Error(err.into())
    }
}

/// Handle passed into every test body and per-test hook
pub struct TestContext<'a> {
    test: &'a TestId,
    output: &'a mut CapturedOutput,
}

impl<'a> TestContext<'a> {
    pub fn new(test: &'a TestId, output: &'a mut CapturedOutput) -> Self {
        Self { test, output }
    }

    pub fn test_id(&self) -> &TestId {
        self.test
    }

    pub fn stdout(&mut self) -> OutputStream<'_> {
        self.output.stdout()
    }

    pub fn stderr(&mut self) -> OutputStream<'_> {
        self.output.stderr()
    }
}

struct TestCase {
    group: Arc<Group>,
    body: TestHook,
    expect_failure: bool,
    skip: Option<String>,
}

#[derive(Clone)]
enum ItemKind {
    Test(Arc<TestCase>),
    Placeholder { exception: String },
}

/// Leaf unit of work
#[derive(Clone)]
pub struct TestItem {
    id: TestId,
    kind: ItemKind,
}

impl TestItem {
    pub fn new(group: Arc<Group>, method: impl Into<String>, body: TestHook) -> Self {
        Self::with_markers(group, method.into(), body, false, None)
    }

    pub(crate) fn with_markers(
        group: Arc<Group>,
        method: String,
        body: TestHook,
        expect_failure: bool,
        skip: Option<String>,
    ) -> Self {
        let id = TestId::new(group.qualified_name(), method);
        Self {
            id,
            kind: ItemKind::Test(Arc::new(TestCase {
                group,
                body,
                expect_failure,
                skip,
            })),
        }
    }

    /// Synthetic item that always reports a single error outcome.
    pub fn error_placeholder(id: TestId, exception: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Placeholder {
                exception: exception.into(),
            },
        }
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, ItemKind::Placeholder { .. })
    }

    /// Owning group; placeholders belong to none.
    pub fn group(&self) -> Option<&Arc<Group>> {
        match &self.kind {
            ItemKind::Test(case) => Some(&case.group),
            ItemKind::Placeholder { .. } => None,
        }
    }

    pub fn namespace(&self) -> Option<&Arc<Namespace>> {
        self.group().map(|group| group.namespace())
    }

    pub fn is_expected_failure(&self) -> bool {
        match &self.kind {
            ItemKind::Test(case) => case.expect_failure,
            ItemKind::Placeholder { .. } => false,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Test(case) => case.skip.as_deref().or(case.group.skip_reason()),
            ItemKind::Placeholder { .. } => None,
        }
    }

    /// Run the item against `collector`, bracketed by `start_test`/`stop_test`.
    pub fn run(&self, collector: &mut ResultCollector) -> Result<(), EngineError> {
        debug!("Running test {}", self.id);
        collector.start_test(&self.id, None);
        let result = self.execute(collector);
        collector.stop_test(&self.id);
        result
    }

    fn execute(&self, collector: &mut ResultCollector) -> Result<(), EngineError> {
        let case = match &self.kind {
            ItemKind::Placeholder { exception } => {
                return collector.report_outcome(
                    self,
                    TestStatus::Error,
                    Some(exception.clone()),
                    None,
                );
            }
            ItemKind::Test(case) => case,
        };

        if let Some(reason) = self.skip_reason() {
            return collector.report_outcome(
                self,
                TestStatus::Skipped,
                None,
                Some(reason.to_string()),
            );
        }

        let hooks = case.group.hooks();
        if let Some(before_each) = &hooks.before_each {
            let step = self.call(before_each, collector);
            if !matches!(step, Step::Passed) {
                return self.report_step(step, false, collector);
            }
        }

        let body = self.call(&case.body, collector);
        let mut clean = matches!(body, Step::Passed);
        self.report_step(body, case.expect_failure, collector)?;

        if let Some(after_each) = &hooks.after_each {
            let step = self.call(after_each, collector);
            if !matches!(step, Step::Passed) {
                clean = false;
                self.report_step(step, false, collector)?;
            }
        }

        if clean {
            let status = if case.expect_failure {
                TestStatus::UnexpectedSuccess
            } else {
                TestStatus::Success
            };
            collector.report_outcome(self, status, None, None)?;
        }
        Ok(())
    }

    fn call(&self, hook: &TestHook, collector: &mut ResultCollector) -> Step {
        let mut ctx = TestContext::new(&self.id, collector.output_mut());
        guarded(|| hook(&mut ctx))
    }

    fn report_step(
        &self,
        step: Step,
        expect_failure: bool,
        collector: &mut ResultCollector,
    ) -> Result<(), EngineError> {
        let (status, exception, message) = match step {
            Step::Passed => return Ok(()),
            Step::Skipped(reason) => (TestStatus::Skipped, None, Some(reason)),
            Step::Failed(text) | Step::Errored(text) if expect_failure => {
                (TestStatus::ExpectedFailure, Some(text), None)
            }
            Step::Failed(text) => (TestStatus::Failure, Some(text), None),
            Step::Errored(text) => (TestStatus::Error, Some(text), None),
        };
        collector.report_outcome(self, status, exception, message)
    }
}

impl PartialEq for TestItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.is_placeholder() == other.is_placeholder()
    }
}

impl Eq for TestItem {}

impl fmt::Debug for TestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ItemKind::Test(case) => f
                .debug_struct("TestItem")
                .field("id", &self.id)
                .field("expect_failure", &case.expect_failure)
                .field("skip", &case.skip)
                .finish(),
            ItemKind::Placeholder { .. } => f
                .debug_struct("ErrorPlaceholder")
                .field("id", &self.id)
                .finish(),
        }
    }
}

impl fmt::Display for TestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// Classified result of running one piece of test code
#[derive(Debug)]
pub(crate) enum Step {
    Passed,
    Skipped(String),
    Failed(String),
    Errored(String),
}

/// Run test code, turning panics into assertion-style failures.
pub(crate) fn guarded(f: impl FnOnce() -> Result<(), TestError>) -> Step {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Step::Passed,
        Ok(Err(TestError::Skip(reason))) => Step::Skipped(reason),
        Ok(Err(TestError::Failure(message))) => Step::Failed(message),
        Ok(Err(TestError::Error(err))) => Step::Errored(format!("{err:?}")),
        Err(payload) => Step::Failed(panic_message(payload.as_ref())),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}
