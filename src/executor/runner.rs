//! Sequential test execution
//!
//! Walks a suite depth-first in declared order on the calling thread.

use tracing::info;

use super::fixture::FixtureState;
use crate::error::EngineError;
use crate::models::{Children, Entry, TestSuite};
use crate::result::ResultCollector;
use crate::utils::timer::Timer;

/// Single-threaded, declared-order executor
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run every item in `suite` against `collector`.
    ///
    /// The run is bracketed by `start_run`/`stop_run` and fixtures are torn
    /// down exactly once at the end, even when a lifecycle error aborts it.
    pub fn run<'c>(
        &self,
        suite: &TestSuite,
        collector: &'c mut ResultCollector,
    ) -> Result<&'c mut ResultCollector, EngineError> {
        info!("Running {} tests sequentially", suite.count());
        let timer = Timer::start("sequential run");

        collector.start_run();
        let mut fixtures = FixtureState::new();
        let result = run_children(suite.iter(), &mut fixtures, collector);
        fixtures.teardown(collector);
        collector.stop_run();

        info!(
            "Sequential run finished: {} run in {}ms",
            collector.tests_run(),
            timer.stop().as_millis()
        );
        result.map(|()| collector)
    }
}

fn run_children(
    children: Children<'_>,
    fixtures: &mut FixtureState,
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    for child in children {
        if collector.should_stop() {
            break;
        }
        if !fixtures.setup(child, collector) {
            continue;
        }
        match child {
            Entry::Suite(sub) => run_children(sub.iter(), fixtures, collector)?,
            Entry::Item(item) => item.run(collector)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GroupBuilder, NamespaceBuilder, Registry, SuiteEntry, TestError, TestId, TestStatus,
    };
    use crate::result::{CollectorOptions, Event, OutcomeRecorder};
    use anyhow::{anyhow, bail};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn run(suite: &TestSuite, options: CollectorOptions) -> (OutcomeRecorder, bool, bool) {
        let recorder = OutcomeRecorder::new();
        let mut collector = ResultCollector::new(options).with_handler(recorder.clone());
        let collector = SequentialExecutor::new().run(suite, &mut collector).unwrap();
        (recorder, collector.was_successful(), collector.should_stop())
    }

    #[test]
    fn test_preorder_and_start_count() {
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("a")
                    .group(GroupBuilder::new("G1").test("t1", |_| Ok(())).test("t2", |_| Ok(())))
                    .group(GroupBuilder::new("G2").test("t3", |_| Ok(()))),
            )
            .namespace(
                NamespaceBuilder::new("b").group(GroupBuilder::new("G3").test("t4", |_| Ok(()))),
            )
            .build()
            .unwrap();
        let suite = registry.suite();

        let (recorder, successful, _) = run(&suite, CollectorOptions::default());

        let expected: Vec<TestId> = suite.leaves().iter().map(|item| item.id().clone()).collect();
        assert_eq!(recorder.started(), expected);
        assert_eq!(recorder.started().len(), suite.count());
        assert!(successful);
    }

    #[test]
    fn test_failing_group_setup_skips_items() {
        let executed = Arc::new(AtomicUsize::new(0));
        let teardowns = Arc::new(AtomicUsize::new(0));
        let (e1, e2, td) = (executed.clone(), executed.clone(), teardowns.clone());

        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns").group(
                    GroupBuilder::new("Broken")
                        .setup(|| bail!("setup raised"))
                        .teardown(move || {
                            td.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .test("t1", move |_| {
                            e1.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .test("t2", move |_| {
                            e2.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }),
                ),
            )
            .build()
            .unwrap();

        let (recorder, successful, _) = run(&registry.suite(), CollectorOptions::default());

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TestStatus::Error);
        assert_eq!(outcomes[0].test, TestId::new("ns::Broken", "group_setup"));
        assert!(recorder.started().is_empty());
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        assert!(!successful);
    }

    #[test]
    fn test_failfast_stops_before_next_item() {
        let ran_b = Arc::new(AtomicUsize::new(0));
        let counter = ran_b.clone();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns").group(
                    GroupBuilder::new("G")
                        .test("item_a", |_| Err(TestError::failure("boom")))
                        .test("item_b", move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }),
                ),
            )
            .build()
            .unwrap();
        let suite = registry.suite();

        let (recorder, successful, should_stop) =
            run(&suite, CollectorOptions::default().with_failfast(true));

        assert_eq!(suite.count(), 2);
        assert_eq!(recorder.statuses(), vec![TestStatus::Failure]);
        assert_eq!(recorder.started(), vec![TestId::new("ns::G", "item_a")]);
        assert_eq!(ran_b.load(Ordering::SeqCst), 0);
        assert!(should_stop);
        assert!(!successful);
    }

    #[test]
    fn test_body_and_teardown_errors_yield_two_outcomes() {
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns").group(
                    GroupBuilder::new("G")
                        .after_each(|_| Err(anyhow!("teardown raised").into()))
                        .test("t", |_| Err(anyhow!("body raised").into())),
                ),
            )
            .build()
            .unwrap();

        let (recorder, _, _) = run(&registry.suite(), CollectorOptions::default());

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.status == TestStatus::Error && o.test == TestId::new("ns::G", "t")));
        assert!(outcomes[0].exception.as_deref().unwrap().contains("body raised"));
        assert!(outcomes[1].exception.as_deref().unwrap().contains("teardown raised"));
        assert_eq!(recorder.started().len(), 1);
    }

    #[test]
    fn test_empty_suite_is_idempotent() {
        let suite = TestSuite::new(vec![SuiteEntry::from(TestSuite::empty())]);
        let recorder = OutcomeRecorder::new();
        let mut collector = ResultCollector::default().with_handler(recorder.clone());
        let executor = SequentialExecutor::new();

        executor.run(&suite, &mut collector).unwrap();
        executor.run(&suite, &mut collector).unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                Event::RunStarted,
                Event::RunStopped,
                Event::RunStarted,
                Event::RunStopped
            ]
        );
        assert_eq!(collector.tests_run(), 0);
        assert!(collector.was_successful());
    }

    #[test]
    fn test_outcome_classification() {
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns")
                    .group(
                        GroupBuilder::new("G")
                            .test("passes", |_| Ok(()))
                            .test("panics", |_| panic!("assertion failed"))
                            .test("skips", |_| Err(TestError::skip("not today")))
                            .expected_failure("xfail", |_| Err(TestError::failure("known bug")))
                            .expected_failure("xpass", |_| Ok(()))
                            .skipped_test("marked", "flaky", |_| Ok(())),
                    )
                    .group(
                        GroupBuilder::new("Skipped")
                            .skip("unsupported")
                            .test("never", |_| panic!("must not run")),
                    ),
            )
            .build()
            .unwrap();

        let (recorder, successful, _) = run(&registry.suite(), CollectorOptions::default());

        assert_eq!(
            recorder.statuses(),
            vec![
                TestStatus::Success,
                TestStatus::Failure,
                TestStatus::Skipped,
                TestStatus::ExpectedFailure,
                TestStatus::UnexpectedSuccess,
                TestStatus::Skipped,
                TestStatus::Skipped,
            ]
        );
        let outcomes = recorder.outcomes();
        assert_eq!(outcomes[5].message.as_deref(), Some("flaky"));
        assert_eq!(outcomes[6].message.as_deref(), Some("unsupported"));
        assert!(!successful);
    }

    #[test]
    fn test_placeholders_run_inline() {
        let registry = Registry::builder()
            .namespace(NamespaceBuilder::new("broken").load_error("load", "ImportError: nope"))
            .build()
            .unwrap();

        let (recorder, successful, _) = run(&registry.suite(), CollectorOptions::default());

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TestStatus::Error);
        assert_eq!(outcomes[0].exception.as_deref(), Some("ImportError: nope"));
        assert!(!successful);
    }

    #[test]
    fn test_captured_output_attached_to_failures() {
        use std::io::Write;

        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns").group(
                    GroupBuilder::new("G")
                        .test("noisy_pass", |ctx| {
                            writeln!(ctx.stdout(), "hidden")?;
                            Ok(())
                        })
                        .test("noisy_fail", |ctx| {
                            writeln!(ctx.stdout(), "context line")?;
                            writeln!(ctx.stderr(), "warning line")?;
                            Err(TestError::failure("mismatch"))
                        }),
                ),
            )
            .build()
            .unwrap();

        let (recorder, _, _) = run(&registry.suite(), CollectorOptions::buffered());

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes[0].exception, None);
        assert_eq!(
            outcomes[1].exception.as_deref(),
            Some("mismatch\nStdout:\ncontext line\n\nStderr:\nwarning line\n")
        );
    }
}
