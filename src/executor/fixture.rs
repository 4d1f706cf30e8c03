//! Fixture scoping
//!
//! Tracks the active namespace and group during a traversal so that their
//! setup hooks run once on first entry and their teardown hooks run once on
//! exit. Hook failures are reported into the collector as synthetic errors
//! and never abort the traversal.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{guarded, Entry, Group, Hook, Namespace, Step, TestId};
use crate::result::ResultCollector;

/// Scoped setup/teardown state machine
#[derive(Debug, Default)]
pub struct FixtureState {
    namespace: Option<Arc<Namespace>>,
    group: Option<Arc<Group>>,
    namespace_failed: bool,
    group_failed: bool,
}

impl FixtureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_namespace(&self) -> Option<&Arc<Namespace>> {
        self.namespace.as_ref()
    }

    pub fn active_group(&self) -> Option<&Arc<Group>> {
        self.group.as_ref()
    }

    /// Whether the active scopes are poisoned by a failed or skipped setup.
    pub fn is_poisoned(&self) -> bool {
        self.namespace_failed || self.group_failed
    }

    /// Prepare fixtures for `next`. Returns `false` when `next` must not run.
    ///
    /// Sub-suites never change state; their leaves do when they are reached.
    /// Error placeholders belong to no group and leave the state untouched.
    pub fn setup(&mut self, next: Entry<'_>, collector: &mut ResultCollector) -> bool {
        let item = match next {
            Entry::Suite(_) => return true,
            Entry::Item(item) => item,
        };
        let Some(group) = item.group() else {
            return true;
        };
        let namespace = group.namespace();

        if self.namespace.as_deref() != Some(namespace.as_ref()) {
            self.teardown_group(collector);
            self.teardown_namespace(collector);
            self.setup_namespace(namespace.clone(), collector);
        }

        if self.group.as_deref() != Some(group.as_ref()) {
            self.teardown_group(collector);
            self.setup_group(group.clone(), collector);
        }

        !self.is_poisoned()
    }

    /// Tear down whatever is still active. A no-op if nothing was set up.
    pub fn teardown(&mut self, collector: &mut ResultCollector) {
        self.teardown_group(collector);
        self.teardown_namespace(collector);
    }

    fn setup_namespace(&mut self, namespace: Arc<Namespace>, collector: &mut ResultCollector) {
        debug!("Entering namespace {}", namespace.name());
        self.namespace_failed = false;
        if let Some(hook) = namespace.setup_hook() {
            let id = TestId::new(namespace.name(), "namespace_setup");
            self.namespace_failed = !call_hook(hook, id, collector);
        }
        self.namespace = Some(namespace);
    }

    fn teardown_namespace(&mut self, collector: &mut ResultCollector) {
        let Some(namespace) = self.namespace.take() else {
            return;
        };
        if std::mem::take(&mut self.namespace_failed) {
            debug!("Namespace {} setup failed, skipping teardown", namespace.name());
            return;
        }
        debug!("Leaving namespace {}", namespace.name());
        if let Some(hook) = namespace.teardown_hook() {
            call_hook(hook, TestId::new(namespace.name(), "namespace_teardown"), collector);
        }
    }

    fn setup_group(&mut self, group: Arc<Group>, collector: &mut ResultCollector) {
        self.group_failed = false;
        if self.namespace_failed {
            debug!("Namespace of {group} failed, group poisoned");
            self.group_failed = true;
        } else if group.is_skipped() {
            debug!("Group {group} is skipped, fixtures not run");
        } else if let Some(hook) = &group.hooks().setup {
            debug!("Setting up group {group}");
            let id = TestId::new(group.qualified_name(), "group_setup");
            self.group_failed = !call_hook(hook, id, collector);
        }
        self.group = Some(group);
    }

    fn teardown_group(&mut self, collector: &mut ResultCollector) {
        let Some(group) = self.group.take() else {
            return;
        };
        if std::mem::take(&mut self.group_failed) {
            debug!("Group {group} setup failed, skipping teardown");
            return;
        }
        if group.is_skipped() {
            return;
        }
        if let Some(hook) = &group.hooks().teardown {
            debug!("Tearing down group {group}");
            call_hook(hook, TestId::new(group.qualified_name(), "group_teardown"), collector);
        }
    }
}

/// Run a fixture hook, reporting a failure under `id`. Returns `true` on success.
fn call_hook(hook: &Hook, id: TestId, collector: &mut ResultCollector) -> bool {
    let exception = match guarded(|| hook().map_err(Into::into)) {
        Step::Passed | Step::Skipped(_) => return true,
        Step::Failed(text) | Step::Errored(text) => text,
    };
    warn!("Fixture {id} failed: {exception}");
    collector.add_error(id, exception);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupBuilder, NamespaceBuilder, Registry, TestSuite};
    use crate::result::OutcomeRecorder;
    use anyhow::bail;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logged(log: &Log, entry: impl Into<String>) -> impl Fn() -> anyhow::Result<()> + Send + Sync {
        let log = log.clone();
        let entry = entry.into();
        move || {
            log.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn group(log: &Log, name: &'static str, tests: &[&'static str]) -> GroupBuilder {
        tests.iter().fold(
            GroupBuilder::new(name)
                .setup(logged(log, format!("{name}.setup")))
                .teardown(logged(log, format!("{name}.teardown"))),
            |builder, test| builder.test(*test, |_| Ok(())),
        )
    }

    /// Feed every leaf through `setup`, then tear down.
    fn drive(suite: &TestSuite, collector: &mut ResultCollector) -> Vec<bool> {
        let mut state = FixtureState::new();
        let verdicts = suite
            .leaves()
            .into_iter()
            .map(|item| state.setup(Entry::Item(item), collector))
            .collect();
        state.teardown(collector);
        verdicts
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_hooks_run_once_per_scope() {
        let log: Log = Arc::default();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns1")
                    .setup(logged(&log, "ns1.setup"))
                    .teardown(logged(&log, "ns1.teardown"))
                    .group(group(&log, "A", &["a1", "a2"]))
                    .group(group(&log, "B", &["b1"])),
            )
            .namespace(NamespaceBuilder::new("ns2").group(group(&log, "C", &["c1"])))
            .build()
            .unwrap();

        let mut collector = ResultCollector::default();
        let verdicts = drive(&registry.suite(), &mut collector);

        assert_eq!(verdicts, vec![true; 4]);
        assert_eq!(
            entries(&log),
            vec![
                "ns1.setup",
                "A.setup",
                "A.teardown",
                "B.setup",
                "B.teardown",
                "ns1.teardown",
                "C.setup",
                "C.teardown",
            ]
        );
        assert!(collector.was_successful());
    }

    #[test]
    fn test_failing_group_setup_poisons_group_once() {
        let log: Log = Arc::default();
        let recorder = OutcomeRecorder::new();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns")
                    .group(
                        GroupBuilder::new("Broken")
                            .setup(|| bail!("no database"))
                            .teardown(logged(&log, "Broken.teardown"))
                            .test("t1", |_| Ok(()))
                            .test("t2", |_| Ok(())),
                    )
                    .group(group(&log, "Fine", &["t3"])),
            )
            .build()
            .unwrap();

        let mut collector = ResultCollector::default().with_handler(recorder.clone());
        let verdicts = drive(&registry.suite(), &mut collector);

        assert_eq!(verdicts, vec![false, false, true]);
        assert_eq!(entries(&log), vec!["Fine.setup", "Fine.teardown"]);

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].test, TestId::new("ns::Broken", "group_setup"));
        assert!(outcomes[0]
            .exception
            .as_deref()
            .is_some_and(|text| text.contains("no database")));
        assert!(!collector.was_successful());
    }

    #[test]
    fn test_failing_namespace_setup_poisons_groups() {
        let log: Log = Arc::default();
        let recorder = OutcomeRecorder::new();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns")
                    .setup(|| panic!("cannot connect"))
                    .teardown(logged(&log, "ns.teardown"))
                    .group(group(&log, "A", &["a1"]))
                    .group(group(&log, "B", &["b1"])),
            )
            .build()
            .unwrap();

        let mut collector = ResultCollector::default().with_handler(recorder.clone());
        let verdicts = drive(&registry.suite(), &mut collector);

        assert_eq!(verdicts, vec![false, false]);
        assert!(entries(&log).is_empty());
        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].test, TestId::new("ns", "namespace_setup"));
        assert!(outcomes[0]
            .exception
            .as_deref()
            .is_some_and(|text| text.contains("cannot connect")));
    }

    #[test]
    fn test_failing_teardown_reported_not_raised() {
        let recorder = OutcomeRecorder::new();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns").group(
                    GroupBuilder::new("G")
                        .teardown(|| bail!("leaked handle"))
                        .test("t", |_| Ok(())),
                ),
            )
            .build()
            .unwrap();

        let mut collector = ResultCollector::default().with_handler(recorder.clone());
        let verdicts = drive(&registry.suite(), &mut collector);

        assert_eq!(verdicts, vec![true]);
        assert_eq!(
            recorder.outcomes()[0].test,
            TestId::new("ns::G", "group_teardown")
        );
    }

    #[test]
    fn test_skipped_group_runs_no_fixtures() {
        let log: Log = Arc::default();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns")
                    .group(group(&log, "S", &["s1"]).skip("not on this platform")),
            )
            .build()
            .unwrap();

        let mut collector = ResultCollector::default();
        let verdicts = drive(&registry.suite(), &mut collector);

        assert_eq!(verdicts, vec![true]);
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_containers_and_placeholders_change_nothing() {
        let log: Log = Arc::default();
        let registry = Registry::builder()
            .namespace(
                NamespaceBuilder::new("ns")
                    .load_error("load", "syntax error")
                    .group(group(&log, "A", &["a1"])),
            )
            .build()
            .unwrap();
        let suite = registry.suite();
        let mut collector = ResultCollector::default();
        let mut state = FixtureState::new();

        for entry in suite.iter() {
            assert!(state.setup(entry, &mut collector));
        }
        let placeholder = suite.leaves()[0];
        assert!(placeholder.is_placeholder());
        assert!(state.setup(Entry::Item(placeholder), &mut collector));

        assert!(state.active_group().is_none());
        assert!(state.active_namespace().is_none());
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_teardown_without_setup_is_noop() {
        let recorder = OutcomeRecorder::new();
        let mut collector = ResultCollector::default().with_handler(recorder.clone());
        let mut state = FixtureState::new();
        state.teardown(&mut collector);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_group_never_active_without_namespace() {
        let log: Log = Arc::default();
        let registry = Registry::builder()
            .namespace(NamespaceBuilder::new("ns").group(group(&log, "A", &["a1"])))
            .build()
            .unwrap();
        let suite = registry.suite();
        let mut collector = ResultCollector::default();
        let mut state = FixtureState::new();

        state.setup(Entry::Item(suite.leaves()[0]), &mut collector);
        assert_eq!(state.active_group().map(|g| g.qualified_name()), Some("ns::A"));
        assert_eq!(state.active_namespace().map(|ns| ns.name()), Some("ns"));

        state.teardown(&mut collector);
        assert!(state.active_group().is_none());
        assert!(state.active_namespace().is_none());
    }
}
