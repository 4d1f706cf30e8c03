//! Result handlers
//!
//! Handlers observe the lifecycle of a run. The collector calls them in a
//! stable order: user-supplied handlers first, core handlers last, each set
//! sorted by type name.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Outcome, TestId, TestStatus};

/// Pluggable observer of test lifecycle events
///
/// Handlers sit on the hot path and must not panic.
pub trait ResultHandler: Send {
    fn start_test_run(&mut self) {}

    fn stop_test_run(&mut self) {}

    fn start_test(&mut self, _test: &TestId) {}

    fn stop_test(&mut self, _test: &TestId) {}

    fn handle(&mut self, outcome: &Outcome);

    /// Core handlers are dispatched after every user-supplied handler.
    fn is_core(&self) -> bool {
        false
    }

    fn sort_key(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Dispatch order for `handlers`, as indices into the slice.
pub(crate) fn sort_handlers(handlers: &[Box<dyn ResultHandler>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..handlers.len()).collect();
    order.sort_by_key(|&index| (handlers[index].is_core(), handlers[index].sort_key()));
    order
}

/// Lifecycle event seen by an [`OutcomeRecorder`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    RunStarted,
    RunStopped,
    TestStarted(TestId),
    TestStopped(TestId),
    Outcome(TestId, TestStatus),
}

#[derive(Default)]
struct Recorded {
    outcomes: Vec<Outcome>,
    events: Vec<Event>,
}

/// Handler that keeps every outcome and event it sees
///
/// Clones share the same storage, so one clone can be registered with a
/// collector while another is kept to read the results back.
#[derive(Clone, Default)]
pub struct OutcomeRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.lock().outcomes.clone()
    }

    pub fn take_outcomes(&self) -> Vec<Outcome> {
        std::mem::take(&mut self.lock().outcomes)
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn statuses(&self) -> Vec<TestStatus> {
        self.lock().outcomes.iter().map(|o| o.status).collect()
    }

    pub fn started(&self) -> Vec<TestId> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::TestStarted(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ResultHandler for OutcomeRecorder {
    fn start_test_run(&mut self) {
        self.lock().events.push(Event::RunStarted);
    }

    fn stop_test_run(&mut self) {
        self.lock().events.push(Event::RunStopped);
    }

    fn start_test(&mut self, test: &TestId) {
        self.lock().events.push(Event::TestStarted(test.clone()));
    }

    fn stop_test(&mut self, test: &TestId) {
        self.lock().events.push(Event::TestStopped(test.clone()));
    }

    fn handle(&mut self, outcome: &Outcome) {
        let mut recorded = self.lock();
        recorded
            .events
            .push(Event::Outcome(outcome.test.clone(), outcome.status));
        recorded.outcomes.push(outcome.clone());
    }
}
