//! Data models for test execution
//!
//! Identity, outcomes, the suite tree and the registration table.

mod group;
mod item;
mod registry;
mod suite;
mod test_result;

pub use group::{hook, test_hook, Group, GroupHooks, Hook, Namespace, TestHook, SCOPE_SEPARATOR};
pub use item::{TestContext, TestError, TestItem};
pub(crate) use item::{guarded, Step};
pub use registry::{GroupBuilder, NamespaceBuilder, Registry, RegistryBuilder};
pub use suite::{Children, Entry, NodeId, SuiteEntry, SuiteView, TestSuite};
pub use test_result::{Outcome, RunSummary, TestId, TestStatus};
