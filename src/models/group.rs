//! Namespace and group models
//!
//! A namespace is a module-like collection of groups; a group is a class-like
//! collection of tests. Both may carry setup/teardown hooks that are shared by
//! every test inside them.

use std::fmt;
use std::sync::Arc;

use super::item::{TestContext, TestError};

/// Shared setup/teardown hook for a namespace or group
pub type Hook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Per-test hook (runs around every test body) and test body signature
pub type TestHook = Arc<dyn Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync>;

/// Box a closure as a [`Hook`].
pub fn hook<F>(f: F) -> Hook
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a [`TestHook`].
pub fn test_hook<F>(f: F) -> TestHook
where
    F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Separator used in qualified group names
pub const SCOPE_SEPARATOR: &str = "::";

/// Module-like grouping of groups
pub struct Namespace {
    name: String,
    setup: Option<Hook>,
    teardown: Option<Hook>,
}

impl Namespace {
    pub(crate) fn new(name: String, setup: Option<Hook>, teardown: Option<Hook>) -> Self {
        Self {
            name,
            setup,
            teardown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup_hook(&self) -> Option<&Hook> {
        self.setup.as_ref()
    }

    pub fn teardown_hook(&self) -> Option<&Hook> {
        self.teardown.as_ref()
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Namespace {}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Hooks attached to a group
#[derive(Clone, Default)]
pub struct GroupHooks {
    pub setup: Option<Hook>,
    pub teardown: Option<Hook>,
    pub before_each: Option<TestHook>,
    pub after_each: Option<TestHook>,
}

/// Class-like grouping of tests
pub struct Group {
    name: String,
    qualified_name: String,
    namespace: Arc<Namespace>,
    hooks: GroupHooks,
    skip: Option<String>,
}

impl Group {
    pub(crate) fn new(
        name: String,
        namespace: Arc<Namespace>,
        hooks: GroupHooks,
        skip: Option<String>,
    ) -> Self {
        let qualified_name = format!("{}{SCOPE_SEPARATOR}{}", namespace.name(), name);
        Self {
            name,
            qualified_name,
            namespace,
            hooks,
            skip,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace::Group`, the group half of every test id in this group
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub fn hooks(&self) -> &GroupHooks {
        &self.hooks
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for Group {}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.qualified_name)
            .field("skip", &self.skip)
            .finish()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_qualified_name() {
        let ns = Arc::new(Namespace::new("math".into(), None, None));
        let group = Group::new("Adder".into(), ns.clone(), GroupHooks::default(), None);
        assert_eq!(group.qualified_name(), "math::Adder");
        assert_eq!(group.namespace().name(), "math");
        assert!(!group.is_skipped());
    }

    #[test]
    fn test_group_equality_by_name() {
        let ns = Arc::new(Namespace::new("math".into(), None, None));
        let a = Group::new("Adder".into(), ns.clone(), GroupHooks::default(), None);
        let b = Group::new(
            "Adder".into(),
            ns.clone(),
            GroupHooks::default(),
            Some("later".into()),
        );
        let c = Group::new("Divider".into(), ns, GroupHooks::default(), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
