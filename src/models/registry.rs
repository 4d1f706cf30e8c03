//! Test registration
//!
//! Tests are registered explicitly: namespaces hold groups, groups hold an
//! ordered list of `(name, body)` pairs. The registry turns that table into a
//! [`TestSuite`] and resolves test ids inside worker processes.

use std::collections::HashMap;
use std::sync::Arc;

use super::group::{Group, GroupHooks, Hook, Namespace, TestHook};
use super::item::{TestContext, TestError, TestItem};
use super::suite::{SuiteEntry, TestSuite};
use super::test_result::TestId;
use crate::error::EngineError;

struct TestDef {
    name: String,
    body: TestHook,
    expect_failure: bool,
    skip: Option<String>,
}

/// Builder for one group and its tests
pub struct GroupBuilder {
    name: String,
    hooks: GroupHooks,
    skip: Option<String>,
    tests: Vec<TestDef>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: GroupHooks::default(),
            skip: None,
            tests: Vec::new(),
        }
    }

    /// Runs once before the first test of the group.
    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.setup = Some(Arc::new(f));
        self
    }

    /// Runs once after the last test of the group.
    pub fn teardown<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.teardown = Some(Arc::new(f));
        self
    }

    /// Runs before every test body.
    pub fn before_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.hooks.before_each = Some(Arc::new(f));
        self
    }

    /// Runs after every test body, even a failed one.
    pub fn after_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.hooks.after_each = Some(Arc::new(f));
        self
    }

    /// Skip the whole group; none of its hooks will run.
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.push(name.into(), Arc::new(body), false, None)
    }

    /// A test that is expected to fail; passing is reported as an unexpected success.
    pub fn expected_failure<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.push(name.into(), Arc::new(body), true, None)
    }

    pub fn skipped_test<F>(self, name: impl Into<String>, reason: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.push(name.into(), Arc::new(body), false, Some(reason.into()))
    }

    fn push(
        mut self,
        name: String,
        body: TestHook,
        expect_failure: bool,
        skip: Option<String>,
    ) -> Self {
        self.tests.push(TestDef {
            name,
            body,
            expect_failure,
            skip,
        });
        self
    }
}

/// Builder for one namespace
pub struct NamespaceBuilder {
    name: String,
    setup: Option<Hook>,
    teardown: Option<Hook>,
    groups: Vec<GroupBuilder>,
    load_errors: Vec<(String, String)>,
}

impl NamespaceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            teardown: None,
            groups: Vec::new(),
            load_errors: Vec::new(),
        }
    }

    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(f));
        self
    }

    pub fn teardown<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(f));
        self
    }

    pub fn group(mut self, group: GroupBuilder) -> Self {
        self.groups.push(group);
        self
    }

    /// Record a failure that happened while collecting this namespace.
    ///
    /// It shows up in the suite as an error placeholder named `what`.
    pub fn load_error(mut self, what: impl Into<String>, error: impl Into<String>) -> Self {
        self.load_errors.push((what.into(), error.into()));
        self
    }
}

struct RegisteredGroup {
    group: Arc<Group>,
    items: Vec<TestItem>,
}

struct RegisteredNamespace {
    namespace: Arc<Namespace>,
    groups: Vec<RegisteredGroup>,
    placeholders: Vec<TestItem>,
}

/// Builder for a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    namespaces: Vec<NamespaceBuilder>,
}

impl RegistryBuilder {
    pub fn namespace(mut self, namespace: NamespaceBuilder) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn build(self) -> Result<Registry, EngineError> {
        let mut registry = Registry::default();

        for builder in self.namespaces {
            let namespace = Arc::new(Namespace::new(
                builder.name,
                builder.setup,
                builder.teardown,
            ));

            let placeholders = builder
                .load_errors
                .into_iter()
                .map(|(what, error)| {
                    TestItem::error_placeholder(TestId::new(namespace.name(), what), error)
                })
                .collect::<Vec<_>>();

            let mut groups = Vec::new();
            for group_builder in builder.groups {
                let group = Arc::new(Group::new(
                    group_builder.name,
                    namespace.clone(),
                    group_builder.hooks,
                    group_builder.skip,
                ));
                let items = group_builder
                    .tests
                    .into_iter()
                    .map(|def| {
                        TestItem::with_markers(
                            group.clone(),
                            def.name,
                            def.body,
                            def.expect_failure,
                            def.skip,
                        )
                    })
                    .collect::<Vec<_>>();
                groups.push(RegisteredGroup { group, items });
            }

            let registered = RegisteredNamespace {
                namespace,
                groups,
                placeholders,
            };
            for item in registered.items() {
                if registry.index.insert(item.id().clone(), item.clone()).is_some() {
                    return Err(EngineError::DuplicateTest(item.id().clone()));
                }
            }
            registry.namespaces.push(registered);
        }

        Ok(registry)
    }
}

impl RegisteredNamespace {
    fn items(&self) -> impl Iterator<Item = &TestItem> {
        self.placeholders
            .iter()
            .chain(self.groups.iter().flat_map(|group| group.items.iter()))
    }
}

/// Statically built table of every known test
#[derive(Default)]
pub struct Registry {
    namespaces: Vec<RegisteredNamespace>,
    index: HashMap<TestId, TestItem>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Suite of namespace suites, each holding one suite per group.
    pub fn suite(&self) -> TestSuite {
        TestSuite::new(self.namespaces.iter().map(|ns| {
            let placeholders = ns.placeholders.iter().cloned().map(SuiteEntry::from);
            let groups = ns
                .groups
                .iter()
                .map(|group| SuiteEntry::from(TestSuite::new(group.items.iter().cloned())));
            SuiteEntry::from(TestSuite::new(placeholders.chain(groups)))
        }))
    }

    pub fn find(&self, id: &TestId) -> Option<&TestItem> {
        self.index.get(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Arc<Namespace>> {
        self.namespaces.iter().map(|ns| &ns.namespace)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.groups.iter().map(|group| &group.group))
    }
}
