//! Test suite tree
//!
//! A [`TestSuite`] is an ordered, immutable, possibly nested sequence of test
//! items and sub-suites. All nodes live in a single arena owned by the suite.
//! Composing suites moves the child's nodes into the parent's arena, so a
//! suite can never contain itself. Parent links exist for diagnostics only;
//! traversal always walks child lists.

use std::fmt;

use super::item::TestItem;

/// Index of a node inside a suite's arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Clone)]
enum NodeKind {
    Suite(Vec<NodeId>),
    Item(TestItem),
}

#[derive(Clone)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Something that can be placed in a suite
pub enum SuiteEntry {
    Item(TestItem),
    Suite(TestSuite),
}

impl From<TestItem> for SuiteEntry {
    fn from(item: TestItem) -> Self {
        SuiteEntry::Item(item)
    }
}

impl From<TestSuite> for SuiteEntry {
    fn from(suite: TestSuite) -> Self {
        SuiteEntry::Suite(suite)
    }
}

/// Borrowed view of one child during traversal
#[derive(Clone, Copy)]
pub enum Entry<'a> {
    Item(&'a TestItem),
    Suite(SuiteView<'a>),
}

impl PartialEq for Entry<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Entry::Item(a), Entry::Item(b)) => a == b,
            (Entry::Suite(a), Entry::Suite(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Item(item) => fmt::Debug::fmt(item, f),
            Entry::Suite(view) => fmt::Debug::fmt(view, f),
        }
    }
}

/// Ordered, immutable tree of test items
#[derive(Clone)]
pub struct TestSuite {
    nodes: Vec<Node>,
}

impl TestSuite {
    pub fn new<I, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<SuiteEntry>,
    {
        let mut suite = Self::empty();
        let mut children = Vec::new();

        for entry in entries {
            let id = match entry.into() {
                SuiteEntry::Item(item) => suite.push(Node {
                    parent: Some(NodeId::ROOT),
                    kind: NodeKind::Item(item),
                }),
                SuiteEntry::Suite(sub) => suite.graft(sub, NodeId::ROOT),
            };
            children.push(id);
        }

        suite.nodes[NodeId::ROOT.0].kind = NodeKind::Suite(children);
        suite
    }

    pub fn empty() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                kind: NodeKind::Suite(Vec::new()),
            }],
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Move every node of `sub` into this arena below `parent`.
    fn graft(&mut self, sub: TestSuite, parent: NodeId) -> NodeId {
        let offset = self.nodes.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);

        for node in sub.nodes {
            let kind = match node.kind {
                NodeKind::Suite(children) => {
                    NodeKind::Suite(children.into_iter().map(shift).collect())
                }
                NodeKind::Item(item) => NodeKind::Item(item),
            };
            self.nodes.push(Node {
                parent: Some(node.parent.map(shift).unwrap_or(parent)),
                kind,
            });
        }

        NodeId(offset)
    }

    pub fn root(&self) -> SuiteView<'_> {
        SuiteView {
            suite: self,
            id: NodeId::ROOT,
        }
    }

    pub fn iter(&self) -> Children<'_> {
        self.root().iter()
    }

    /// Number of leaf test items; sub-suite nodes are not counted.
    pub fn count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Item(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Leaf items in declared pre-order.
    pub fn leaves(&self) -> Vec<&TestItem> {
        self.root().leaves()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Nesting depth of a node; the root is at depth 0.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Copy of this suite keeping only the items matching `predicate`.
    ///
    /// Error placeholders are always kept. Sub-suites are kept even when they
    /// end up empty.
    pub fn filter(&self, predicate: impl Fn(&TestItem) -> bool) -> TestSuite {
        filter_view(self.root(), &predicate)
    }

    fn entry(&self, id: NodeId) -> Entry<'_> {
        match &self.nodes[id.0].kind {
            NodeKind::Item(item) => Entry::Item(item),
            NodeKind::Suite(_) => Entry::Suite(SuiteView { suite: self, id }),
        }
    }
}

fn filter_view(view: SuiteView<'_>, predicate: &dyn Fn(&TestItem) -> bool) -> TestSuite {
    TestSuite::new(view.iter().filter_map(|entry| match entry {
        Entry::Item(item) if item.is_placeholder() || predicate(item) => {
            Some(SuiteEntry::Item(item.clone()))
        }
        Entry::Item(_) => None,
        Entry::Suite(sub) => Some(SuiteEntry::Suite(filter_view(sub, predicate))),
    }))
}

impl Default for TestSuite {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for TestSuite {
    fn eq(&self, other: &Self) -> bool {
        self.root() == other.root()
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.root(), f)
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TestSuite number_of_tests={}>", self.count())
    }
}

impl<'a> IntoIterator for &'a TestSuite {
    type Item = Entry<'a>;
    type IntoIter = Children<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A suite node inside some arena
#[derive(Clone, Copy)]
pub struct SuiteView<'a> {
    suite: &'a TestSuite,
    id: NodeId,
}

impl<'a> SuiteView<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.suite.depth(self.id)
    }

    pub fn iter(&self) -> Children<'a> {
        let ids: &'a [NodeId] = match &self.suite.nodes[self.id.0].kind {
            NodeKind::Suite(children) => children,
            NodeKind::Item(_) => &[],
        };
        Children {
            suite: self.suite,
            ids: ids.iter(),
        }
    }

    pub fn count(&self) -> usize {
        self.iter()
            .map(|entry| match entry {
                Entry::Item(_) => 1,
                Entry::Suite(sub) => sub.count(),
            })
            .sum()
    }

    pub fn leaves(&self) -> Vec<&'a TestItem> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves(&self, leaves: &mut Vec<&'a TestItem>) {
        for entry in self.iter() {
            match entry {
                Entry::Item(item) => leaves.push(item),
                Entry::Suite(sub) => sub.collect_leaves(leaves),
            }
        }
    }
}

impl PartialEq for SuiteView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl fmt::Debug for SuiteView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the direct children of a suite node
pub struct Children<'a> {
    suite: &'a TestSuite,
    ids: std::slice::Iter<'a, NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(|&id| self.suite.entry(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::group::{test_hook, Group, GroupHooks, Namespace};
    use crate::models::TestId;
    use std::sync::Arc;

    fn item(name: &str) -> TestItem {
        let ns = Arc::new(Namespace::new("ns".into(), None, None));
        let group = Arc::new(Group::new("G".into(), ns, GroupHooks::default(), None));
        TestItem::new(group, name, test_hook(|_| Ok(())))
    }

    #[test]
    fn test_count_only_leaves() {
        let suite = TestSuite::new(vec![
            SuiteEntry::from(TestSuite::new(vec![item("a"), item("b")])),
            SuiteEntry::from(TestSuite::empty()),
            SuiteEntry::from(item("c")),
        ]);
        assert_eq!(suite.count(), 3);
        assert_eq!(suite.root().count(), 3);
        assert_eq!(suite.iter().count(), 3);
    }

    #[test]
    fn test_empty_suite() {
        let suite = TestSuite::empty();
        assert_eq!(suite.count(), 0);
        assert!(suite.is_empty());
        assert!(suite.leaves().is_empty());
        assert_eq!(suite, TestSuite::new(Vec::<TestItem>::new()));
    }

    #[test]
    fn test_leaves_in_declared_order() {
        let suite = TestSuite::new(vec![
            SuiteEntry::from(item("a")),
            SuiteEntry::from(TestSuite::new(vec![
                SuiteEntry::from(item("b")),
                SuiteEntry::from(TestSuite::new(vec![item("c")])),
            ])),
            SuiteEntry::from(item("d")),
        ]);
        let names: Vec<_> = suite
            .leaves()
            .iter()
            .map(|item| item.id().method.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_structural_equality() {
        let build = |first: &str, second: &str| {
            TestSuite::new(vec![
                SuiteEntry::from(TestSuite::new(vec![item(first), item(second)])),
                SuiteEntry::from(item("c")),
            ])
        };
        assert_eq!(build("a", "b"), build("a", "b"));
        assert_ne!(build("a", "b"), build("b", "a"));

        let flat = TestSuite::new(vec![item("a"), item("b"), item("c")]);
        assert_ne!(build("a", "b"), flat);
    }

    #[test]
    fn test_parent_links_after_grafting() {
        let inner = TestSuite::new(vec![item("a")]);
        let outer = TestSuite::new(vec![SuiteEntry::from(item("x")), SuiteEntry::from(inner)]);

        let children: Vec<_> = outer.iter().collect();
        let sub = match children[1] {
            Entry::Suite(view) => view,
            Entry::Item(_) => panic!("expected a sub-suite"),
        };
        assert_eq!(outer.parent(sub.id()), Some(NodeId::ROOT));
        assert_eq!(sub.depth(), 1);
        assert_eq!(outer.depth(NodeId::ROOT), 0);
    }

    #[test]
    fn test_filter_keeps_structure_and_placeholders() {
        let placeholder = TestItem::error_placeholder(TestId::new("ns", "load"), "bad");
        let suite = TestSuite::new(vec![
            SuiteEntry::from(TestSuite::new(vec![item("keep_a"), item("drop_b")])),
            SuiteEntry::from(placeholder.clone()),
            SuiteEntry::from(TestSuite::new(vec![item("drop_c")])),
        ]);

        let filtered = suite.filter(|item| item.id().method.starts_with("keep"));
        let expected = TestSuite::new(vec![
            SuiteEntry::from(TestSuite::new(vec![item("keep_a")])),
            SuiteEntry::from(placeholder),
            SuiteEntry::from(TestSuite::empty()),
        ]);
        assert_eq!(filtered, expected);
        assert_eq!(filtered.count(), 2);
    }

    #[test]
    fn test_display() {
        let suite = TestSuite::new(vec![item("a"), item("b")]);
        assert_eq!(suite.to_string(), "<TestSuite number_of_tests=2>");
    }
}
