//! Dependency graph operations.
//!
//! Derives the ready/blocked classification, answers closure queries and
//! detects cycles. Everything is recomputed from the node set handed in;
//! nothing is cached between calls.
//!
//! The graph module provides a generic `DependencyGraph<T>` that works with any
//! type implementing the `GraphNode` trait, so the same algorithms can be
//! exercised with lightweight test nodes.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Trait for types that can participate in a dependency graph
pub trait GraphNode {
    /// Unique identifier for this node
    fn id(&self) -> &str;

    /// IDs of nodes this node depends on
    fn dependencies(&self) -> &BTreeSet<String>;
}

/// Lifecycle facts the ready/blocked classification needs.
pub trait WorkItem: GraphNode {
    /// Whether the item is finished (satisfies its dependents).
    fn is_closed(&self) -> bool;

    /// Whether the item's own status allows work to start.
    fn is_workable(&self) -> bool;
}

impl WorkItem for crate::domain::Issue {
    fn is_closed(&self) -> bool {
        crate::domain::Issue::is_closed(self)
    }

    fn is_workable(&self) -> bool {
        self.status.is_workable()
    }
}

/// Errors that can occur during graph operations
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// A cycle was detected in the dependency graph
    #[error("Cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    /// Referenced node does not exist
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },
}

impl From<GraphError> for crate::errors::TrackerError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected { path } => crate::errors::TrackerError::Cycle { path },
            GraphError::NodeNotFound { id } => crate::errors::TrackerError::NotFound { id },
        }
    }
}

/// A node that is blocked, with the dependencies still holding it up.
#[derive(Debug, Clone)]
pub struct Blocked<'a, T> {
    pub node: &'a T,
    /// Dependencies that resolve to a stored, non-closed node
    pub blockers: Vec<String>,
}

/// One dependency edge out of an expanded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEdge {
    /// A stored node, expanded at this index of [`DependencyTree::nodes`]
    Node(usize),
    /// A dependency id with no stored node
    Missing(String),
    /// A dependency id already on the current path; not expanded again
    Cycle(String),
}

/// A stored node in a dependency tree with its outgoing edges.
#[derive(Debug)]
pub struct TreeNode<'a, T> {
    pub node: &'a T,
    pub dependencies: Vec<TreeEdge>,
}

/// Dependency closure of a root node, with any cycles met on the way.
///
/// Every stored node in the closure is expanded exactly once and kept in
/// `nodes`; a node reached again through another branch (a diamond) is
/// referenced by index rather than copied. `nodes[0]` is the root.
#[derive(Debug)]
pub struct DependencyTree<'a, T> {
    pub nodes: Vec<TreeNode<'a, T>>,
    /// Each cycle as the path from the revisited id back to itself
    pub cycles: Vec<Vec<String>>,
}

impl<'a, T> DependencyTree<'a, T> {
    pub fn root(&self) -> &TreeNode<'a, T> {
        &self.nodes[0]
    }

    pub fn has_cycle(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Turn a detected cycle into an error.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        match self.cycles.first() {
            Some(path) => Err(GraphError::CycleDetected { path: path.clone() }),
            None => Ok(()),
        }
    }
}

/// Generic dependency graph with cycle detection and traversal
///
/// All methods are pure functions that do not modify the graph structure.
pub struct DependencyGraph<'a, T: GraphNode> {
    order: Vec<&'a T>,
    nodes: HashMap<&'a str, &'a T>,
}

impl<'a, T: GraphNode> DependencyGraph<'a, T> {
    /// Create a new dependency graph from a list of nodes
    pub fn new(nodes: &[&'a T]) -> Self {
        let nodes_map = nodes.iter().map(|node| (node.id(), *node)).collect();

        Self {
            order: nodes.to_vec(),
            nodes: nodes_map,
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a T> {
        self.nodes.get(id).copied()
    }

    /// Validate that adding a dependency would not create a cycle
    pub fn validate_add_dependency(&self, from_id: &str, to_id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from_id) {
            return Err(GraphError::NodeNotFound {
                id: from_id.to_string(),
            });
        }
        if !self.nodes.contains_key(to_id) {
            return Err(GraphError::NodeNotFound {
                id: to_id.to_string(),
            });
        }

        // Adding from -> to closes a cycle iff `from` is already reachable from `to`
        if let Some(path) = self.find_path(to_id, from_id) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(from_id.to_string());
            cycle.extend(path);
            return Err(GraphError::CycleDetected { path: cycle });
        }

        Ok(())
    }

    /// Shortest dependency path from `start` to `target`, both inclusive.
    fn find_path(&self, start: &str, target: &str) -> Option<Vec<String>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = vec![current.to_string()];
                let mut cursor = current;
                while let Some(parent) = parents.get(cursor) {
                    path.push(parent.to_string());
                    cursor = *parent;
                }
                path.reverse();
                return Some(path);
            }

            if let Some(node) = self.nodes.get(current) {
                for dep in node.dependencies() {
                    if visited.insert(dep.as_str()) {
                        parents.insert(dep.as_str(), current);
                        queue.push_back(dep.as_str());
                    }
                }
            }
        }

        None
    }

    /// Get all nodes that directly depend on the given node
    pub fn get_dependents(&self, node_id: &str) -> Vec<&'a T> {
        self.order
            .iter()
            .filter(|node| node.dependencies().contains(node_id))
            .copied()
            .collect()
    }

    /// Build the dependency closure of `root_id`.
    ///
    /// Depth-first with an explicit stack, so chain length is bounded by
    /// memory rather than by the call stack. An edge back to an id on the
    /// current path becomes a [`TreeEdge::Cycle`] and the cycle is recorded.
    /// An edge into an already expanded node is a [`TreeEdge::Node`]
    /// reference; if that node's closure reaches back onto the current path
    /// the cycle through the new edge is recorded too.
    pub fn tree(&self, root_id: &str) -> Result<DependencyTree<'a, T>, GraphError> {
        let Some(root) = self.get(root_id) else {
            return Err(GraphError::NodeNotFound {
                id: root_id.to_string(),
            });
        };

        let mut walk = TreeWalk::new();
        walk.open(root);

        while let Some(frame) = walk.stack.last_mut() {
            let current = frame.index;
            let Some(dep) = frame.deps.next() else {
                walk.close();
                continue;
            };

            let edge = match walk.index.get(dep.as_str()).copied() {
                Some(seen) => match walk.on_path[seen] {
                    Some(pos) => {
                        let cycle = walk.stack[pos..]
                            .iter()
                            .map(|f| walk.nodes[f.index].node.id().to_string())
                            .chain(std::iter::once(dep.clone()))
                            .collect();
                        walk.record_cycle(cycle);
                        walk.reaches_cycle[current] = true;
                        TreeEdge::Cycle(dep.clone())
                    }
                    None => {
                        if walk.reaches_cycle[seen] {
                            let from = walk.nodes[current].node.id();
                            if let Some(path) = self.find_path(dep, from) {
                                let mut cycle = vec![from.to_string()];
                                cycle.extend(path);
                                walk.record_cycle(cycle);
                            }
                            walk.reaches_cycle[current] = true;
                        }
                        TreeEdge::Node(seen)
                    }
                },
                None => match self.get(dep) {
                    Some(node) => TreeEdge::Node(walk.open(node)),
                    None => TreeEdge::Missing(dep.clone()),
                },
            };
            walk.nodes[current].dependencies.push(edge);
        }

        Ok(DependencyTree {
            nodes: walk.nodes,
            cycles: walk.cycles,
        })
    }
}

struct Frame<'a> {
    index: usize,
    deps: std::collections::btree_set::Iter<'a, String>,
}

/// Traversal state for [`DependencyGraph::tree`], indexed by arena slot.
struct TreeWalk<'a, T> {
    nodes: Vec<TreeNode<'a, T>>,
    index: HashMap<&'a str, usize>,
    /// Stack position while a node is on the current path
    on_path: Vec<Option<usize>>,
    /// Some edge in the node's closure closed a cycle
    reaches_cycle: Vec<bool>,
    stack: Vec<Frame<'a>>,
    cycles: Vec<Vec<String>>,
}

impl<'a, T: GraphNode> TreeWalk<'a, T> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            on_path: Vec::new(),
            reaches_cycle: Vec::new(),
            stack: Vec::new(),
            cycles: Vec::new(),
        }
    }

    /// Allocate an arena slot for `node` and push it onto the path.
    fn open(&mut self, node: &'a T) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            node,
            dependencies: Vec::new(),
        });
        self.index.insert(node.id(), index);
        self.on_path.push(Some(self.stack.len()));
        self.reaches_cycle.push(false);
        self.stack.push(Frame {
            index,
            deps: node.dependencies().iter(),
        });
        index
    }

    /// Pop the finished node, passing its cycle flag up to the parent.
    fn close(&mut self) {
        if let Some(done) = self.stack.pop() {
            self.on_path[done.index] = None;
            if let Some(parent) = self.stack.last() {
                if self.reaches_cycle[done.index] {
                    self.reaches_cycle[parent.index] = true;
                }
            }
        }
    }

    fn record_cycle(&mut self, cycle: Vec<String>) {
        if !self.cycles.contains(&cycle) {
            self.cycles.push(cycle);
        }
    }
}

impl<'a, T: WorkItem> DependencyGraph<'a, T> {
    /// Dependencies of `node` that resolve to a stored, non-closed node.
    ///
    /// Ids that do not resolve are treated as satisfied.
    pub fn unresolved_dependencies(&self, node: &T) -> Vec<String> {
        node.dependencies()
            .iter()
            .filter(|dep| matches!(self.nodes.get(dep.as_str()), Some(d) if !d.is_closed()))
            .cloned()
            .collect()
    }

    /// Every dependency is missing or closed.
    pub fn is_satisfied(&self, node: &T) -> bool {
        node.dependencies()
            .iter()
            .all(|dep| self.nodes.get(dep.as_str()).map_or(true, |d| d.is_closed()))
    }

    /// Workable status and all dependencies satisfied.
    pub fn is_ready(&self, node: &T) -> bool {
        node.is_workable() && self.is_satisfied(node)
    }

    /// Not closed and held up by at least one dependency.
    ///
    /// Independent of whether the stored status literally says `blocked`.
    pub fn is_blocked(&self, node: &T) -> bool {
        !node.is_closed() && !self.is_satisfied(node)
    }

    /// All ready nodes, in input order.
    pub fn ready(&self) -> Vec<&'a T> {
        self.order
            .iter()
            .filter(|node| self.is_ready(node))
            .copied()
            .collect()
    }

    /// All blocked nodes with their outstanding blockers, in input order.
    pub fn blocked(&self) -> Vec<Blocked<'a, T>> {
        self.order
            .iter()
            .copied()
            .filter(|node| !node.is_closed())
            .filter_map(|node| {
                let blockers = self.unresolved_dependencies(node);
                (!blockers.is_empty()).then_some(Blocked { node, blockers })
            })
            .collect()
    }
}
