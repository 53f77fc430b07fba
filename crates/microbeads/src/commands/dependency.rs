//! Dependency graph operations

use super::*;
use crate::errors::TrackerError;
use crate::graph::{DependencyTree, TreeEdge};
use crate::output::{TreeEdgeView, TreeNodeView, TreeResponse};
use serde::Serialize;

/// Outcome of adding or removing a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyChange {
    Added,
    Removed,
    /// The edge was already in the requested state; nothing was written
    Unchanged,
}

impl<S: IssueStore> CommandExecutor<S> {
    /// Record that `child` depends on (is blocked by) `parent`.
    ///
    /// Both issues must exist. With `[dependencies] reject_cycles` enabled
    /// (the default) an edge that would close a cycle is refused before
    /// anything is written.
    pub fn add_dependency(&self, child: &str, parent: &str) -> Result<(String, String, DependencyChange)> {
        let child_id = self.repo.resolve(child)?;
        let parent_id = self.repo.resolve(parent)?;

        if child_id == parent_id {
            return Err(TrackerError::validation(format!(
                "Issue {} cannot depend on itself",
                child_id
            ))
            .into());
        }

        let mut issue = self.repo.get(&child_id)?;
        if issue.dependencies.contains(&parent_id) {
            return Ok((child_id, parent_id, DependencyChange::Unchanged));
        }

        if self.config.reject_cycles() {
            self.with_graph(|graph| {
                graph
                    .validate_add_dependency(&child_id, &parent_id)
                    .map_err(TrackerError::from)?;
                Ok(())
            })?;
        }

        issue.dependencies.insert(parent_id.clone());
        issue.touch(self.repo.now());
        self.repo.save(&issue)?;
        info!(child = %child_id, parent = %parent_id, "added dependency");
        Ok((child_id, parent_id, DependencyChange::Added))
    }

    /// Drop the edge `child -> parent`.
    ///
    /// `parent` may name an issue that no longer exists, so dangling edges
    /// can be cleaned up by their literal id.
    pub fn remove_dependency(&self, child: &str, parent: &str) -> Result<(String, String, DependencyChange)> {
        let child_id = self.repo.resolve(child)?;
        let mut issue = self.repo.get(&child_id)?;

        let parent_id = if issue.dependencies.contains(parent) {
            parent.to_string()
        } else {
            self.repo.resolve(parent)?
        };

        if !issue.dependencies.remove(&parent_id) {
            return Ok((child_id, parent_id, DependencyChange::Unchanged));
        }

        issue.touch(self.repo.now());
        self.repo.save(&issue)?;
        info!(child = %child_id, parent = %parent_id, "removed dependency");
        Ok((child_id, parent_id, DependencyChange::Removed))
    }

    /// Dependency closure of an issue, with any cycles found on the way.
    pub fn dependency_tree(&self, id: &str) -> Result<TreeResponse> {
        let root_id = self.repo.resolve(id)?;
        self.with_graph(|graph| {
            let tree = graph.tree(&root_id).map_err(TrackerError::from)?;
            Ok(render_tree(&tree))
        })
    }
}

fn render_tree(tree: &DependencyTree<'_, Issue>) -> TreeResponse {
    let nodes = tree
        .nodes
        .iter()
        .map(|entry| TreeNodeView {
            id: entry.node.id.clone(),
            title: entry.node.title.clone(),
            status: entry.node.status,
            dependencies: entry
                .dependencies
                .iter()
                .map(|edge| match edge {
                    TreeEdge::Node(index) => TreeEdgeView::Issue {
                        id: tree.nodes[*index].node.id.clone(),
                    },
                    TreeEdge::Missing(id) => TreeEdgeView::Missing { id: id.clone() },
                    TreeEdge::Cycle(id) => TreeEdgeView::Cycle { id: id.clone() },
                })
                .collect(),
        })
        .collect();

    TreeResponse {
        root: tree.root().node.id.clone(),
        nodes,
        cycles: tree.cycles.clone(),
    }
}
