//! Ready/blocked queries

use super::*;

/// An issue held up by dependencies that exist and are not closed.
#[derive(Debug, Clone)]
pub struct BlockedIssue {
    pub issue: Issue,
    pub blocked_by: Vec<String>,
}

impl<S: IssueStore> CommandExecutor<S> {
    /// Open or in-progress issues whose dependencies are all closed or missing.
    pub fn ready_issues(&self) -> Result<Vec<Issue>> {
        self.with_graph(|graph| Ok(graph.ready().into_iter().cloned().collect()))
    }

    /// Non-closed issues with at least one unfinished dependency.
    ///
    /// A stored status of `blocked` alone does not put an issue here.
    pub fn blocked_issues(&self) -> Result<Vec<BlockedIssue>> {
        self.with_graph(|graph| {
            Ok(graph
                .blocked()
                .into_iter()
                .map(|blocked| BlockedIssue {
                    issue: blocked.node.clone(),
                    blocked_by: blocked.blockers,
                })
                .collect())
        })
    }
}
