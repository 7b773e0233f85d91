//! Flat addressing for the automation tree.
//!
//! A `PathAddress` is an ordered walk from the root to a node. The root
//! sequence is `[trigger, ...steps]`, so the first segment's `step_idx` is the
//! array index in `steps` plus one (`0` addresses the trigger). Every later
//! segment carries a `branch_idx` and indexes into that branch's children.

use serde::{Deserialize, Serialize};

/// One segment of a `PathAddress`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPath {
    pub step_idx: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_idx: Option<usize>,
    /// Id of the node at this position, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Set on branch entry drop zones: the branch step owning the branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_step_id: Option<String>,
}

impl BlockPath {
    /// A segment in the root sequence (trigger-offset index).
    pub fn root(step_idx: usize) -> Self {
        Self {
            step_idx,
            branch_idx: None,
            id: None,
            branch_step_id: None,
        }
    }

    /// A segment inside the branch at `branch_idx` of the previous segment.
    pub fn branch(branch_idx: usize, step_idx: usize) -> Self {
        Self {
            step_idx,
            branch_idx: Some(branch_idx),
            id: None,
            branch_step_id: None,
        }
    }

    /// The drop zone before the first child of a branch.
    pub fn branch_entry(branch_step_id: impl Into<String>, branch_idx: usize) -> Self {
        Self {
            step_idx: 0,
            branch_idx: Some(branch_idx),
            id: None,
            branch_step_id: Some(branch_step_id.into()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_branch_entry(&self) -> bool {
        self.branch_step_id.is_some()
    }
}

/// Ordered walk from the root to a node.
pub type PathAddress = Vec<BlockPath>;

/// Tree index entry for a single block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    pub path_to: PathAddress,
    /// Last node of its own sequence with no branches to descend into.
    pub terminating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_to_loop: Option<String>,
}

impl BlockRef {
    /// Id of the referenced block (the final segment's id).
    pub fn id(&self) -> Option<&str> {
        self.path_to.last()?.id.as_deref()
    }

    /// Nesting depth: 1 for root-sequence nodes.
    pub fn depth(&self) -> usize {
        self.path_to.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_wire_format() {
        let path = vec![
            BlockPath::root(2).with_id("branch"),
            BlockPath::branch(1, 0).with_id("child"),
        ];
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "stepIdx": 2, "id": "branch" },
                { "stepIdx": 0, "branchIdx": 1, "id": "child" }
            ])
        );
    }

    #[test]
    fn test_branch_entry_segment() {
        let seg = BlockPath::branch_entry("br", 1);
        assert!(seg.is_branch_entry());
        assert_eq!(seg.branch_idx, Some(1));
        assert_eq!(seg.step_idx, 0);
        assert!(!BlockPath::root(0).is_branch_entry());
    }

    #[test]
    fn test_block_ref_id_and_depth() {
        let block_ref = BlockRef {
            path_to: vec![BlockPath::root(1).with_id("a"), BlockPath::branch(0, 3).with_id("b")],
            terminating: true,
            block_to_loop: None,
        };
        assert_eq!(block_ref.id(), Some("b"));
        assert_eq!(block_ref.depth(), 2);
    }
}
