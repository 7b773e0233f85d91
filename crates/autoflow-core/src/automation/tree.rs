//! Path resolution and the derived tree index.
//!
//! The automation document is a recursive tree (root sequence plus nested
//! branch sequences). `TreeIndex` is its flat view: every block id maps to the
//! `PathAddress` that reaches it. The index is a disposable cache rebuilt by
//! `traverse` after every mutation and is never persisted.

use std::collections::HashMap;

use autoflow_types::automation::{AutomationDefinition, Block};
use autoflow_types::error::TreeError;
use autoflow_types::path::{BlockPath, BlockRef};

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// All blocks encountered while walking `path` from the root, inclusive of
/// the target.
///
/// The root segment contributes `[trigger, ...steps][0..=step_idx]` and each
/// branch segment contributes `children[0..=step_idx]` of the selected branch,
/// so dropping the last element yields every block that precedes the target
/// on its own path.
pub fn resolve_path<'a>(
    path: &[BlockPath],
    definition: &'a AutomationDefinition,
) -> Result<Vec<&'a Block>, TreeError> {
    let (root, rest) = path
        .split_first()
        .ok_or_else(|| TreeError::InvalidPath("empty path".to_string()))?;
    let trigger = definition.trigger.as_ref().ok_or(TreeError::MissingTrigger)?;

    if root.step_idx > definition.steps.len() {
        return Err(TreeError::InvalidPath(format!(
            "root index {} out of range",
            root.step_idx
        )));
    }

    let mut blocks = Vec::with_capacity(root.step_idx + 1);
    blocks.push(trigger);
    blocks.extend(definition.steps.iter().take(root.step_idx));

    for segment in rest {
        let branch_idx = segment
            .branch_idx
            .ok_or_else(|| TreeError::InvalidPath("nested segment without branch index".to_string()))?;
        let parent = blocks[blocks.len() - 1];
        let inputs = parent
            .branch_inputs()
            .ok_or_else(|| TreeError::NotABranchStep(parent.id.clone()))?;
        let children = inputs
            .children_at(branch_idx)
            .ok_or(TreeError::InvalidBranchIndex {
                index: branch_idx as isize,
                count: inputs.branches.len(),
            })?;
        if segment.step_idx >= children.len() {
            return Err(TreeError::InvalidPath(format!(
                "step index {} out of range in branch {branch_idx} of '{}'",
                segment.step_idx, parent.id
            )));
        }
        blocks.extend(children.iter().take(segment.step_idx + 1));
    }

    Ok(blocks)
}

/// The block addressed by `path`.
pub fn block_at<'a>(
    path: &[BlockPath],
    definition: &'a AutomationDefinition,
) -> Result<&'a Block, TreeError> {
    resolve_path(path, definition)?
        .pop()
        .ok_or_else(|| TreeError::InvalidPath("empty path".to_string()))
}

/// Every block in the tree in depth-first order, trigger first.
pub fn all_blocks(definition: &AutomationDefinition) -> Vec<&Block> {
    fn collect<'a>(block: &'a Block, out: &mut Vec<&'a Block>) {
        out.push(block);
        if let Some(inputs) = block.branch_inputs() {
            for branch in &inputs.branches {
                for child in inputs.children.get(&branch.id).into_iter().flatten() {
                    collect(child, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    for block in definition.trigger.iter().chain(definition.steps.iter()) {
        collect(block, &mut out);
    }
    out
}

// ---------------------------------------------------------------------------
// Tree index
// ---------------------------------------------------------------------------

/// Flat index over an automation tree: block id -> `BlockRef`.
///
/// Also owns the loop adjacency (`looped step id -> loop wrapper id`), so the
/// document itself only ever stores the one-directional `block_to_loop`.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    refs: HashMap<String, BlockRef>,
    loop_wrapper_by_target: HashMap<String, String>,
}

impl TreeIndex {
    /// Recompute the index for a changed definition.
    pub fn on_definition_changed(&mut self, definition: &AutomationDefinition) {
        *self = traverse(definition);
    }

    pub fn get(&self, id: &str) -> Option<&BlockRef> {
        self.refs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.refs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    /// Blocks that end their own sequence.
    pub fn terminating(&self) -> impl Iterator<Item = (&str, &BlockRef)> {
        self.refs
            .iter()
            .filter(|(_, r)| r.terminating)
            .map(|(id, r)| (id.as_str(), r))
    }

    /// Loop wrapper iterating `target_id`, if any.
    pub fn looped_by(&self, target_id: &str) -> Option<&str> {
        self.loop_wrapper_by_target.get(target_id).map(String::as_str)
    }

    /// Step iterated by the loop wrapper `wrapper_id`.
    pub fn loop_target(&self, wrapper_id: &str) -> Option<&str> {
        self.refs.get(wrapper_id)?.block_to_loop.as_deref()
    }

    /// The loop wrapper whose scope contains `block_ref`: the block itself or
    /// one of its ancestors is a looped step.
    pub fn enclosing_loop(&self, block_ref: &BlockRef) -> Option<&str> {
        block_ref
            .path_to
            .iter()
            .rev()
            .filter_map(|segment| segment.id.as_deref())
            .find_map(|id| self.looped_by(id))
    }

    fn register(&mut self, block: &Block, path_to: Vec<BlockPath>, terminating: bool) {
        if self.refs.contains_key(&block.id) {
            tracing::warn!(id = %block.id, "duplicate block id in automation tree");
        }
        self.refs.insert(
            block.id.clone(),
            BlockRef {
                path_to,
                terminating,
                block_to_loop: block.block_to_loop.clone(),
            },
        );
        if let Some(target) = &block.block_to_loop {
            self.loop_wrapper_by_target
                .insert(target.clone(), block.id.clone());
        }
    }
}

/// Build the tree index with a depth-first walk.
///
/// A block is terminating when it is the last of its own sequence and, for a
/// branch step, has no branches to descend into.
pub fn traverse(definition: &AutomationDefinition) -> TreeIndex {
    let mut index = TreeIndex::default();

    let root: Vec<&Block> = definition
        .trigger
        .iter()
        .chain(definition.steps.iter())
        .collect();
    // Root addresses are trigger-offset even when the trigger is missing.
    let offset = usize::from(definition.trigger.is_none());
    let last = root.len().saturating_sub(1);

    for (idx, block) in root.into_iter().enumerate() {
        visit(&mut index, block, &[], idx + offset, None, idx == last);
    }

    index
}

fn visit(
    index: &mut TreeIndex,
    block: &Block,
    parent_path: &[BlockPath],
    step_idx: usize,
    branch_idx: Option<usize>,
    last_in_sequence: bool,
) {
    let mut path_to = parent_path.to_vec();
    path_to.push(BlockPath {
        step_idx,
        branch_idx,
        id: Some(block.id.clone()),
        branch_step_id: None,
    });

    let mut terminating = last_in_sequence;
    if let Some(inputs) = block.branch_inputs() {
        for (b_idx, branch) in inputs.branches.iter().enumerate() {
            let children = inputs.children.get(&branch.id).map(Vec::as_slice).unwrap_or(&[]);
            let last = children.len().saturating_sub(1);
            for (s_idx, child) in children.iter().enumerate() {
                visit(index, child, &path_to, s_idx, Some(b_idx), s_idx == last);
            }
        }
        terminating = terminating && inputs.branches.is_empty();
    }

    index.register(block, path_to, terminating);
}
