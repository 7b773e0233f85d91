//! Structural edits on an automation tree.
//!
//! Every operation takes the current definition by reference, applies the
//! change to a clone and returns the new definition. On error the caller's
//! copy is untouched and nothing needs to be rolled back.
//!
//! Addresses are `PathAddress` values produced by the tree index. A segment
//! with `branch_step_id` set is a branch entry drop zone: it names a position
//! before the first child of a branch rather than an existing node.

use autoflow_types::automation::{AutomationDefinition, Block, BlockInputs, BranchInputs};
use autoflow_types::error::TreeError;
use autoflow_types::path::{BlockPath, PathAddress};

use super::definitions::default_branch;
use super::tree::traverse;

/// Direction for `shift_branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Left,
    Right,
}

impl ShiftDirection {
    fn offset(self) -> isize {
        match self {
            ShiftDirection::Left => -1,
            ShiftDirection::Right => 1,
        }
    }
}

/// Result of `delete_block`.
#[derive(Debug, Clone)]
pub struct Deletion {
    /// Removed blocks in their original sequence order.
    pub removed: Vec<Block>,
    pub definition: AutomationDefinition,
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// The sequence a path's final segment lives in.
struct Slot<'a> {
    sequence: &'a mut Vec<Block>,
    /// Index of the addressed node in `sequence`. `None` for the trigger.
    index: Option<usize>,
}

fn last_segment(path: &[BlockPath]) -> Result<&BlockPath, TreeError> {
    path.last()
        .ok_or_else(|| TreeError::InvalidPath("empty path".to_string()))
}

fn is_trigger_address(path: &[BlockPath]) -> bool {
    path.len() == 1 && path[0].step_idx == 0 && !path[0].is_branch_entry()
}

/// Walk `path` down to the sequence holding its final segment.
fn locate<'a>(
    definition: &'a mut AutomationDefinition,
    path: &[BlockPath],
) -> Result<Slot<'a>, TreeError> {
    let (root, rest) = path
        .split_first()
        .ok_or_else(|| TreeError::InvalidPath("empty path".to_string()))?;
    if root.is_branch_entry() {
        return Err(TreeError::InvalidPath(
            "branch entry outside of a branch".to_string(),
        ));
    }

    let root_index = root.step_idx.checked_sub(1);
    if rest.is_empty() {
        return Ok(Slot {
            sequence: &mut definition.steps,
            index: root_index,
        });
    }

    let first = root_index
        .ok_or_else(|| TreeError::InvalidPath("the trigger has no children".to_string()))?;
    let mut node: &'a mut Block = definition
        .steps
        .get_mut(first)
        .ok_or_else(|| out_of_range(root.step_idx))?;

    for (pos, segment) in rest.iter().enumerate() {
        let branch_idx = segment.branch_idx.ok_or_else(|| {
            TreeError::InvalidPath("nested segment without branch index".to_string())
        })?;
        let current = node;
        let parent_id = current.id.clone();
        let inputs = current
            .branch_inputs_mut()
            .ok_or(TreeError::NotABranchStep(parent_id))?;
        let count = inputs.branches.len();
        let children = inputs
            .children_at_mut(branch_idx)
            .ok_or(TreeError::InvalidBranchIndex {
                index: branch_idx as isize,
                count,
            })?;

        if pos == rest.len() - 1 {
            return Ok(Slot {
                sequence: children,
                index: Some(segment.step_idx),
            });
        }
        node = children
            .get_mut(segment.step_idx)
            .ok_or_else(|| out_of_range(segment.step_idx))?;
    }

    Err(TreeError::InvalidPath("unterminated path".to_string()))
}

fn out_of_range(step_idx: usize) -> TreeError {
    TreeError::InvalidPath(format!("step index {step_idx} out of range"))
}

/// Where new blocks land relative to the addressed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    After,
    /// At the node's own index, pushing it back. Used for loop wrappers.
    Before,
}

fn splice(
    definition: &AutomationDefinition,
    blocks: Vec<Block>,
    path: &[BlockPath],
    placement: Placement,
) -> Result<AutomationDefinition, TreeError> {
    let segment = last_segment(path)?.clone();
    let mut next = definition.clone();
    let slot = locate(&mut next, path)?;

    let at = if segment.is_branch_entry() {
        segment.step_idx
    } else {
        match (slot.index, placement) {
            (None, Placement::After) => 0,
            (None, Placement::Before) => {
                return Err(TreeError::InvalidPath(
                    "nothing can be placed before the trigger".to_string(),
                ));
            }
            (Some(idx), _) if idx >= slot.sequence.len() => return Err(out_of_range(segment.step_idx)),
            (Some(idx), Placement::After) => idx + 1,
            (Some(idx), Placement::Before) => idx,
        }
    };
    if at > slot.sequence.len() {
        return Err(out_of_range(segment.step_idx));
    }

    slot.sequence.splice(at..at, blocks);
    Ok(next)
}

// ---------------------------------------------------------------------------
// Node operations
// ---------------------------------------------------------------------------

/// Insert `block` relative to the node at `path`.
///
/// Ordinary blocks land after the addressed node (after the trigger when the
/// address is the trigger). A loop wrapper lands at the node's own index so
/// it directly precedes the step it iterates. A branch entry address inserts
/// at its `step_idx` inside that branch.
pub fn insert_block(
    definition: &AutomationDefinition,
    block: Block,
    path: &[BlockPath],
) -> Result<AutomationDefinition, TreeError> {
    tracing::debug!(id = %block.id, depth = path.len(), "insert block");
    let placement = if block.is_loop_wrapper() {
        Placement::Before
    } else {
        Placement::After
    };
    splice(definition, vec![block], path, placement)
}

/// Replace the node at `path`. Addressing the trigger swaps the trigger.
pub fn replace_block(
    definition: &AutomationDefinition,
    block: Block,
    path: &[BlockPath],
) -> Result<AutomationDefinition, TreeError> {
    let mut next = definition.clone();
    if is_trigger_address(path) {
        next.trigger = Some(block);
        return Ok(next);
    }

    let segment = last_segment(path)?.clone();
    let slot = locate(&mut next, path)?;
    let target = slot
        .index
        .and_then(|idx| slot.sequence.get_mut(idx))
        .ok_or_else(|| out_of_range(segment.step_idx))?;
    *target = block;
    Ok(next)
}

/// Remove the node at `path` together with its loop pairing.
///
/// Deleting a looped step also removes its wrapper and deleting a wrapper
/// also removes the step it iterates. Both live in the same sequence.
pub fn delete_block(
    definition: &AutomationDefinition,
    path: &[BlockPath],
) -> Result<Deletion, TreeError> {
    if is_trigger_address(path) {
        return Err(TreeError::CannotRemoveTrigger);
    }

    let segment = last_segment(path)?.clone();
    let mut next = definition.clone();
    let slot = locate(&mut next, path)?;
    let idx = slot.index.ok_or(TreeError::CannotRemoveTrigger)?;
    let target = slot
        .sequence
        .get(idx)
        .ok_or_else(|| out_of_range(segment.step_idx))?;

    let target_id = target.id.clone();
    let paired_target = target.block_to_loop.clone();

    let mut removed = Vec::new();
    // Back to front so earlier indices stay valid.
    for i in (0..slot.sequence.len()).rev() {
        let candidate = &slot.sequence[i];
        let purge = candidate.id == target_id
            || candidate.block_to_loop.as_deref() == Some(target_id.as_str())
            || paired_target.as_deref() == Some(candidate.id.as_str());
        if purge {
            removed.push(slot.sequence.remove(i));
        }
    }
    removed.reverse();

    tracing::debug!(id = %target_id, removed = removed.len(), "delete block");
    Ok(Deletion {
        removed,
        definition: next,
    })
}

/// Move the node at `source` next to `dest`.
///
/// Returns `Ok(None)` when the move would not change anything: dropping a
/// node onto itself, or onto the entry of the branch it already heads.
///
/// The node (and its loop pairing) is removed first, the index is rebuilt
/// from the intermediate tree and the destination is re-resolved by id, so
/// stale indices in `dest` never shift the landing position.
pub fn move_block(
    definition: &AutomationDefinition,
    source: &[BlockPath],
    dest: &[BlockPath],
) -> Result<Option<AutomationDefinition>, TreeError> {
    let src = last_segment(source)?;
    let dst = last_segment(dest)?;

    if src.id.is_some() && src.id == dst.id {
        return Ok(None);
    }

    if let Some(branch_step_id) = dst.branch_step_id.as_deref() {
        let source_parent = source
            .len()
            .checked_sub(2)
            .and_then(|i| source[i].id.as_deref());
        if source_parent == Some(branch_step_id)
            && src.branch_idx == dst.branch_idx
            && src.step_idx == 0
        {
            return Ok(None);
        }
    }

    let Deletion {
        removed,
        definition: intermediate,
    } = delete_block(definition, source)?;
    let index = traverse(&intermediate);

    let final_path: PathAddress = match dst.branch_step_id.as_deref() {
        Some(branch_step_id) => {
            let mut path = index
                .get(branch_step_id)
                .ok_or_else(|| TreeError::BlockNotFound(branch_step_id.to_string()))?
                .path_to
                .clone();
            path.push(dst.clone());
            path
        }
        None => {
            let anchor = dst.id.as_deref().ok_or_else(|| {
                TreeError::InvalidPath("destination has no anchor id".to_string())
            })?;
            index
                .get(anchor)
                .ok_or_else(|| TreeError::BlockNotFound(anchor.to_string()))?
                .path_to
                .clone()
        }
    };

    tracing::debug!(moved = removed.len(), "move block");
    splice(&intermediate, removed, &final_path, Placement::After).map(Some)
}

// ---------------------------------------------------------------------------
// Branch operations
// ---------------------------------------------------------------------------

/// Branch at the position `path` addresses.
///
/// If the node there is already a branch step a new empty branch is appended
/// to it. Otherwise `branch_step` (a `BRANCH` block) is given two default
/// branches, the node at the position and every later sibling move into the
/// first branch, and the branch step takes their place. Addressing the
/// trigger wraps the whole root sequence.
pub fn create_branch(
    definition: &AutomationDefinition,
    path: &[BlockPath],
    mut branch_step: Block,
) -> Result<AutomationDefinition, TreeError> {
    let segment = last_segment(path)?.clone();
    let trigger_address = is_trigger_address(path);
    let mut next = definition.clone();
    let slot = locate(&mut next, path)?;

    let position = if segment.is_branch_entry() {
        segment.step_idx
    } else {
        slot.index.unwrap_or(0)
    };
    // Only a drop zone or the trigger may address the end of a sequence.
    let limit = if trigger_address || segment.is_branch_entry() {
        slot.sequence.len() + 1
    } else {
        slot.sequence.len()
    };
    if position >= limit {
        return Err(out_of_range(segment.step_idx));
    }

    if !trigger_address && !segment.is_branch_entry() {
        if let Some(existing) = slot.sequence.get_mut(position).filter(|b| b.is_branch()) {
            if existing.branch_inputs().is_none() {
                existing.inputs = BlockInputs::Branch(BranchInputs::default());
            }
            if let Some(inputs) = existing.branch_inputs_mut() {
                let branch = default_branch(format!("Branch {}", inputs.branches.len() + 1));
                inputs.children.insert(branch.id.clone(), Vec::new());
                inputs.branches.push(branch);
            }
            tracing::debug!(id = %existing.id, "append branch");
            return Ok(next);
        }
    }

    let moved: Vec<Block> = slot.sequence.drain(position..).collect();
    let first = default_branch("Branch 1");
    let second = default_branch("Branch 2");
    let mut inputs = BranchInputs::default();
    inputs.children.insert(first.id.clone(), moved);
    inputs.children.insert(second.id.clone(), Vec::new());
    inputs.branches = vec![first, second];
    branch_step.inputs = BlockInputs::Branch(inputs);

    tracing::debug!(id = %branch_step.id, position, "wrap sequence in branch step");
    slot.sequence.push(branch_step);
    Ok(next)
}

/// Resolve a branch address: the last segment's `branch_idx` picks the
/// branch and the preceding segments address the owning branch step.
fn locate_branch_step<'a>(
    definition: &'a mut AutomationDefinition,
    path: &[BlockPath],
) -> Result<(Slot<'a>, usize, usize), TreeError> {
    let (segment, parent) = path
        .split_last()
        .ok_or_else(|| TreeError::InvalidPath("empty path".to_string()))?;
    let branch_idx = segment
        .branch_idx
        .ok_or_else(|| TreeError::InvalidPath("branch address without branch index".to_string()))?;
    if parent.is_empty() {
        return Err(TreeError::InvalidPath(
            "branch address without owning step".to_string(),
        ));
    }

    let slot = locate(definition, parent)?;
    let idx = slot
        .index
        .ok_or_else(|| TreeError::NotABranchStep("trigger".to_string()))?;
    let step = slot
        .sequence
        .get(idx)
        .ok_or_else(|| out_of_range(idx))?;
    let count = step
        .branch_inputs()
        .ok_or_else(|| TreeError::NotABranchStep(step.id.clone()))?
        .branches
        .len();
    if branch_idx >= count {
        return Err(TreeError::InvalidBranchIndex {
            index: branch_idx as isize,
            count,
        });
    }
    Ok((slot, idx, branch_idx))
}

/// Delete one branch with its children.
///
/// A branch step left with a single branch dissolves: the surviving branch's
/// children take the branch step's place in the parent sequence.
pub fn delete_branch(
    definition: &AutomationDefinition,
    path: &[BlockPath],
) -> Result<AutomationDefinition, TreeError> {
    let mut next = definition.clone();
    let (slot, idx, branch_idx) = locate_branch_step(&mut next, path)?;

    let step = &mut slot.sequence[idx];
    let step_id = step.id.clone();
    let inputs = step
        .branch_inputs_mut()
        .ok_or(TreeError::NotABranchStep(step_id))?;
    let removed = inputs.branches.remove(branch_idx);
    inputs.children.remove(&removed.id);

    if inputs.branches.len() < 2 {
        let survivors = match inputs.branches.first() {
            Some(branch) => inputs.children.remove(&branch.id).unwrap_or_default(),
            None => Vec::new(),
        };
        tracing::debug!(survivors = survivors.len(), "dissolve branch step");
        slot.sequence.splice(idx..=idx, survivors);
    }

    Ok(next)
}

/// Swap a branch with its left or right neighbour.
pub fn shift_branch(
    definition: &AutomationDefinition,
    path: &[BlockPath],
    direction: ShiftDirection,
) -> Result<AutomationDefinition, TreeError> {
    let mut next = definition.clone();
    let (slot, idx, branch_idx) = locate_branch_step(&mut next, path)?;

    let step = &mut slot.sequence[idx];
    let step_id = step.id.clone();
    let inputs = step
        .branch_inputs_mut()
        .ok_or(TreeError::NotABranchStep(step_id))?;
    let count = inputs.branches.len();
    let neighbour = branch_idx as isize + direction.offset();
    if neighbour < 0 || neighbour as usize >= count {
        return Err(TreeError::InvalidBranchIndex {
            index: neighbour,
            count,
        });
    }

    inputs.branches.swap(branch_idx, neighbour as usize);
    Ok(next)
}

// ---------------------------------------------------------------------------
// Step names
// ---------------------------------------------------------------------------

/// Assign a display name. A blank name clears it instead.
pub fn rename_step(definition: &AutomationDefinition, id: &str, name: &str) -> AutomationDefinition {
    let name = name.trim();
    if name.is_empty() {
        return clear_step_name(definition, id);
    }
    let mut next = definition.clone();
    next.step_names.insert(id.to_string(), name.to_string());
    next
}

pub fn clear_step_name(definition: &AutomationDefinition, id: &str) -> AutomationDefinition {
    let mut next = definition.clone();
    next.step_names.remove(id);
    next
}
