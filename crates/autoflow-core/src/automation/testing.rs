//! Tree builders shared by the automation unit tests.

use std::collections::BTreeMap;

use autoflow_types::automation::{
    ActionStepId, AutomationDefinition, Block, BlockInputs, BlockType, Branch, BranchInputs,
    StepId, TriggerStepId,
};

pub fn trigger() -> Block {
    let mut block = Block::trigger(TriggerStepId::App);
    block.id = "trigger".to_string();
    block
}

pub fn step(id: &str) -> Block {
    let mut block = Block::action(ActionStepId::ServerLog);
    block.id = id.to_string();
    block
}

/// A branch step named `id` with branches `<id>-b0`, `<id>-b1`, ...
pub fn branch_step(id: &str, children: Vec<Vec<Block>>) -> Block {
    let mut branches = Vec::new();
    let mut by_id = BTreeMap::new();
    for (idx, seq) in children.into_iter().enumerate() {
        let branch_id = format!("{id}-b{idx}");
        branches.push(Branch {
            id: branch_id.clone(),
            name: format!("Branch {}", idx + 1),
            condition: serde_json::json!({}),
            condition_ui: None,
        });
        by_id.insert(branch_id, seq);
    }

    Block {
        id: id.to_string(),
        step_id: StepId::Action(ActionStepId::Branch),
        block_type: BlockType::Action,
        name: Some("Branch".to_string()),
        icon: None,
        inputs: BlockInputs::Branch(BranchInputs {
            branches,
            children: by_id,
        }),
        schema: Default::default(),
        block_to_loop: None,
    }
}

pub fn loop_wrapper(id: &str, target: &str) -> Block {
    let mut block = Block::action(ActionStepId::Loop);
    block.id = id.to_string();
    block.block_to_loop = Some(target.to_string());
    block
}

pub fn definition(steps: Vec<Block>) -> AutomationDefinition {
    AutomationDefinition {
        trigger: Some(trigger()),
        steps,
        step_names: BTreeMap::new(),
    }
}

/// Ids of a block sequence, in order.
pub fn ids(blocks: &[Block]) -> Vec<&str> {
    blocks.iter().map(|b| b.id.as_str()).collect()
}

/// Child ids of branch `branch_idx` of the branch step `block`.
pub fn child_ids(block: &Block, branch_idx: usize) -> Vec<&str> {
    block
        .branch_inputs()
        .and_then(|inputs| inputs.children_at(branch_idx))
        .map(|children| ids(children))
        .unwrap_or_default()
}
