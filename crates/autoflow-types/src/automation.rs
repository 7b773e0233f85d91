//! Automation document types.
//!
//! An `Automation` owns an `AutomationDefinition`: a single trigger followed by
//! an ordered sequence of steps. Branch steps carry nested child sequences
//! keyed by branch id, and loop wrappers reference the step they iterate via
//! `block_to_loop`. The tree is stored exactly as it is persisted; all derived
//! metadata (paths, loop relations) lives in the core crate's tree index.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Generate a fresh block, branch, or automation id.
///
/// UUIDv7 in simple (hyphen-free) form so ids stay time-sortable and safe to
/// embed in binding expressions such as `steps.<id>.<field>`.
pub fn generate_id() -> String {
    Uuid::now_v7().simple().to_string()
}

// ---------------------------------------------------------------------------
// Automation document
// ---------------------------------------------------------------------------

/// A persisted workflow definition plus its editor metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    /// Assigned by the repository on first save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optimistic concurrency token, bumped on every update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub name: String,
    pub definition: AutomationDefinition,
    /// Sample trigger payload used when testing from the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<Value>,
    #[serde(default)]
    pub disabled: bool,
}

impl Automation {
    /// A new, unsaved automation with the given trigger and no steps.
    pub fn new(name: impl Into<String>, trigger: Block) -> Self {
        Self {
            id: None,
            revision: None,
            name: name.into(),
            definition: AutomationDefinition {
                trigger: Some(trigger),
                steps: Vec::new(),
                step_names: BTreeMap::new(),
            },
            test_data: None,
            disabled: false,
        }
    }

    /// True when the document has both an id and a revision.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some() && self.revision.is_some()
    }
}

/// The trigger + step tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Block>,
    #[serde(default)]
    pub steps: Vec<Block>,
    /// User-assigned display names keyed by block id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_names: BTreeMap<String, String>,
}

impl AutomationDefinition {
    /// Display name for a block: the user-assigned name, else the block's own.
    pub fn display_name<'a>(&'a self, block: &'a Block) -> Option<&'a str> {
        self.step_names
            .get(&block.id)
            .map(String::as_str)
            .or(block.name.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Whether a block is the automation's trigger or an action step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Trigger,
    Action,
}

/// Trigger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStepId {
    App,
    RowSaved,
    RowUpdated,
    RowDeleted,
    RowAction,
    Webhook,
    Cron,
}

impl TriggerStepId {
    /// Row triggers expose the changed row under `trigger.row`.
    pub fn is_row_trigger(self) -> bool {
        matches!(
            self,
            Self::RowSaved | Self::RowUpdated | Self::RowDeleted | Self::RowAction
        )
    }

    /// Row triggers whose bindings are synthesized from the live table schema
    /// and which support a trigger-side row filter.
    pub fn is_filterable_row_trigger(self) -> bool {
        matches!(self, Self::RowSaved | Self::RowUpdated)
    }
}

/// Action step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStepId {
    Branch,
    Loop,
    ExecuteScript,
    CreateRow,
    UpdateRow,
    DeleteRow,
    QueryRows,
    ServerLog,
    Delay,
    Filter,
    Collect,
    OutgoingWebhook,
    SendEmailSmtp,
    ExecuteQuery,
}

/// The kind of a block: one of the trigger or action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    Trigger(TriggerStepId),
    Action(ActionStepId),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        match value {
            Value::String(s) => f.write_str(&s),
            _ => Err(fmt::Error),
        }
    }
}

/// A trigger or step node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Unique across the whole tree; generated once, never reused.
    pub id: String,
    pub step_id: StepId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub inputs: BlockInputs,
    #[serde(default)]
    pub schema: BlockSchema,
    /// Set on loop wrappers: the id of the step being iterated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_to_loop: Option<String>,
}

impl Block {
    /// Build a trigger block with a fresh id.
    pub fn trigger(kind: TriggerStepId) -> Self {
        Self::with_kind(StepId::Trigger(kind), BlockType::Trigger)
    }

    /// Build an action block with a fresh id.
    pub fn action(kind: ActionStepId) -> Self {
        Self::with_kind(StepId::Action(kind), BlockType::Action)
    }

    fn with_kind(step_id: StepId, block_type: BlockType) -> Self {
        Self {
            id: generate_id(),
            step_id,
            block_type,
            name: None,
            icon: None,
            inputs: BlockInputs::default(),
            schema: BlockSchema::default(),
            block_to_loop: None,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.block_type == BlockType::Trigger
    }

    pub fn trigger_kind(&self) -> Option<TriggerStepId> {
        match self.step_id {
            StepId::Trigger(kind) if self.is_trigger() => Some(kind),
            _ => None,
        }
    }

    pub fn action_kind(&self) -> Option<ActionStepId> {
        match self.step_id {
            StepId::Action(kind) => Some(kind),
            StepId::Trigger(_) => None,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.action_kind() == Some(ActionStepId::Branch)
    }

    /// A loop wrapper is a `LOOP` step that references the block it iterates.
    pub fn is_loop_wrapper(&self) -> bool {
        self.block_to_loop.is_some() && self.action_kind() == Some(ActionStepId::Loop)
    }

    pub fn branch_inputs(&self) -> Option<&BranchInputs> {
        match &self.inputs {
            BlockInputs::Branch(inputs) => Some(inputs),
            BlockInputs::Fields(_) => None,
        }
    }

    pub fn branch_inputs_mut(&mut self) -> Option<&mut BranchInputs> {
        match &mut self.inputs {
            BlockInputs::Branch(inputs) => Some(inputs),
            BlockInputs::Fields(_) => None,
        }
    }

    /// Plain input fields. Branch steps have none.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match &self.inputs {
            BlockInputs::Fields(fields) => Some(fields),
            BlockInputs::Branch(_) => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match &mut self.inputs {
            BlockInputs::Fields(fields) => Some(fields),
            BlockInputs::Branch(_) => None,
        }
    }

    /// Read a string input field (e.g. `tableId`).
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.fields()?.get(key)?.as_str()
    }
}

/// Block inputs: either branch structure or free-form fields.
///
/// Branch inputs are tried first so a persisted `{branches, children}` object
/// is always read back as structure rather than opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockInputs {
    Branch(BranchInputs),
    Fields(Map<String, Value>),
}

impl Default for BlockInputs {
    fn default() -> Self {
        BlockInputs::Fields(Map::new())
    }
}

/// Inputs of a `BRANCH` step.
///
/// Invariant: `children` has exactly one entry per branch id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchInputs {
    pub branches: Vec<Branch>,
    pub children: BTreeMap<String, Vec<Block>>,
}

impl BranchInputs {
    /// Child sequence of the branch at `branch_idx`.
    pub fn children_at(&self, branch_idx: usize) -> Option<&Vec<Block>> {
        let branch = self.branches.get(branch_idx)?;
        self.children.get(&branch.id)
    }

    pub fn children_at_mut(&mut self, branch_idx: usize) -> Option<&mut Vec<Block>> {
        let branch = self.branches.get(branch_idx)?;
        self.children.get_mut(&branch.id)
    }
}

/// A named conditional branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    /// Compiled filter evaluated by the runtime.
    #[serde(default)]
    pub condition: Value,
    /// Editor representation of `condition`.
    #[serde(default, rename = "conditionUI", skip_serializing_if = "Option::is_none")]
    pub condition_ui: Option<Value>,
}

// ---------------------------------------------------------------------------
// IO schema
// ---------------------------------------------------------------------------

/// Input and output schema of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub inputs: IoSchema,
    #[serde(default)]
    pub outputs: IoSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, IoProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// A single schema property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoProperty {
    #[serde(rename = "type")]
    pub io_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl IoProperty {
    pub fn new(io_type: impl Into<String>) -> Self {
        Self {
            io_type: io_type.into(),
            subtype: None,
            custom_type: None,
            description: None,
            title: None,
            enum_values: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_custom_type(mut self, custom_type: impl Into<String>) -> Self {
        self.custom_type = Some(custom_type.into());
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_id_wire_names() {
        let id: StepId = serde_json::from_value(json!("ROW_SAVED")).unwrap();
        assert_eq!(id, StepId::Trigger(TriggerStepId::RowSaved));

        let id: StepId = serde_json::from_value(json!("EXECUTE_SCRIPT")).unwrap();
        assert_eq!(id, StepId::Action(ActionStepId::ExecuteScript));
        assert_eq!(id.to_string(), "EXECUTE_SCRIPT");

        assert!(serde_json::from_value::<StepId>(json!("NOT_A_STEP")).is_err());
    }

    #[test]
    fn test_branch_inputs_parse_as_structure() {
        let block: Block = serde_json::from_value(json!({
            "id": "b1",
            "stepId": "BRANCH",
            "type": "ACTION",
            "inputs": {
                "branches": [
                    { "id": "x", "name": "Branch 1", "condition": {} },
                    { "id": "y", "name": "Branch 2", "condition": {} }
                ],
                "children": {
                    "x": [{ "id": "s1", "stepId": "SERVER_LOG", "type": "ACTION" }],
                    "y": []
                }
            }
        }))
        .unwrap();

        let inputs = block.branch_inputs().expect("branch inputs");
        assert_eq!(inputs.branches.len(), 2);
        assert_eq!(inputs.children_at(0).unwrap()[0].id, "s1");
        assert!(inputs.children_at(1).unwrap().is_empty());
        assert!(inputs.children_at(2).is_none());
    }

    #[test]
    fn test_plain_inputs_parse_as_fields() {
        let block: Block = serde_json::from_value(json!({
            "id": "t",
            "stepId": "ROW_SAVED",
            "type": "TRIGGER",
            "inputs": { "tableId": "ta_people" }
        }))
        .unwrap();

        assert_eq!(block.trigger_kind(), Some(TriggerStepId::RowSaved));
        assert_eq!(block.input_str("tableId"), Some("ta_people"));
        assert!(block.branch_inputs().is_none());
    }

    #[test]
    fn test_loop_wrapper_detection() {
        let mut looper = Block::action(ActionStepId::Loop);
        assert!(!looper.is_loop_wrapper());
        looper.block_to_loop = Some("target".to_string());
        assert!(looper.is_loop_wrapper());

        let mut other = Block::action(ActionStepId::ServerLog);
        other.block_to_loop = Some("target".to_string());
        assert!(!other.is_loop_wrapper());
    }

    #[test]
    fn test_display_name_prefers_step_names() {
        let mut block = Block::action(ActionStepId::CreateRow);
        block.name = Some("Create Row".to_string());
        let mut def = AutomationDefinition::default();
        assert_eq!(def.display_name(&block), Some("Create Row"));

        def.step_names.insert(block.id.clone(), "Add person".to_string());
        assert_eq!(def.display_name(&block), Some("Add person"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(!a.contains('-'));
    }
}
