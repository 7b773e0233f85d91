//! Execution result shapes returned by the execution collaborator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::automation::StepId;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Success,
    Error,
    Stopped,
    StoppedError,
    #[serde(rename = "No condition met")]
    NoConditionMet,
}

/// Response of a trigger or test call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestAutomationResponse {
    Results(AutomationResults),
    /// A trigger-side filter rejected the input.
    DidNotTrigger(DidNotTriggerResponse),
}

impl TestAutomationResponse {
    pub fn results(&self) -> Option<&AutomationResults> {
        match self {
            Self::Results(results) => Some(results),
            Self::DidNotTrigger(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AutomationStatus>,
    pub trigger: BlockResult,
    pub steps: Vec<BlockResult>,
}

/// Outputs of a single trigger or step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub step_id: StepId,
    #[serde(default)]
    pub outputs: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidNotTriggerResponse {
    pub message: String,
    #[serde(default)]
    pub outputs: Value,
}
