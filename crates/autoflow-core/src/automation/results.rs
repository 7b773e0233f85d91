//! Test result lookup and the binding evaluation context.

use serde::Serialize;
use serde_json::{Map, Value, json};

use autoflow_types::automation::{Automation, Block, TriggerStepId};
use autoflow_types::results::{BlockResult, DidNotTriggerResponse, TestAutomationResponse};
use autoflow_types::table::Table;

/// What a test run produced for one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockTestResult {
    /// The trigger-side row filter rejected the test input.
    DidNotTrigger(DidNotTriggerResponse),
    Step(BlockResult),
}

/// Find the result of `block` in a test response.
///
/// Filterable row triggers report a rejected input as the did-not-trigger
/// response itself. Otherwise results match on block id, or on step kind for
/// a block without one.
pub fn process_block_results(
    response: &TestAutomationResponse,
    block: &Block,
) -> Option<BlockTestResult> {
    let results = match response {
        TestAutomationResponse::DidNotTrigger(rejected) => {
            return block
                .trigger_kind()
                .filter(|kind| kind.is_filterable_row_trigger())
                .map(|_| BlockTestResult::DidNotTrigger(rejected.clone()));
        }
        TestAutomationResponse::Results(results) => results,
    };

    let matches = |result: &&BlockResult| {
        if block.id.is_empty() {
            result.step_id == block.step_id
        } else {
            result.id.as_deref() == Some(block.id.as_str())
        }
    };

    results
        .steps
        .iter()
        .find(matches)
        .or_else(|| Some(&results.trigger).filter(matches))
        .cloned()
        .map(BlockTestResult::Step)
}

/// The `{trigger, steps}` context bindings are evaluated against.
///
/// Trigger data comes from the last test run when there is one, else from the
/// automation's stored test data.
pub fn evaluation_context(
    automation: &Automation,
    response: Option<&TestAutomationResponse>,
    tables: &[Table],
) -> Value {
    let trigger = automation.definition.trigger.as_ref();
    let results = response.and_then(TestAutomationResponse::results);

    let trigger_data = match results {
        Some(results) => {
            let mut outputs = results.trigger.outputs.clone();
            if let Value::Object(map) = &mut outputs {
                match trigger.and_then(Block::trigger_kind) {
                    Some(TriggerStepId::RowAction) => {
                        // Test results never carry the table.
                        let table = trigger
                            .and_then(|t| t.input_str("tableId"))
                            .and_then(|id| tables.iter().find(|t| t.id == id));
                        if let Some(table) = table.and_then(|t| serde_json::to_value(t).ok()) {
                            map.insert("table".to_string(), table);
                        }
                    }
                    Some(TriggerStepId::Webhook) => {
                        map.entry("body").or_insert_with(|| json!({}));
                    }
                    _ => {}
                }
                map.remove("meta");
            }
            Some(outputs).filter(|o| !o.is_null())
        }
        None => automation.test_data.clone(),
    };

    let steps: Map<String, Value> = results
        .map(|r| {
            r.steps
                .iter()
                .filter_map(|s| Some((s.id.clone()?, s.outputs.clone())))
                .collect()
        })
        .unwrap_or_default();

    let mut context = Map::new();
    if let Some(trigger_data) = trigger_data {
        context.insert("trigger".to_string(), trigger_data);
    }
    context.insert("steps".to_string(), Value::Object(steps));
    Value::Object(context)
}
