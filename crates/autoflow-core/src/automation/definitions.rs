//! Built-in block catalogue and block construction.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value, json};

use autoflow_types::automation::{
    ActionStepId, AutomationDefinition, Block, BlockInputs, BlockSchema, BlockType, Branch,
    IoProperty, IoSchema, StepId, TriggerStepId, generate_id,
};

use super::tree::all_blocks;

/// Template a block is constructed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDefinition {
    pub step_id: StepId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub name: String,
    pub icon: String,
    pub description: String,
    /// Default input values.
    pub inputs: Map<String, Value>,
    pub schema: BlockSchema,
    pub deprecated: bool,
}

/// Catalogue of trigger and action templates.
#[derive(Debug, Clone)]
pub struct BlockDefinitions {
    definitions: Vec<BlockDefinition>,
}

impl Default for BlockDefinitions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BlockDefinitions {
    pub fn new(definitions: Vec<BlockDefinition>) -> Self {
        Self { definitions }
    }

    /// The built-in catalogue.
    pub fn builtin() -> Self {
        Self::new(builtin_definitions())
    }

    pub fn get(&self, step_id: StepId) -> Option<&BlockDefinition> {
        self.definitions.iter().find(|d| d.step_id == step_id)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.block_type == BlockType::Trigger)
    }

    pub fn actions(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.block_type == BlockType::Action)
    }

    /// Triggers a user may pick for a new automation. Row actions are created
    /// from the table side, so they are never offered here.
    pub fn creatable_triggers(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.triggers().filter(|d| {
            !d.deprecated && d.step_id != StepId::Trigger(TriggerStepId::RowAction)
        })
    }

    /// A fresh block of kind `step_id`, named uniquely within `existing`.
    pub fn construct_block(
        &self,
        step_id: StepId,
        existing: Option<&AutomationDefinition>,
    ) -> Option<Block> {
        let definition = self.get(step_id)?;
        let mut inputs = definition.inputs.clone();
        set_default_enum_values(&mut inputs, &definition.schema.inputs.properties);

        Some(Block {
            id: generate_id(),
            step_id,
            block_type: definition.block_type,
            name: Some(new_step_name(existing, &definition.name)),
            icon: Some(definition.icon.clone()),
            inputs: BlockInputs::Fields(inputs),
            schema: definition.schema.clone(),
            block_to_loop: None,
        })
    }

    /// An empty `BRANCH` step; the editor fills in its branches.
    pub fn generate_branch_block(&self, existing: Option<&AutomationDefinition>) -> Option<Block> {
        self.construct_block(StepId::Action(ActionStepId::Branch), existing)
    }

    /// A `LOOP` wrapper iterating `target_id`.
    pub fn generate_loop_block(
        &self,
        target_id: &str,
        existing: Option<&AutomationDefinition>,
    ) -> Option<Block> {
        let mut block = self.construct_block(StepId::Action(ActionStepId::Loop), existing)?;
        block.block_to_loop = Some(target_id.to_string());
        Some(block)
    }
}

/// A fresh branch with an empty condition.
pub fn default_branch(name: impl Into<String>) -> Branch {
    Branch {
        id: generate_id(),
        name: name.into(),
        condition: json!({ "onEmptyFilter": "none" }),
        condition_ui: Some(json!({
            "logicalOperator": "all",
            "onEmptyFilter": "none",
            "groups": [],
        })),
    }
}

/// Default every unset enum input to its first option.
pub fn set_default_enum_values(
    inputs: &mut Map<String, Value>,
    properties: &BTreeMap<String, IoProperty>,
) {
    for (key, property) in properties {
        let Some(first) = property.enum_values.as_ref().and_then(|v| v.first()) else {
            continue;
        };
        let unset = inputs.get(key).is_none_or(|v| v.is_null());
        if unset {
            inputs.insert(key.clone(), Value::String(first.clone()));
        }
    }
}

/// `base`, or `base N` with the smallest `N >= 2` not already in use.
pub fn new_step_name(existing: Option<&AutomationDefinition>, base: &str) -> String {
    let taken: HashSet<&str> = existing
        .map(|def| {
            all_blocks(def)
                .into_iter()
                .filter_map(|b| b.name.as_deref())
                .chain(def.step_names.values().map(String::as_str))
                .collect()
        })
        .unwrap_or_default();

    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base} {n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

// ---------------------------------------------------------------------------
// Built-in catalogue
// ---------------------------------------------------------------------------

fn props(entries: &[(&str, IoProperty)]) -> IoSchema {
    IoSchema {
        properties: entries
            .iter()
            .map(|(name, p)| (name.to_string(), p.clone()))
            .collect(),
        required: Vec::new(),
    }
}

fn string(description: &str) -> IoProperty {
    IoProperty::new("string").with_description(description)
}

fn object(description: &str) -> IoProperty {
    IoProperty::new("object").with_description(description)
}

fn boolean(description: &str) -> IoProperty {
    IoProperty::new("boolean").with_description(description)
}

fn number(description: &str) -> IoProperty {
    IoProperty::new("number").with_description(description)
}

fn success() -> (&'static str, IoProperty) {
    ("success", boolean("Whether the action was successful"))
}

struct Entry {
    step_id: StepId,
    name: &'static str,
    icon: &'static str,
    description: &'static str,
    inputs: IoSchema,
    outputs: IoSchema,
    defaults: Value,
}

impl Entry {
    fn build(self) -> BlockDefinition {
        let block_type = match self.step_id {
            StepId::Trigger(_) => BlockType::Trigger,
            StepId::Action(_) => BlockType::Action,
        };
        BlockDefinition {
            step_id: self.step_id,
            block_type,
            name: self.name.to_string(),
            icon: self.icon.to_string(),
            description: self.description.to_string(),
            inputs: match self.defaults {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            schema: BlockSchema {
                inputs: self.inputs,
                outputs: self.outputs,
            },
            deprecated: false,
        }
    }
}

fn trigger(kind: TriggerStepId, name: &'static str, icon: &'static str, description: &'static str) -> Entry {
    Entry {
        step_id: StepId::Trigger(kind),
        name,
        icon,
        description,
        inputs: IoSchema::default(),
        outputs: IoSchema::default(),
        defaults: json!({}),
    }
}

fn action(kind: ActionStepId, name: &'static str, icon: &'static str, description: &'static str) -> Entry {
    Entry {
        step_id: StepId::Action(kind),
        name,
        icon,
        description,
        inputs: IoSchema::default(),
        outputs: IoSchema::default(),
        defaults: json!({}),
    }
}

fn row_outputs(with_old_row: bool) -> IoSchema {
    let mut entries = vec![
        ("row", object("The row that was changed").with_custom_type("row")),
        ("id", string("Row ID - can be used for updating")),
        ("revision", string("Revision of row")),
    ];
    if with_old_row {
        entries.push(("oldRow", object("The row before it was updated").with_custom_type("row")));
    }
    props(&entries)
}

fn table_input() -> IoSchema {
    props(&[("tableId", string("Table").with_custom_type("table"))])
}

fn builtin_definitions() -> Vec<BlockDefinition> {
    let entries = vec![
        // Triggers
        Entry {
            inputs: props(&[("fields", object("Fields submitted with the trigger"))]),
            outputs: props(&[("fields", object("Fields submitted from the app frontend"))]),
            defaults: json!({ "fields": {} }),
            ..trigger(TriggerStepId::App, "App Action", "Apps", "Triggered by an app action")
        },
        Entry {
            inputs: table_input(),
            outputs: row_outputs(false),
            ..trigger(TriggerStepId::RowSaved, "Row Created", "TableRowAddBottom", "Fired when a row is added")
        },
        Entry {
            inputs: table_input(),
            outputs: row_outputs(true),
            ..trigger(TriggerStepId::RowUpdated, "Row Updated", "Refresh", "Fired when a row is updated")
        },
        Entry {
            inputs: table_input(),
            outputs: props(&[("row", object("The row that was deleted").with_custom_type("row"))]),
            ..trigger(TriggerStepId::RowDeleted, "Row Deleted", "TableRowRemoveCenter", "Fired when a row is deleted")
        },
        Entry {
            inputs: table_input(),
            outputs: row_outputs(false),
            ..trigger(TriggerStepId::RowAction, "Row Action", "Workflow", "Fired by a row action button")
        },
        Entry {
            outputs: props(&[("body", object("Body of the incoming request"))]),
            defaults: json!({ "schemaUrl": "", "triggerUrl": "" }),
            ..trigger(TriggerStepId::Webhook, "Webhook", "Send", "Triggered by an HTTP request")
        },
        Entry {
            inputs: props(&[("cron", string("Expression"))]),
            outputs: props(&[("timestamp", number("Timestamp the cron was executed"))]),
            ..trigger(TriggerStepId::Cron, "Cron Trigger", "Clock", "Triggered on a schedule")
        },
        // Actions
        action(ActionStepId::Branch, "Branch", "Branch3", "Run different steps per condition"),
        Entry {
            inputs: props(&[
                ("option", string("Input type").with_enum(&["Array", "String"])),
                ("binding", string("Binding to iterate over")),
                ("iterations", number("Max loop iterations")),
                ("failure", string("Failure condition")),
            ]),
            outputs: props(&[
                ("items", IoProperty::new("array").with_description("The item currently being executed")),
                success(),
                ("iterations", number("The amount of times the block ran")),
            ]),
            ..action(ActionStepId::Loop, "Loop", "Reuse", "Loop over the next step")
        },
        Entry {
            inputs: props(&[("code", string("JavaScript"))]),
            outputs: props(&[("value", string("The result of the script")), success()]),
            ..action(ActionStepId::ExecuteScript, "JS Scripting", "Code", "Run a piece of JavaScript")
        },
        Entry {
            inputs: props(&[("row", object("Table").with_custom_type("row"))]),
            outputs: props(&[
                ("row", object("The new row").with_custom_type("row")),
                ("response", object("The response from the table")),
                ("id", string("The identifier of the new row")),
                ("revision", string("The revision of the new row")),
                success(),
            ]),
            ..action(ActionStepId::CreateRow, "Create Row", "TableRowAddBottom", "Add a row to your database")
        },
        Entry {
            inputs: props(&[
                ("row", object("Table").with_custom_type("row")),
                ("rowId", string("Row ID")),
            ]),
            outputs: props(&[
                ("row", object("The updated row").with_custom_type("row")),
                ("response", object("The response from the table")),
                ("id", string("The identifier of the updated row")),
                ("revision", string("The revision of the updated row")),
                success(),
            ]),
            ..action(ActionStepId::UpdateRow, "Update Row", "Refresh", "Update a row in your database")
        },
        Entry {
            inputs: props(&[
                ("tableId", string("Table").with_custom_type("table")),
                ("id", string("Row ID")),
            ]),
            outputs: props(&[
                ("row", object("The deleted row").with_custom_type("row")),
                ("response", object("The response from the table")),
                success(),
            ]),
            ..action(ActionStepId::DeleteRow, "Delete Row", "TableRowRemoveCenter", "Delete a row from your database")
        },
        Entry {
            inputs: props(&[
                ("tableId", string("Table").with_custom_type("table")),
                ("sortOrder", string("Sort order").with_enum(&["ascending", "descending"])),
                ("limit", number("Limit")),
            ]),
            outputs: props(&[
                ("rows", IoProperty::new("array").with_custom_type("rows").with_description("The rows that were found")),
                success(),
            ]),
            ..action(ActionStepId::QueryRows, "Query rows", "Search", "Query rows from the database")
        },
        Entry {
            inputs: props(&[("text", string("Log"))]),
            outputs: props(&[("message", string("What was output")), success()]),
            ..action(ActionStepId::ServerLog, "Backend log", "Monitoring", "Logs the given text to the server")
        },
        Entry {
            inputs: props(&[("time", number("Delay in milliseconds"))]),
            outputs: props(&[success()]),
            ..action(ActionStepId::Delay, "Delay", "Clock", "Delay the automation")
        },
        Entry {
            inputs: props(&[
                ("field", string("Reference value")),
                (
                    "condition",
                    string("Condition").with_enum(&["equal", "notEqual", "largerThan", "lessThan"]),
                ),
                ("value", string("Comparison value")),
            ]),
            outputs: props(&[
                success(),
                ("result", boolean("Whether the logic block passed")),
            ]),
            ..action(ActionStepId::Filter, "Condition", "Branch2", "Conditionally halt automations")
        },
        Entry {
            inputs: props(&[("collection", string("What to collect"))]),
            outputs: props(&[("value", string("Collected data")), success()]),
            ..action(ActionStepId::Collect, "Collect Data", "Collection", "Collect specified data")
        },
        Entry {
            inputs: props(&[
                ("requestMethod", string("Request method").with_enum(&["POST", "GET", "PUT", "DELETE", "PATCH", "HEAD"])),
                ("url", string("URL")),
                ("requestBody", string("JSON body")),
                ("headers", string("Headers")),
            ]),
            outputs: props(&[
                ("response", object("The response from the webhook")),
                ("httpStatus", number("The HTTP status code returned")),
                success(),
            ]),
            ..action(ActionStepId::OutgoingWebhook, "Outgoing webhook", "Send", "Send a request of specified method to a URL")
        },
        Entry {
            inputs: props(&[
                ("to", string("Send to")),
                ("from", string("Send from")),
                ("subject", string("Email subject")),
                ("contents", string("HTML contents")),
            ]),
            outputs: props(&[success(), ("response", object("A response from the email client"))]),
            ..action(ActionStepId::SendEmailSmtp, "Send Email (SMTP)", "Email", "Send an email using SMTP")
        },
        Entry {
            inputs: props(&[
                ("query", object("Query to run")),
                ("datasourceId", string("Data source")),
            ]),
            outputs: props(&[
                ("response", object("The response from the datasource execution")),
                ("info", object("Some query types may return extra data")),
                success(),
            ]),
            ..action(ActionStepId::ExecuteQuery, "External Data Connector", "Data", "Execute a query in an external data connector")
        },
    ];

    entries.into_iter().map(Entry::build).collect()
}
