//! Binding types produced by binding resolution.

use serde::{Deserialize, Serialize};

/// Where a binding's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Trigger,
    Step,
    /// Loop-scoped (`loop.*`); only visible inside the loop.
    Loop,
}

/// An expression usable in a block's input fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedBinding {
    /// Shown to the user, e.g. `steps.Create Row.row`.
    pub readable_binding: String,
    /// Evaluated at execution time, e.g. `steps.0190f3.row`.
    pub runtime_binding: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub binding_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub category: String,
    pub source: BindingSource,
    pub display: BindingDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDisplay {
    /// Column display type (e.g. `Text`), when the schema matches a column.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    pub name: String,
    pub rank: i64,
}
