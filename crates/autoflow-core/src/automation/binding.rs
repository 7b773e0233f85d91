//! Binding resolution: which expressions a block's inputs may reference.
//!
//! Every block that precedes the target on its own path (the trigger, earlier
//! siblings, and earlier siblings of each enclosing branch step) contributes
//! its output schema. Blocks in sibling branches are never visible.

use std::collections::{BTreeMap, HashSet};

use autoflow_types::automation::{
    ActionStepId, AutomationDefinition, Block, IoProperty, TriggerStepId,
};
use autoflow_types::binding::{BindingDisplay, BindingSource, EnrichedBinding};
use autoflow_types::error::TreeError;
use autoflow_types::path::BlockRef;
use autoflow_types::table::{Table, column_display_name};

use super::tree::{TreeIndex, block_at, resolve_path};

/// Trigger output names that are not nested under `trigger.row`.
const RESERVED_TRIGGER_FIELDS: [&str; 3] = ["id", "revision", "oldRow"];

const LOOP_ICON: &str = "Reuse";
const LOOP_CATEGORY: &str = "Loop Outputs";
const TRIGGER_CATEGORY: &str = "Trigger outputs";

/// A binding that could not be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBinding {
    pub name: String,
    /// Position of the contributing block on the target's path.
    pub block_idx: usize,
    pub reason: String,
}

/// Output of `BindingResolver::resolve`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBindings {
    pub bindings: Vec<EnrichedBinding>,
    pub skipped: Vec<SkippedBinding>,
}

/// Computes the bindings available to a block.
///
/// Holds borrowed views of the selected definition, its index and the table
/// snapshot; construct one per query.
pub struct BindingResolver<'a> {
    definition: &'a AutomationDefinition,
    index: &'a TreeIndex,
    tables: &'a [Table],
}

/// Per-block context shared by every binding one block contributes.
struct Contributor<'b> {
    block: &'b Block,
    idx: usize,
    is_loop: bool,
    display_name: Option<&'b str>,
    /// Looped steps seen on the path so far, this block included.
    loop_count: usize,
}

impl<'a> BindingResolver<'a> {
    pub fn new(definition: &'a AutomationDefinition, index: &'a TreeIndex, tables: &'a [Table]) -> Self {
        Self {
            definition,
            index,
            tables,
        }
    }

    /// All bindings available to the block at `target`.
    pub fn resolve(&self, target: &BlockRef) -> Result<ResolvedBindings, TreeError> {
        let path_blocks = resolve_path(&target.path_to, self.definition)?;
        let Some((current, preceding)) = path_blocks.split_last() else {
            return Ok(ResolvedBindings::default());
        };
        let is_script = current.action_kind() == Some(ActionStepId::ExecuteScript);

        // A loop wrapper is in scope only when its looped step is the target
        // or one of the target's ancestors.
        let scope: HashSet<&str> = target
            .path_to
            .iter()
            .filter_map(|segment| segment.id.as_deref())
            .collect();

        let mut resolved = ResolvedBindings::default();
        let mut loop_count = 0;

        for (idx, block) in preceding.iter().copied().enumerate() {
            let is_loop = block.is_loop_wrapper()
                && block
                    .block_to_loop
                    .as_deref()
                    .is_some_and(|t| self.index.contains(t));

            let out_of_scope = is_loop
                && block
                    .block_to_loop
                    .as_deref()
                    .is_none_or(|t| !scope.contains(t));

            let mut schema = if out_of_scope {
                BTreeMap::new()
            } else if is_loop {
                self.loop_schema(block)
            } else {
                block.schema.outputs.properties.clone()
            };

            if idx == 0 && block.is_trigger() {
                self.apply_trigger_schema(block, &mut schema);
            }

            if let Some(wrapper_id) = self.index.looped_by(&block.id) {
                loop_count += 1;
                match preceding.iter().find(|b| b.id == wrapper_id) {
                    Some(wrapper) => schema = wrapper.schema.outputs.properties.clone(),
                    None => tracing::warn!(id = %block.id, wrapper = %wrapper_id, "loop block missing"),
                }
            }

            let contributor = Contributor {
                block,
                idx,
                is_loop,
                display_name: self.definition.display_name(block),
                loop_count,
            };
            for (name, property) in &schema {
                self.add_binding(&contributor, name, property, is_script, &mut resolved);
            }
        }

        tracing::trace!(
            bindings = resolved.bindings.len(),
            skipped = resolved.skipped.len(),
            "resolved bindings"
        );
        Ok(resolved)
    }

    /// `currentItem` plus the iterated step's outputs.
    fn loop_schema(&self, wrapper: &Block) -> BTreeMap<String, IoProperty> {
        let mut schema = BTreeMap::new();
        if let Some(target) = wrapper
            .block_to_loop
            .as_deref()
            .and_then(|id| self.index.get(id))
            .and_then(|r| block_at(&r.path_to, self.definition).ok())
        {
            schema.extend(target.schema.outputs.properties.clone());
        }
        schema.insert(
            "currentItem".to_string(),
            IoProperty::new("string").with_description("the item currently being executed"),
        );
        schema
    }

    fn apply_trigger_schema(&self, trigger: &Block, schema: &mut BTreeMap<String, IoProperty>) {
        match trigger.trigger_kind() {
            Some(kind) if kind.is_filterable_row_trigger() => {
                let table = trigger
                    .input_str("tableId")
                    .and_then(|id| self.tables.iter().find(|t| t.id == id));
                if let Some(table) = table {
                    for (column, field) in &table.schema {
                        let mut property = IoProperty::new(field.field_type.clone());
                        property.subtype = field.subtype.clone();
                        schema.insert(column.clone(), property);
                    }
                }
                schema.remove("row");
            }
            Some(TriggerStepId::App) => {
                let fields = trigger
                    .fields()
                    .and_then(|f| f.get("fields"))
                    .and_then(|f| f.as_object());
                *schema = fields
                    .into_iter()
                    .flatten()
                    .map(|(key, value)| {
                        let io_type = value.as_str().unwrap_or("string");
                        (key.clone(), IoProperty::new(io_type))
                    })
                    .collect();
            }
            _ => {}
        }
    }

    fn add_binding(
        &self,
        from: &Contributor<'_>,
        name: &str,
        property: &IoProperty,
        is_script: bool,
        resolved: &mut ResolvedBindings,
    ) {
        if name.is_empty() {
            return;
        }

        let Some(runtime) = self.runtime_binding(from, name, is_script) else {
            resolved.skipped.push(SkippedBinding {
                name: name.to_string(),
                block_idx: from.idx,
                reason: "Step ID not found".to_string(),
            });
            return;
        };

        let is_step = !from.is_loop && from.idx != 0;
        let readable = readable_binding(from.block, name)
            .or_else(|| match from.display_name {
                Some(display) if is_step => Some(format!("steps.{display}.{name}")),
                _ => None,
            })
            .unwrap_or_else(|| runtime.clone());

        let ordinal = from.idx as i64 - from.loop_count as i64;
        let category = if from.idx == 0 {
            TRIGGER_CATEGORY.to_string()
        } else if from.is_loop {
            LOOP_CATEGORY.to_string()
        } else {
            match from.display_name {
                Some(display) => format!("{display} outputs"),
                None => format!("Step {ordinal} outputs"),
            }
        };

        let display_type = if property.custom_type.as_deref() == Some("rows") {
            Some(property.io_type.clone())
        } else {
            column_display_name(&property.io_type, property.subtype.as_deref()).map(str::to_string)
        };

        let source = if from.idx == 0 {
            BindingSource::Trigger
        } else if from.is_loop {
            BindingSource::Loop
        } else {
            BindingSource::Step
        };

        let icon = if from.is_loop {
            Some(LOOP_ICON.to_string())
        } else {
            from.block.icon.clone()
        };

        resolved.bindings.push(EnrichedBinding {
            readable_binding: readable,
            runtime_binding: runtime,
            binding_type: Some(property.io_type.clone()),
            description: property.description.clone(),
            icon,
            category,
            source,
            display: BindingDisplay {
                display_type,
                name: name.to_string(),
                rank: if from.is_loop {
                    from.idx as i64 + 1
                } else {
                    ordinal
                },
            },
        });
    }

    fn runtime_binding(&self, from: &Contributor<'_>, name: &str, is_script: bool) -> Option<String> {
        if from.idx == 0 {
            match from.block.trigger_kind() {
                Some(TriggerStepId::App) => {
                    return Some(if is_script {
                        format!("trigger.fields[\"{name}\"]")
                    } else {
                        format!("trigger.fields.[{name}]")
                    });
                }
                Some(kind)
                    if kind.is_filterable_row_trigger()
                        && !RESERVED_TRIGGER_FIELDS.contains(&name) =>
                {
                    return Some(if is_script {
                        format!("trigger.row[\"{name}\"]")
                    } else {
                        format!("trigger.row.[{name}]")
                    });
                }
                _ => {}
            }
        }

        if from.is_loop {
            return Some(format!("loop.{name}"));
        }
        if from.idx == 0 {
            return Some(format!("trigger.[{name}]"));
        }

        let id = from.block.id.as_str();
        if id.is_empty() {
            return None;
        }
        Some(if is_script {
            format!("steps[\"{id}\"].{name}")
        } else {
            format!("steps.{id}.{name}")
        })
    }
}

/// Readable form for trigger outputs; other blocks have none of their own.
fn readable_binding(block: &Block, name: &str) -> Option<String> {
    let kind = block.trigger_kind()?;
    Some(if kind == TriggerStepId::App {
        format!("trigger.fields.{name}")
    } else if kind.is_row_trigger() && !RESERVED_TRIGGER_FIELDS.contains(&name) {
        format!("trigger.row.{name}")
    } else {
        format!("trigger.{name}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::testing::{branch_step, definition, loop_wrapper, step};
    use crate::automation::tree::traverse;
    use autoflow_types::automation::{Block, IoSchema};
    use autoflow_types::table::FieldSchema;
    use serde_json::json;

    fn with_outputs(mut block: Block, outputs: &[(&str, &str)]) -> Block {
        block.schema.outputs = IoSchema {
            properties: outputs
                .iter()
                .map(|(name, ty)| (name.to_string(), IoProperty::new(*ty)))
                .collect(),
            required: Vec::new(),
        };
        block
    }

    fn row_trigger(kind: TriggerStepId, table_id: &str) -> Block {
        let mut trigger = Block::trigger(kind);
        trigger.id = "trigger".to_string();
        if let Some(fields) = trigger.fields_mut() {
            fields.insert("tableId".to_string(), json!(table_id));
        }
        with_outputs(
            trigger,
            &[("row", "object"), ("id", "string"), ("revision", "string")],
        )
    }

    fn people_table() -> Table {
        let mut schema = BTreeMap::new();
        schema.insert(
            "name".to_string(),
            FieldSchema {
                field_type: "string".to_string(),
                subtype: None,
            },
        );
        schema.insert(
            "age".to_string(),
            FieldSchema {
                field_type: "number".to_string(),
                subtype: None,
            },
        );
        Table {
            id: "ta_people".to_string(),
            name: "People".to_string(),
            schema,
        }
    }

    fn resolve(def: &AutomationDefinition, id: &str, tables: &[Table]) -> ResolvedBindings {
        let index = traverse(def);
        let target = index.get(id).expect("indexed").clone();
        BindingResolver::new(def, &index, tables).resolve(&target).unwrap()
    }

    fn find<'r>(resolved: &'r ResolvedBindings, runtime: &str) -> &'r EnrichedBinding {
        resolved
            .bindings
            .iter()
            .find(|b| b.runtime_binding == runtime)
            .unwrap_or_else(|| panic!("missing binding {runtime}"))
    }

    #[test]
    fn test_row_trigger_bindings_use_table_columns() {
        let mut def = definition(vec![step("a")]);
        def.trigger = Some(row_trigger(TriggerStepId::RowSaved, "ta_people"));

        let resolved = resolve(&def, "a", &[people_table()]);
        let name = find(&resolved, "trigger.row.[name]");
        assert_eq!(name.readable_binding, "trigger.row.name");
        assert_eq!(name.category, "Trigger outputs");
        assert_eq!(name.source, BindingSource::Trigger);
        assert_eq!(name.display.display_type.as_deref(), Some("Text"));

        let id = find(&resolved, "trigger.[id]");
        assert_eq!(id.readable_binding, "trigger.id");
        assert!(resolved.bindings.iter().all(|b| b.display.name != "row"));
    }

    #[test]
    fn test_row_deleted_trigger_keeps_declared_outputs() {
        let mut def = definition(vec![step("a")]);
        def.trigger = Some(row_trigger(TriggerStepId::RowDeleted, "ta_people"));

        let resolved = resolve(&def, "a", &[people_table()]);
        let row = find(&resolved, "trigger.[row]");
        assert_eq!(row.readable_binding, "trigger.row.row");
        assert!(resolved.bindings.iter().all(|b| b.display.name != "age"));
    }

    #[test]
    fn test_app_trigger_fields() {
        let mut def = definition(vec![step("a")]);
        if let Some(trigger) = def.trigger.as_mut().and_then(|t| t.fields_mut()) {
            trigger.insert("fields".to_string(), json!({ "email": "string" }));
        }

        let resolved = resolve(&def, "a", &[]);
        assert_eq!(resolved.bindings.len(), 1);
        let email = find(&resolved, "trigger.fields.[email]");
        assert_eq!(email.readable_binding, "trigger.fields.email");
    }

    #[test]
    fn test_step_bindings_use_display_name() {
        let mut def = definition(vec![
            with_outputs(step("a"), &[("row", "object")]),
            with_outputs(step("b"), &[("message", "string")]),
            step("target"),
        ]);
        def.step_names.insert("a".to_string(), "Create Person".to_string());

        let resolved = resolve(&def, "target", &[]);
        let row = find(&resolved, "steps.a.row");
        assert_eq!(row.readable_binding, "steps.Create Person.row");
        assert_eq!(row.category, "Create Person outputs");
        assert_eq!(row.display.rank, 1);
        assert_eq!(row.source, BindingSource::Step);

        let message = find(&resolved, "steps.b.message");
        assert_eq!(message.readable_binding, "steps.b.message");
        assert_eq!(message.category, "Step 2 outputs");
        assert_eq!(message.display.rank, 2);
    }

    #[test]
    fn test_script_step_gets_literal_safe_forms() {
        let mut script = step("script");
        script.step_id = autoflow_types::automation::StepId::Action(ActionStepId::ExecuteScript);
        let def = definition(vec![with_outputs(step("a"), &[("row", "object")]), script]);

        let resolved = resolve(&def, "script", &[]);
        find(&resolved, "steps[\"a\"].row");
    }

    #[test]
    fn test_sibling_branch_outputs_are_invisible() {
        let def = definition(vec![
            with_outputs(step("a"), &[("out", "string")]),
            branch_step(
                "br",
                vec![
                    vec![with_outputs(step("x"), &[("out", "string")]), step("x2")],
                    vec![with_outputs(step("y"), &[("out", "string")])],
                ],
            ),
        ]);

        let resolved = resolve(&def, "y", &[]);
        let runtimes: Vec<&str> = resolved
            .bindings
            .iter()
            .map(|b| b.runtime_binding.as_str())
            .collect();
        assert!(runtimes.contains(&"steps.a.out"));
        assert!(!runtimes.contains(&"steps.x.out"));

        let resolved = resolve(&def, "x2", &[]);
        find(&resolved, "steps.x.out");
    }

    #[test]
    fn test_loop_bindings_only_inside_loop_scope() {
        let def = definition(vec![
            with_outputs(loop_wrapper("loop", "a"), &[("items", "array")]),
            with_outputs(step("a"), &[("message", "string")]),
            step("after"),
        ]);

        let inside = resolve(&def, "a", &[]);
        let current = find(&inside, "loop.currentItem");
        assert_eq!(current.category, "Loop Outputs");
        assert_eq!(current.icon.as_deref(), Some("Reuse"));
        assert_eq!(current.display.rank, 2);
        find(&inside, "loop.message");

        let outside = resolve(&def, "after", &[]);
        assert!(outside.bindings.iter().all(|b| b.source != BindingSource::Loop));
        // The looped step exposes the loop's aggregate outputs.
        let items = find(&outside, "steps.a.items");
        assert_eq!(items.category, "Step 1 outputs");
        assert_eq!(items.display.rank, 1);
    }

    #[test]
    fn test_sequential_loops_expose_only_their_own_bindings() {
        let def = definition(vec![
            loop_wrapper("loop1", "a"),
            with_outputs(step("a"), &[("aout", "string")]),
            loop_wrapper("loop2", "b"),
            with_outputs(step("b"), &[("bout", "string")]),
        ]);

        let resolved = resolve(&def, "b", &[]);
        let loop_bindings: Vec<(&str, i64)> = resolved
            .bindings
            .iter()
            .filter(|b| b.source == BindingSource::Loop)
            .map(|b| (b.runtime_binding.as_str(), b.display.rank))
            .collect();
        assert_eq!(loop_bindings, vec![("loop.bout", 4), ("loop.currentItem", 4)]);

        let first = resolve(&def, "a", &[]);
        assert!(first.bindings.iter().all(|b| b.runtime_binding != "loop.bout"));
        find(&first, "loop.aout");
    }

    #[test]
    fn test_loop_bindings_visible_to_nested_steps() {
        let def = definition(vec![
            loop_wrapper("loop", "br"),
            branch_step("br", vec![vec![step("x")], vec![]]),
        ]);
        let resolved = resolve(&def, "x", &[]);
        find(&resolved, "loop.currentItem");
    }

    #[test]
    fn test_step_without_id_is_skipped() {
        let def = definition(vec![with_outputs(step(""), &[("out", "string")]), step("target")]);
        let resolved = resolve(&def, "target", &[]);
        assert!(resolved.bindings.is_empty());
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].name, "out");
    }

    #[test]
    fn test_rows_custom_type_shows_raw_type() {
        let mut block = step("query");
        block.schema.outputs.properties.insert(
            "rows".to_string(),
            IoProperty::new("array").with_custom_type("rows"),
        );
        block.schema.outputs.properties.insert("tags".to_string(), IoProperty::new("array"));
        let def = definition(vec![block, step("target")]);

        let resolved = resolve(&def, "target", &[]);
        assert_eq!(
            find(&resolved, "steps.query.rows").display.display_type.as_deref(),
            Some("array")
        );
        assert_eq!(
            find(&resolved, "steps.query.tags").display.display_type.as_deref(),
            Some("Multi select")
        );
    }
}
