//! Automation store: selection, structural edits, persistence and history.
//!
//! The store owns the automation list, the current selection and its derived
//! tree index. Every operation runs under one async mutex, so edits and saves
//! are applied strictly in arrival order and each edit computes against the
//! state left by the previous one.
//!
//! Edits never touch the snapshot directly. The editor produces a new
//! definition, the repository persists it, and only the persisted document
//! (with its new revision) replaces the local copy. A failed save publishes an
//! error notification and leaves the snapshot as it was.

use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::Mutex;

use autoflow_types::automation::{
    Automation, AutomationDefinition, Block, BlockInputs, StepId, TriggerStepId,
};
use autoflow_types::binding::EnrichedBinding;
use autoflow_types::config::GlobalConfig;
use autoflow_types::error::{ExecutionError, RepositoryError, TreeError};
use autoflow_types::event::StoreEvent;
use autoflow_types::path::{BlockPath, BlockRef};
use autoflow_types::results::TestAutomationResponse;
use autoflow_types::table::Table;

use crate::event::EventBus;
use crate::repository::{AutomationRepository, ExecutionClient, TableSchemaSource};

use super::binding::BindingResolver;
use super::definitions::BlockDefinitions;
use super::editor::{self, ShiftDirection};
use super::history::{History, HistoryOperation};
use super::results::{self, BlockTestResult};
use super::tree::{TreeIndex, block_at};

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("invalid block inputs: {0}")]
    Inputs(#[from] serde_json::Error),

    #[error("no automation selected")]
    NoSelection,

    #[error("automation '{0}' not found")]
    NotFound(String),

    #[error("block '{0}' not found in the selected automation")]
    UnknownBlock(String),

    #[error("{0}")]
    Validation(String),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

/// Snapshot of the selected automation with its derived index.
#[derive(Debug, Clone)]
pub struct SelectedAutomation {
    pub automation: Automation,
    pub index: TreeIndex,
    pub test_results: Option<TestAutomationResponse>,
}

#[derive(Debug)]
struct StoreState {
    automations: Vec<Automation>,
    selected_id: Option<String>,
    index: TreeIndex,
    test_results: Option<TestAutomationResponse>,
    tables: Vec<Table>,
    history: History,
}

impl StoreState {
    fn new(history_limit: usize) -> Self {
        Self {
            automations: Vec::new(),
            selected_id: None,
            index: TreeIndex::default(),
            test_results: None,
            tables: Vec::new(),
            history: History::new(history_limit),
        }
    }

    fn find(&self, id: &str) -> Option<&Automation> {
        self.automations
            .iter()
            .find(|a| a.id.as_deref() == Some(id))
    }

    fn selected(&self) -> Result<&Automation, StoreError> {
        self.selected_id
            .as_deref()
            .and_then(|id| self.find(id))
            .ok_or(StoreError::NoSelection)
    }

    fn block_ref(&self, block_id: &str) -> Result<BlockRef, StoreError> {
        self.index
            .get(block_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownBlock(block_id.to_string()))
    }

    fn reindex(&mut self) {
        let definition = self
            .selected_id
            .as_deref()
            .and_then(|id| self.find(id))
            .map(|a| a.definition.clone());
        match definition {
            Some(definition) => self.index.on_definition_changed(&definition),
            None => self.index = TreeIndex::default(),
        }
    }

    /// Replace (or add) a persisted automation, keeping the list name-sorted.
    fn upsert(&mut self, automation: Automation) {
        match self
            .automations
            .iter_mut()
            .find(|a| a.id.is_some() && a.id == automation.id)
        {
            Some(existing) => *existing = automation,
            None => self.automations.push(automation),
        }
        sort_by_name(&mut self.automations);
    }
}

fn sort_by_name(automations: &mut [Automation]) {
    automations.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}

/// Editing facade over an automation repository.
///
/// Generic over the repository, execution and table ports so the core crate
/// never depends on autoflow-infra.
pub struct AutomationStore<R: AutomationRepository, E: ExecutionClient, T: TableSchemaSource> {
    repo: R,
    executor: E,
    table_source: T,
    definitions: BlockDefinitions,
    events: EventBus,
    state: Mutex<StoreState>,
}

impl<R: AutomationRepository, E: ExecutionClient, T: TableSchemaSource> AutomationStore<R, E, T> {
    pub fn new(repo: R, executor: E, table_source: T, config: &GlobalConfig) -> Self {
        Self {
            repo,
            executor,
            table_source,
            definitions: BlockDefinitions::builtin(),
            events: EventBus::new(config.event_capacity.max(1)),
            state: Mutex::new(StoreState::new(config.history_limit)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn definitions(&self) -> &BlockDefinitions {
        &self.definitions
    }

    fn notify_error(&self, message: &str, err: &StoreError) {
        tracing::warn!(error = %err, "{message}");
        self.events.publish(StoreEvent::error(message));
    }

    // -----------------------------------------------------------------------
    // List and selection
    // -----------------------------------------------------------------------

    /// Reload the automation list from the repository.
    pub async fn fetch(&self) -> Result<Vec<Automation>, StoreError> {
        let mut state = self.state.lock().await;
        let mut automations = self.repo.list().await?;
        sort_by_name(&mut automations);
        state.automations = automations;

        let selection_gone = state
            .selected_id
            .as_deref()
            .is_some_and(|id| state.find(id).is_none());
        if selection_gone {
            self.set_selection(&mut state, None);
        }
        state.reindex();

        tracing::debug!(count = state.automations.len(), "fetched automations");
        Ok(state.automations.clone())
    }

    pub async fn automations(&self) -> Vec<Automation> {
        self.state.lock().await.automations.clone()
    }

    /// Select an automation by id. Selecting the current one is a no-op.
    pub async fn select(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.find(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.set_selection(&mut state, Some(id.to_string()));
        Ok(())
    }

    fn set_selection(&self, state: &mut StoreState, id: Option<String>) {
        if state.selected_id == id {
            return;
        }
        state.selected_id = id.clone();
        state.test_results = None;
        state.reindex();
        self.events
            .publish(StoreEvent::SelectionChanged { automation_id: id });
    }

    pub async fn selected(&self) -> Option<SelectedAutomation> {
        let state = self.state.lock().await;
        let automation = state.selected().ok()?.clone();
        Some(SelectedAutomation {
            automation,
            index: state.index.clone(),
            test_results: state.test_results.clone(),
        })
    }

    pub async fn block_ref(&self, block_id: &str) -> Result<BlockRef, StoreError> {
        self.state.lock().await.block_ref(block_id)
    }

    /// Refresh the table snapshot used for row trigger bindings.
    pub async fn refresh_tables(&self) -> Result<usize, StoreError> {
        let tables = self.table_source.list_tables().await?;
        let mut state = self.state.lock().await;
        state.tables = tables;
        Ok(state.tables.len())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    async fn write(&self, automation: &Automation) -> Result<Automation, StoreError> {
        let saved = if automation.is_persisted() {
            self.repo.update(automation).await?
        } else {
            self.repo.create(automation).await?
        };
        Ok(saved)
    }

    /// Persist `automation`, record it in history and select it.
    async fn persist(
        &self,
        state: &mut StoreState,
        automation: Automation,
        failure: &str,
    ) -> Result<Automation, StoreError> {
        let before = automation
            .id
            .as_deref()
            .and_then(|id| state.find(id))
            .cloned();

        let saved = match self.write(&automation).await {
            Ok(saved) => saved,
            Err(err) => {
                self.notify_error(failure, &err);
                return Err(err);
            }
        };

        state.history.record(HistoryOperation::Save {
            before,
            after: saved.clone(),
        });
        self.apply_saved(state, &saved);
        Ok(saved)
    }

    fn apply_saved(&self, state: &mut StoreState, saved: &Automation) {
        state.upsert(saved.clone());
        self.set_selection(state, saved.id.clone());
        state.reindex();

        if let (Some(id), Some(revision)) = (&saved.id, &saved.revision) {
            tracing::info!(automation_id = %id, revision = %revision, "automation saved");
            self.events.publish(StoreEvent::AutomationSaved {
                automation_id: id.clone(),
                revision: revision.clone(),
            });
        }
    }

    fn apply_deleted(&self, state: &mut StoreState, id: &str) {
        state.automations.retain(|a| a.id.as_deref() != Some(id));
        if state.selected_id.as_deref() == Some(id) {
            let next = state.automations.first().and_then(|a| a.id.clone());
            self.set_selection(state, next);
        }
        state.reindex();

        tracing::info!(automation_id = %id, "automation deleted");
        self.events.publish(StoreEvent::AutomationDeleted {
            automation_id: id.to_string(),
        });
    }

    /// Save an automation (create when it has no id/revision yet).
    pub async fn save(&self, automation: Automation) -> Result<Automation, StoreError> {
        let mut state = self.state.lock().await;
        self.persist(&mut state, automation, "Error saving automation")
            .await
    }

    /// Create a new automation from a trigger block.
    pub async fn create(&self, name: &str, trigger: Block) -> Result<Automation, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("automation name is required".to_string()));
        }
        if !trigger.is_trigger() {
            return Err(StoreError::Validation(format!(
                "'{}' is not a trigger",
                trigger.step_id
            )));
        }
        let mut state = self.state.lock().await;
        self.persist(
            &mut state,
            Automation::new(name, trigger),
            "Error creating automation",
        )
        .await
    }

    /// Copy an automation under `"<name> - copy"`.
    pub async fn duplicate(&self, id: &str) -> Result<Automation, StoreError> {
        let mut state = self.state.lock().await;
        let mut copy = state
            .find(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        copy.id = None;
        copy.revision = None;
        copy.name = format!("{} - copy", copy.name);
        self.persist(&mut state, copy, "Error duplicating automation")
            .await
    }

    pub async fn toggle_disabled(&self, id: &str) -> Result<Automation, StoreError> {
        let mut state = self.state.lock().await;
        let mut automation = state
            .find(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        automation.disabled = !automation.disabled;

        let saved = self
            .persist(&mut state, automation, "Error toggling automation")
            .await?;
        let verb = if saved.disabled { "disabled" } else { "enabled" };
        self.events
            .publish(StoreEvent::success(format!("Automation {verb} successfully")));
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let automation = state
            .find(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let revision = automation
            .revision
            .clone()
            .ok_or_else(|| StoreError::Validation("automation has no revision".to_string()))?;

        if let Err(err) = self.repo.delete(id, &revision).await {
            let err = StoreError::from(err);
            self.notify_error("Error deleting automation", &err);
            return Err(err);
        }

        state.history.record(HistoryOperation::Delete { before: automation });
        self.apply_deleted(&mut state, id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    pub async fn undo(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let entry = state.history.undo().ok_or(StoreError::NothingToUndo)?;
        let outcome = match entry {
            HistoryOperation::Save {
                before: Some(before),
                ..
            } => self.restore(&mut state, before).await,
            HistoryOperation::Save { before: None, after } => self.remove(&mut state, &after).await,
            HistoryOperation::Delete { before } => self.recreate(&mut state, before).await,
        };
        if let Err(err) = outcome {
            state.history.cancel_undo();
            self.notify_error("Error undoing change", &err);
            return Err(err);
        }
        Ok(())
    }

    pub async fn redo(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let entry = state.history.redo().ok_or(StoreError::NothingToRedo)?;
        let outcome = match entry {
            HistoryOperation::Save {
                before: Some(_),
                after,
            } => self.restore(&mut state, after).await,
            HistoryOperation::Save { before: None, after } => {
                self.recreate(&mut state, after).await
            }
            HistoryOperation::Delete { before } => self.remove(&mut state, &before).await,
        };
        if let Err(err) = outcome {
            state.history.cancel_redo();
            self.notify_error("Error redoing change", &err);
            return Err(err);
        }
        Ok(())
    }

    /// Write `snapshot` over the stored document at its current revision.
    async fn restore(&self, state: &mut StoreState, mut snapshot: Automation) -> Result<(), StoreError> {
        let id = snapshot
            .id
            .clone()
            .ok_or_else(|| StoreError::Validation("history entry has no id".to_string()))?;
        let current = self
            .repo
            .get(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        snapshot.revision = current.revision;
        let saved = self.repo.update(&snapshot).await?;
        self.apply_saved(state, &saved);
        Ok(())
    }

    async fn remove(&self, state: &mut StoreState, snapshot: &Automation) -> Result<(), StoreError> {
        let id = snapshot
            .id
            .as_deref()
            .ok_or_else(|| StoreError::Validation("history entry has no id".to_string()))?;
        if let Some(current) = self.repo.get(id).await? {
            let revision = current.revision.unwrap_or_default();
            self.repo.delete(id, &revision).await?;
        }
        self.apply_deleted(state, id);
        Ok(())
    }

    /// Create `snapshot` again. It gets a new id, which history adopts.
    async fn recreate(&self, state: &mut StoreState, mut snapshot: Automation) -> Result<(), StoreError> {
        let old_id = snapshot.id.take();
        snapshot.revision = None;
        let saved = self.repo.create(&snapshot).await?;
        if let (Some(old_id), Some(new_id)) = (old_id.as_deref(), saved.id.as_deref()) {
            state.history.remap_id(old_id, new_id);
        }
        self.apply_saved(state, &saved);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Apply `edit` to the selected automation's definition and persist.
    async fn edit_selected<F>(&self, failure: &str, edit: F) -> Result<Automation, StoreError>
    where
        F: FnOnce(&StoreState, &Automation) -> Result<AutomationDefinition, StoreError> + Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.selected()?.clone();
        next.definition = edit(&*state, &next)?;
        self.persist(&mut state, next, failure).await
    }

    /// A fresh block named uniquely within the selected automation.
    pub async fn construct_block(&self, step_id: StepId) -> Result<Block, StoreError> {
        let state = self.state.lock().await;
        let existing = state.selected().ok().map(|a| &a.definition);
        self.definitions
            .construct_block(step_id, existing)
            .ok_or_else(|| StoreError::Validation(format!("unknown block kind '{step_id}'")))
    }

    pub async fn add_block(&self, block: Block, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error adding automation block", |_, current| {
            Ok(editor::insert_block(&current.definition, block, path)?)
        })
        .await
    }

    pub async fn delete_block(&self, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error deleting automation block", |_, current| {
            Ok(editor::delete_block(&current.definition, path)?.definition)
        })
        .await
    }

    /// Move a block. Returns `None` when the move changes nothing.
    pub async fn move_block(
        &self,
        source: &[BlockPath],
        dest: &[BlockPath],
    ) -> Result<Option<Automation>, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.selected()?.clone();
        let Some(definition) = editor::move_block(&next.definition, source, dest)? else {
            return Ok(None);
        };
        next.definition = definition;
        self.persist(&mut state, next, "Error moving automation block")
            .await
            .map(Some)
    }

    /// Branch at `path`: wrap the node and its followers, or add a branch.
    pub async fn branch_automation(&self, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error branching automation", |_, current| {
            let branch_step = self
                .definitions
                .generate_branch_block(Some(&current.definition))
                .ok_or_else(|| StoreError::Validation("no branch block definition".to_string()))?;
            Ok(editor::create_branch(&current.definition, path, branch_step)?)
        })
        .await
    }

    pub async fn delete_branch(&self, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error deleting branch", |_, current| {
            Ok(editor::delete_branch(&current.definition, path)?)
        })
        .await
    }

    pub async fn branch_left(&self, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error moving branch", |_, current| {
            Ok(editor::shift_branch(&current.definition, path, ShiftDirection::Left)?)
        })
        .await
    }

    pub async fn branch_right(&self, path: &[BlockPath]) -> Result<Automation, StoreError> {
        self.edit_selected("Error moving branch", |_, current| {
            Ok(editor::shift_branch(&current.definition, path, ShiftDirection::Right)?)
        })
        .await
    }

    /// Wrap a block in a new loop.
    pub async fn add_looping(&self, block_id: &str) -> Result<Automation, StoreError> {
        self.edit_selected("Error adding loop", |state, current| {
            let block_ref = state.block_ref(block_id)?;
            if state.index.looped_by(block_id).is_some() {
                return Err(StoreError::Validation(format!(
                    "block '{block_id}' is already looped"
                )));
            }
            let wrapper = self
                .definitions
                .generate_loop_block(block_id, Some(&current.definition))
                .ok_or_else(|| StoreError::Validation("no loop block definition".to_string()))?;
            Ok(editor::insert_block(&current.definition, wrapper, &block_ref.path_to)?)
        })
        .await
    }

    /// Remove the loop around a block (the wrapper and the looped step).
    pub async fn remove_looping(&self, block_id: &str) -> Result<Automation, StoreError> {
        self.edit_selected("Error removing loop", |state, current| {
            let wrapper_id = state.index.looped_by(block_id).ok_or_else(|| {
                StoreError::Validation(format!("block '{block_id}' is not looped"))
            })?;
            let wrapper_ref = state.block_ref(wrapper_id)?;
            Ok(editor::delete_block(&current.definition, &wrapper_ref.path_to)?.definition)
        })
        .await
    }

    /// Merge `update` into a block's inputs.
    ///
    /// Null and empty-string values are dropped. Returns `None` without saving
    /// when the merged inputs equal the current ones.
    pub async fn update_block_inputs(
        &self,
        block_id: &str,
        update: Map<String, Value>,
    ) -> Result<Option<Automation>, StoreError> {
        let mut state = self.state.lock().await;
        let current = state.selected()?.clone();
        let block_ref = state.block_ref(block_id)?;
        let block = block_at(&block_ref.path_to, &current.definition)?.clone();

        let mut merged = match serde_json::to_value(&block.inputs)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(update);
        merged.retain(|_, v| !(v.is_null() || v.as_str() == Some("")));
        let inputs: BlockInputs = serde_json::from_value(Value::Object(merged))?;
        if inputs == block.inputs {
            tracing::debug!(block_id, "inputs unchanged, skipping save");
            return Ok(None);
        }

        let mut updated = block.clone();
        updated.inputs = inputs;

        let mut next = current.clone();
        if updated.is_trigger() {
            next.test_data = trigger_test_data(&block, &updated, current.test_data.as_ref());
        }
        next.definition = editor::replace_block(&current.definition, updated, &block_ref.path_to)?;

        self.persist(&mut state, next, "Error saving automation")
            .await
            .map(Some)
    }

    /// Set a block's display name. A blank name clears it.
    pub async fn update_block_title(&self, block_id: &str, name: &str) -> Result<Automation, StoreError> {
        self.edit_selected("Error saving automation", |state, current| {
            state.block_ref(block_id)?;
            Ok(editor::rename_step(&current.definition, block_id, name))
        })
        .await
    }

    /// Merge `data` into the selected automation's test data.
    pub async fn add_test_data(&self, data: Map<String, Value>) -> Result<Automation, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.selected()?.clone();
        let mut merged = match next.test_data.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        merged.extend(data);
        next.test_data = Some(Value::Object(merged));
        self.persist(&mut state, next, "Error saving automation")
            .await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Bindings available to a block of the selected automation.
    ///
    /// Bindings that cannot be generated are skipped with an error
    /// notification.
    pub async fn path_bindings(&self, block_id: &str) -> Result<Vec<EnrichedBinding>, StoreError> {
        let state = self.state.lock().await;
        let current = state.selected()?;
        let block_ref = state.block_ref(block_id)?;
        let resolved =
            BindingResolver::new(&current.definition, &state.index, &state.tables).resolve(&block_ref)?;

        for skipped in &resolved.skipped {
            tracing::warn!(
                block_id,
                binding = %skipped.name,
                position = skipped.block_idx,
                reason = %skipped.reason,
                "binding skipped"
            );
        }
        if !resolved.skipped.is_empty() {
            self.events
                .publish(StoreEvent::error("Error generating binding: Step ID not found."));
        }
        Ok(resolved.bindings)
    }

    /// The last test result for a block, if any.
    pub async fn process_block_results(
        &self,
        block_id: &str,
    ) -> Result<Option<BlockTestResult>, StoreError> {
        let state = self.state.lock().await;
        let current = state.selected()?;
        let Some(response) = state.test_results.as_ref() else {
            return Ok(None);
        };
        let block_ref = state.block_ref(block_id)?;
        let block = block_at(&block_ref.path_to, &current.definition)?;
        Ok(results::process_block_results(response, block))
    }

    pub async fn evaluation_context(&self) -> Result<Value, StoreError> {
        let state = self.state.lock().await;
        let current = state.selected()?;
        Ok(results::evaluation_context(
            current,
            state.test_results.as_ref(),
            &state.tables,
        ))
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Test the selected automation. Falls back to its stored test data.
    pub async fn test(&self, test_data: Option<Value>) -> Result<TestAutomationResponse, StoreError> {
        let mut state = self.state.lock().await;
        let current = state.selected()?;
        let id = current
            .id
            .clone()
            .ok_or_else(|| StoreError::Validation("save the automation before testing".to_string()))?;
        let data = test_data
            .or_else(|| current.test_data.clone())
            .unwrap_or_else(|| json!({}));

        match self.executor.test(&id, &data).await {
            Ok(response) => {
                tracing::info!(automation_id = %id, "automation tested");
                state.test_results = Some(response.clone());
                Ok(response)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.notify_error("Automation test failed", &err);
                Err(err)
            }
        }
    }

    /// Fire a persisted automation with `payload`.
    pub async fn trigger(&self, id: &str, payload: Value) -> Result<TestAutomationResponse, StoreError> {
        let state = self.state.lock().await;
        let automation = state
            .find(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if automation.disabled {
            return Err(StoreError::Validation(format!("automation '{id}' is disabled")));
        }

        match self.executor.trigger(id, &payload).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let err = StoreError::from(err);
                self.notify_error("Error triggering automation", &err);
                Err(err)
            }
        }
    }
}

/// Test data for an updated trigger.
///
/// Switching a row trigger's table resets the sample row. App triggers keep
/// sample values only for fields that still exist.
fn trigger_test_data(before: &Block, after: &Block, test_data: Option<&Value>) -> Option<Value> {
    let kind = after.trigger_kind()?;

    if kind.is_row_trigger() {
        let table_id = after.input_str("tableId");
        if table_id != before.input_str("tableId") {
            let table_id = table_id.unwrap_or_default();
            return Some(json!({
                "row": { "tableId": table_id },
                "oldRow": { "tableId": table_id },
                "meta": {},
                "id": "",
                "revision": "",
            }));
        }
    }

    if kind == TriggerStepId::App {
        let fields = after
            .fields()
            .and_then(|f| f.get("fields"))
            .and_then(Value::as_object);
        let mut data = test_data.cloned();
        if let Some(Value::Object(sample)) = data
            .as_mut()
            .and_then(|d| d.get_mut("fields"))
        {
            sample.retain(|key, _| fields.is_some_and(|f| f.contains_key(key)));
        }
        return data;
    }

    test_data.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::testing::{child_ids, ids};
    use autoflow_types::automation::ActionStepId;
    use autoflow_types::binding::BindingSource;
    use autoflow_types::event::NotificationLevel;
    use autoflow_types::results::{AutomationResults, BlockResult};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    // --- Mock ports for testing ---

    /// In-memory repository with revision checks and a failure switch.
    #[derive(Default)]
    struct MockRepository {
        rows: StdMutex<HashMap<String, Automation>>,
        counter: AtomicU32,
        fail_writes: AtomicBool,
    }

    impl MockRepository {
        fn next_revision(&self, n: u32) -> String {
            format!("{n}-mock")
        }

        fn check_failure(&self) -> Result<(), RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(RepositoryError::Query("disk full".to_string()))
            } else {
                Ok(())
            }
        }

        fn stored(&self, id: &str) -> Option<Automation> {
            self.rows.lock().unwrap().get(id).cloned()
        }
    }

    impl AutomationRepository for MockRepository {
        async fn create(&self, automation: &Automation) -> Result<Automation, RepositoryError> {
            self.check_failure()?;
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let mut stored = automation.clone();
            stored.id = Some(format!("au_{n}"));
            stored.revision = Some(self.next_revision(1));
            self.rows
                .lock()
                .unwrap()
                .insert(format!("au_{n}"), stored.clone());
            Ok(stored)
        }

        async fn update(&self, automation: &Automation) -> Result<Automation, RepositoryError> {
            self.check_failure()?;
            let Some(id) = automation.id.clone() else {
                return self.create(automation).await;
            };
            let mut rows = self.rows.lock().unwrap();
            let existing = rows.get(&id).ok_or(RepositoryError::NotFound)?;
            if existing.revision != automation.revision {
                return Err(RepositoryError::Conflict("revision mismatch".to_string()));
            }
            let n: u32 = existing
                .revision
                .as_deref()
                .and_then(|r| r.split('-').next())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let mut stored = automation.clone();
            stored.revision = Some(self.next_revision(n + 1));
            rows.insert(id, stored.clone());
            Ok(stored)
        }

        async fn get(&self, id: &str) -> Result<Option<Automation>, RepositoryError> {
            Ok(self.stored(id))
        }

        async fn delete(&self, id: &str, revision: &str) -> Result<(), RepositoryError> {
            self.check_failure()?;
            let mut rows = self.rows.lock().unwrap();
            let existing = rows.get(id).ok_or(RepositoryError::NotFound)?;
            if existing.revision.as_deref() != Some(revision) {
                return Err(RepositoryError::Conflict("revision mismatch".to_string()));
            }
            rows.remove(id);
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Automation>, RepositoryError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    /// Executor echoing every step id as a successful result.
    struct MockExecutor;

    impl ExecutionClient for MockExecutor {
        async fn trigger(
            &self,
            automation_id: &str,
            _payload: &Value,
        ) -> Result<TestAutomationResponse, ExecutionError> {
            Err(ExecutionError::NotFound(automation_id.to_string()))
        }

        async fn test(
            &self,
            automation_id: &str,
            test_data: &Value,
        ) -> Result<TestAutomationResponse, ExecutionError> {
            Ok(TestAutomationResponse::Results(AutomationResults {
                automation_id: Some(automation_id.to_string()),
                status: None,
                trigger: BlockResult {
                    id: None,
                    step_id: StepId::Trigger(TriggerStepId::App),
                    outputs: test_data.clone(),
                },
                steps: vec![BlockResult {
                    id: Some("first".to_string()),
                    step_id: StepId::Action(ActionStepId::ServerLog),
                    outputs: json!({ "success": true }),
                }],
            }))
        }
    }

    struct MockTables(Vec<Table>);

    impl TableSchemaSource for MockTables {
        async fn list_tables(&self) -> Result<Vec<Table>, RepositoryError> {
            Ok(self.0.clone())
        }

        async fn get_table(&self, id: &str) -> Result<Option<Table>, RepositoryError> {
            Ok(self.0.iter().find(|t| t.id == id).cloned())
        }
    }

    type TestStore = AutomationStore<MockRepository, MockExecutor, MockTables>;

    fn make_store() -> TestStore {
        AutomationStore::new(
            MockRepository::default(),
            MockExecutor,
            MockTables(Vec::new()),
            &GlobalConfig::default(),
        )
    }

    fn log_step(id: &str) -> Block {
        let mut block = Block::action(ActionStepId::ServerLog);
        block.id = id.to_string();
        block
    }

    /// A saved, selected automation with steps `first`, `second`.
    async fn seeded(store: &TestStore) -> Automation {
        let mut trigger = Block::trigger(TriggerStepId::App);
        trigger.id = "trigger".to_string();
        store.create("Onboarding", trigger).await.unwrap();
        let root = [BlockPath::root(0)];
        store.add_block(log_step("second"), &root).await.unwrap();
        store.add_block(log_step("first"), &root).await.unwrap()
    }

    async fn path_of(store: &TestStore, id: &str) -> Vec<BlockPath> {
        store.block_ref(id).await.unwrap().path_to
    }

    // --- Persistence ---

    #[tokio::test]
    async fn test_create_selects_and_indexes() {
        let store = make_store();
        let saved = seeded(&store).await;

        assert!(saved.is_persisted());
        let selected = store.selected().await.unwrap();
        assert_eq!(selected.automation.id, saved.id);
        assert_eq!(ids(&selected.automation.definition.steps), vec!["first", "second"]);
        assert!(selected.index.contains("first"));
        assert_eq!(
            store.block_ref("second").await.unwrap().path_to[0].step_idx,
            2
        );
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_and_non_trigger() {
        let store = make_store();
        let err = store
            .create("  ", Block::trigger(TriggerStepId::App))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store
            .create("Flow", Block::action(ActionStepId::Delay))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_each_save_bumps_revision() {
        let store = make_store();
        let first = seeded(&store).await;
        let second = store
            .update_block_title("first", "Say hello")
            .await
            .unwrap();
        assert_ne!(first.revision, second.revision);
        assert_eq!(
            second.definition.step_names.get("first").map(String::as_str),
            Some("Say hello")
        );
    }

    #[tokio::test]
    async fn test_failed_save_keeps_snapshot_and_notifies() {
        let store = make_store();
        let before = seeded(&store).await;
        let mut rx = store.events().subscribe();

        store.repo.fail_writes.store(true, Ordering::SeqCst);
        let path = path_of(&store, "first").await;
        let err = store.add_block(log_step("third"), &path).await.unwrap_err();
        assert!(matches!(err, StoreError::Repository(_)));

        let selected = store.selected().await.unwrap();
        assert_eq!(selected.automation, before);
        assert!(!selected.index.contains("third"));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            StoreEvent::Notification {
                level: NotificationLevel::Error,
                message: "Error adding automation block".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_path_is_reported_without_saving() {
        let store = make_store();
        let before = seeded(&store).await;
        let err = store
            .add_block(log_step("x"), &[BlockPath::root(9)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Tree(TreeError::InvalidPath(_))));
        assert_eq!(store.selected().await.unwrap().automation, before);
    }

    #[tokio::test]
    async fn test_concurrent_edits_are_not_lost() {
        let store = std::sync::Arc::new(make_store());
        seeded(&store).await;

        let mut handles = Vec::new();
        for i in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let path = path_of(&store, "first").await;
                store
                    .add_block(log_step(&format!("n{i}")), &path)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let selected = store.selected().await.unwrap();
        // Two seeded steps plus five concurrent inserts, none lost.
        assert_eq!(selected.automation.definition.steps.len(), 7);
        let stored = store
            .repo
            .stored(selected.automation.id.as_deref().unwrap())
            .unwrap();
        assert_eq!(stored, selected.automation);
    }

    #[tokio::test]
    async fn test_sequential_edits_apply_in_submission_order() {
        let store = std::sync::Arc::new(make_store());
        seeded(&store).await;

        let mut anchor = "first".to_string();
        for i in 0..4 {
            let id = format!("n{i}");
            let task = {
                let store = store.clone();
                let anchor = anchor.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let path = path_of(&store, &anchor).await;
                    store.add_block(log_step(&id), &path).await.unwrap()
                })
            };
            // Each edit sees the snapshot left by the previous one.
            let saved = task.await.unwrap();
            assert_eq!(saved.definition.steps.len(), 3 + i);
            anchor = id;
        }

        let selected = store.selected().await.unwrap();
        assert_eq!(
            ids(&selected.automation.definition.steps),
            vec!["first", "n0", "n1", "n2", "n3", "second"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_toggle_and_delete() {
        let store = make_store();
        let original = seeded(&store).await;
        let id = original.id.clone().unwrap();

        let copy = store.duplicate(&id).await.unwrap();
        assert_eq!(copy.name, "Onboarding - copy");
        assert_ne!(copy.id, original.id);

        let toggled = store.toggle_disabled(&id).await.unwrap();
        assert!(toggled.disabled);

        store.delete(&id).await.unwrap();
        assert!(store.repo.stored(&id).is_none());
        let remaining = store.automations().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Onboarding - copy");
    }

    #[tokio::test]
    async fn test_fetch_sorts_by_name() {
        let store = make_store();
        store
            .create("beta", Block::trigger(TriggerStepId::Cron))
            .await
            .unwrap();
        store
            .create("Alpha", Block::trigger(TriggerStepId::Cron))
            .await
            .unwrap();
        let names: Vec<String> = store.fetch().await.unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);
    }

    // --- Structural edits ---

    #[tokio::test]
    async fn test_move_and_noop_move() {
        let store = make_store();
        seeded(&store).await;

        let first = path_of(&store, "first").await;
        let second = path_of(&store, "second").await;
        let moved = store.move_block(&first, &second).await.unwrap().unwrap();
        assert_eq!(ids(&moved.definition.steps), vec!["second", "first"]);

        let path = path_of(&store, "first").await;
        assert!(store.move_block(&path, &path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_branch_then_delete_branch() {
        let store = make_store();
        seeded(&store).await;

        let path = path_of(&store, "first").await;
        let branched = store.branch_automation(&path).await.unwrap();
        assert_eq!(branched.definition.steps.len(), 1);
        let branch_step = &branched.definition.steps[0];
        assert!(branch_step.is_branch());
        assert_eq!(child_ids(branch_step, 0), vec!["first", "second"]);

        let mut branch_path = path_of(&store, &branch_step.id).await;
        branch_path.push(BlockPath::branch(1, 0));
        let collapsed = store.delete_branch(&branch_path).await.unwrap();
        assert_eq!(ids(&collapsed.definition.steps), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_shift_branches() {
        let store = make_store();
        seeded(&store).await;
        let path = path_of(&store, "first").await;
        let branched = store.branch_automation(&path).await.unwrap();
        let branch_id = branched.definition.steps[0].id.clone();

        let mut branch_path = path_of(&store, &branch_id).await;
        branch_path.push(BlockPath::branch(0, 0));
        let shifted = store.branch_right(&branch_path).await.unwrap();
        assert_eq!(child_ids(&shifted.definition.steps[0], 1), vec!["first", "second"]);

        let err = store.branch_left(&branch_path).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Tree(TreeError::InvalidBranchIndex { index: -1, .. })
        ));
    }

    #[tokio::test]
    async fn test_add_and_remove_looping() {
        let store = make_store();
        seeded(&store).await;

        let looped = store.add_looping("second").await.unwrap();
        let steps = &looped.definition.steps;
        assert_eq!(steps.len(), 3);
        assert!(steps[1].is_loop_wrapper());
        assert_eq!(steps[1].block_to_loop.as_deref(), Some("second"));

        let selected = store.selected().await.unwrap();
        assert_eq!(selected.index.looped_by("second"), Some(steps[1].id.as_str()));
        assert!(matches!(
            store.add_looping("second").await,
            Err(StoreError::Validation(_))
        ));

        let removed = store.remove_looping("second").await.unwrap();
        assert_eq!(ids(&removed.definition.steps), vec!["first"]);
    }

    #[tokio::test]
    async fn test_update_block_inputs_merges_and_skips_unchanged() {
        let store = make_store();
        seeded(&store).await;

        let mut update = Map::new();
        update.insert("text".to_string(), json!("hello"));
        update.insert("level".to_string(), json!(""));
        let saved = store
            .update_block_inputs("first", update.clone())
            .await
            .unwrap()
            .unwrap();
        let first = &saved.definition.steps[0];
        assert_eq!(first.input_str("text"), Some("hello"));
        assert!(first.fields().unwrap().get("level").is_none());

        assert!(store
            .update_block_inputs("first", update)
            .await
            .unwrap()
            .is_none());

        let mut clear = Map::new();
        clear.insert("text".to_string(), Value::Null);
        let cleared = store
            .update_block_inputs("first", clear)
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.definition.steps[0].fields().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_row_trigger_table_change_resets_test_data() {
        let store = make_store();
        let mut trigger = Block::trigger(TriggerStepId::RowSaved);
        trigger.id = "trigger".to_string();
        store.create("Rows", trigger).await.unwrap();

        let mut update = Map::new();
        update.insert("tableId".to_string(), json!("ta_people"));
        let saved = store
            .update_block_inputs("trigger", update)
            .await
            .unwrap()
            .unwrap();
        let test_data = saved.test_data.unwrap();
        assert_eq!(test_data["row"]["tableId"], json!("ta_people"));
        assert_eq!(test_data["id"], json!(""));
    }

    // --- History ---

    #[tokio::test]
    async fn test_undo_redo_edit() {
        let store = make_store();
        seeded(&store).await;
        store.update_block_title("first", "Greeting").await.unwrap();

        store.undo().await.unwrap();
        let selected = store.selected().await.unwrap();
        assert!(selected.automation.definition.step_names.is_empty());

        store.redo().await.unwrap();
        let selected = store.selected().await.unwrap();
        assert_eq!(
            selected.automation.definition.step_names.get("first").map(String::as_str),
            Some("Greeting")
        );
    }

    #[tokio::test]
    async fn test_undo_delete_recreates_with_new_id() {
        let store = make_store();
        let saved = seeded(&store).await;
        let old_id = saved.id.clone().unwrap();
        store.delete(&old_id).await.unwrap();
        assert!(store.automations().await.is_empty());

        store.undo().await.unwrap();
        let restored = store.automations().await;
        assert_eq!(restored.len(), 1);
        assert_ne!(restored[0].id.as_deref(), Some(old_id.as_str()));
        assert_eq!(ids(&restored[0].definition.steps), vec!["first", "second"]);

        // Redo deletes the recreated document.
        store.redo().await.unwrap();
        assert!(store.automations().await.is_empty());
    }

    #[tokio::test]
    async fn test_undo_with_empty_history() {
        let store = make_store();
        assert!(matches!(store.undo().await, Err(StoreError::NothingToUndo)));
        assert!(matches!(store.redo().await, Err(StoreError::NothingToRedo)));
    }

    // --- Queries and execution ---

    #[tokio::test]
    async fn test_path_bindings_for_selected() {
        let store = make_store();
        seeded(&store).await;
        let first = store
            .construct_block(StepId::Action(ActionStepId::CreateRow))
            .await
            .unwrap();
        let first_id = first.id.clone();
        store
            .add_block(first, &[BlockPath::root(0)])
            .await
            .unwrap();

        let bindings = store.path_bindings("second").await.unwrap();
        let row = bindings
            .iter()
            .find(|b| b.runtime_binding == format!("steps.{first_id}.row"))
            .unwrap();
        assert_eq!(row.readable_binding, "steps.Create Row.row");
        assert_eq!(row.source, BindingSource::Step);

        assert!(matches!(
            store.path_bindings("missing").await,
            Err(StoreError::UnknownBlock(_))
        ));
    }

    #[tokio::test]
    async fn test_test_run_feeds_results_and_context() {
        let store = make_store();
        seeded(&store).await;
        assert!(store.process_block_results("first").await.unwrap().is_none());

        store.test(Some(json!({ "fields": { "a": 1 } }))).await.unwrap();

        let result = store.process_block_results("first").await.unwrap();
        assert!(matches!(result, Some(BlockTestResult::Step(_))));

        let context = store.evaluation_context().await.unwrap();
        assert_eq!(context["trigger"]["fields"]["a"], json!(1));
        assert_eq!(context["steps"]["first"]["success"], json!(true));
    }

    #[tokio::test]
    async fn test_trigger_error_notifies() {
        let store = make_store();
        let saved = seeded(&store).await;
        let mut rx = store.events().subscribe();
        let err = store
            .trigger(saved.id.as_deref().unwrap(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Execution(_)));
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::error("Error triggering automation"));
    }

    #[tokio::test]
    async fn test_refresh_tables() {
        let store = AutomationStore::new(
            MockRepository::default(),
            MockExecutor,
            MockTables(vec![Table {
                id: "ta_1".to_string(),
                name: "People".to_string(),
                schema: Default::default(),
            }]),
            &GlobalConfig::default(),
        );
        assert_eq!(store.refresh_tables().await.unwrap(), 1);
    }
}
