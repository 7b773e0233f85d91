//! Automation editing: tree addressing, structural edits, bindings and the
//! persistence-backed store.

pub mod binding;
pub mod definitions;
pub mod editor;
pub mod history;
pub mod results;
pub mod store;
pub mod tree;

#[cfg(test)]
mod testing;

pub use binding::{BindingResolver, ResolvedBindings, SkippedBinding};
pub use definitions::{BlockDefinition, BlockDefinitions};
pub use editor::{Deletion, ShiftDirection};
pub use history::{History, HistoryOperation};
pub use results::BlockTestResult;
pub use store::{AutomationStore, SelectedAutomation, StoreError};
pub use tree::{TreeIndex, resolve_path, traverse};
