//! Repository trait definitions (ports).
//!
//! These traits define the storage and execution interfaces that the
//! infrastructure layer (autoflow-infra) implements. The core crate never
//! depends on any specific storage technology.

pub mod automation;
pub mod execution;
pub mod table;

pub use automation::AutomationRepository;
pub use execution::ExecutionClient;
pub use table::TableSchemaSource;
