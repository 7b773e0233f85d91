//! SQLite storage layer.
//!
//! Automation repository backed by SQLite with WAL mode and split read/write
//! connection pools.

pub mod automation;
pub mod pool;

pub use automation::SqliteAutomationRepository;
pub use pool::{DatabasePool, database_url};
