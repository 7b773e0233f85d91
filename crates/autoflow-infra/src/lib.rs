//! Infrastructure layer for Autoflow.
//!
//! Implementations of the ports defined in `autoflow-core`: SQLite automation
//! storage, the HTTP client for the automation runtime, and the JSON table
//! schema source. Also loads `config.toml` from the data directory.

pub mod config;
pub mod executor;
pub mod sqlite;
pub mod table;
