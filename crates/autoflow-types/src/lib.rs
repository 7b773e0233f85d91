//! Shared domain types for Autoflow.
//!
//! This crate contains the automation document model (trigger + step tree),
//! the flat path addressing scheme, binding and execution result shapes,
//! table schemas, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod automation;
pub mod binding;
pub mod config;
pub mod error;
pub mod event;
pub mod path;
pub mod results;
pub mod table;
