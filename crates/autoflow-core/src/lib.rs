//! Automation editing logic and repository trait definitions for Autoflow.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `autoflow-types` -- never on
//! `autoflow-infra` or any database/IO crate.

pub mod automation;
pub mod event;
pub mod repository;
