//! Automation repository trait definition.
//!
//! Defines the storage interface for automation documents. The infrastructure
//! layer (autoflow-infra) implements this trait with SQLite persistence.

use autoflow_types::automation::Automation;
use autoflow_types::error::RepositoryError;

/// Repository trait for automation persistence.
///
/// Revisions are optimistic concurrency tokens: every write returns the
/// stored document with a new revision, and a write carrying a stale revision
/// fails with `RepositoryError::Conflict`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait AutomationRepository: Send + Sync {
    /// Store a new automation and assign its id and revision.
    fn create(
        &self,
        automation: &Automation,
    ) -> impl std::future::Future<Output = Result<Automation, RepositoryError>> + Send;

    /// Update an existing automation. Requires `id` and `revision`; without
    /// them this behaves as `create`.
    fn update(
        &self,
        automation: &Automation,
    ) -> impl std::future::Future<Output = Result<Automation, RepositoryError>> + Send;

    /// Get an automation by id.
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Automation>, RepositoryError>> + Send;

    /// Delete an automation at the given revision.
    fn delete(
        &self,
        id: &str,
        revision: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all automations.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Automation>, RepositoryError>> + Send;
}
