//! Table schema source trait.

use autoflow_types::error::RepositoryError;
use autoflow_types::table::Table;

/// Read-only access to table schemas, used to enrich row trigger bindings.
pub trait TableSchemaSource: Send + Sync {
    fn list_tables(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Table>, RepositoryError>> + Send;

    fn get_table(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Table>, RepositoryError>> + Send;
}
