//! Table schemas loaded from a JSON file.
//!
//! Table storage lives outside the editor. The CLI reads a snapshot of the
//! schemas from `{data_dir}/tables.json`, an array of `Table` objects, so row
//! trigger bindings can be resolved offline.

use std::path::Path;

use autoflow_core::repository::TableSchemaSource;
use autoflow_types::error::RepositoryError;
use autoflow_types::table::Table;

/// In-memory `TableSchemaSource`.
#[derive(Debug, Clone, Default)]
pub struct JsonTableSource {
    tables: Vec<Table>,
}

impl JsonTableSource {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Load `path`. A missing file yields an empty source.
    pub async fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No table schemas at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(RepositoryError::Query(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        let tables: Vec<Table> = serde_json::from_str(&content).map_err(|e| {
            RepositoryError::Query(format!("invalid table schemas in {}: {e}", path.display()))
        })?;
        tracing::debug!(count = tables.len(), "loaded table schemas");
        Ok(Self { tables })
    }
}

impl TableSchemaSource for JsonTableSource {
    async fn list_tables(&self) -> Result<Vec<Table>, RepositoryError> {
        Ok(self.tables.clone())
    }

    async fn get_table(&self, id: &str) -> Result<Option<Table>, RepositoryError> {
        Ok(self.tables.iter().find(|t| t.id == id).cloned())
    }
}
