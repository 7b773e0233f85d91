//! Application state wiring the store to its infrastructure.
//!
//! The store is generic over its ports; `AppState` pins it to the SQLite
//! repository, the HTTP runtime client and the JSON table source.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use autoflow_core::automation::AutomationStore;
use autoflow_infra::config::{data_dir, load_global_config};
use autoflow_infra::executor::HttpExecutionClient;
use autoflow_infra::sqlite::{DatabasePool, SqliteAutomationRepository, database_url};
use autoflow_infra::table::JsonTableSource;
use autoflow_types::config::GlobalConfig;

/// Store pinned to the concrete infra implementations.
pub type ConcreteStore =
    AutomationStore<SqliteAutomationRepository, HttpExecutionClient, JsonTableSource>;

/// Shared state for CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConcreteStore>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the database, load config and table schemas, and fetch the
    /// automation list.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;

        let db_url = format!(
            "{}?mode=rwc",
            database_url(&data_dir, &config.database_file)
        );
        let db_pool = DatabasePool::new(&db_url)
            .await
            .context("failed to open the automation database")?;

        let tables = JsonTableSource::load(&data_dir.join("tables.json")).await?;
        let executor = HttpExecutionClient::new(config.executor_url.clone())?;

        let store = AutomationStore::new(
            SqliteAutomationRepository::new(db_pool),
            executor,
            tables,
            &config,
        );
        store.fetch().await?;
        store.refresh_tables().await?;

        Ok(Self {
            store: Arc::new(store),
            config,
            data_dir,
        })
    }

    /// Load and select an automation by id.
    pub async fn select(&self, automation_id: &str) -> anyhow::Result<()> {
        self.store
            .select(automation_id)
            .await
            .with_context(|| format!("no automation with id '{automation_id}'"))
    }
}
