//! SQLite automation repository implementation.
//!
//! Implements `AutomationRepository` from `autoflow-core`. Definitions and
//! test data are stored as JSON text; revisions have the form `<n>-<hex>`
//! where `n` counts writes to the document.

use autoflow_core::repository::AutomationRepository;
use autoflow_types::automation::Automation;
use autoflow_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `AutomationRepository`.
pub struct SqliteAutomationRepository {
    pool: DatabasePool,
}

impl SqliteAutomationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to a domain `Automation`.
struct AutomationRow {
    id: String,
    revision: String,
    name: String,
    definition: String,
    test_data: Option<String>,
    disabled: bool,
}

impl AutomationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            revision: row.try_get("revision")?,
            name: row.try_get("name")?,
            definition: row.try_get("definition")?,
            test_data: row.try_get("test_data")?,
            disabled: row.try_get("disabled")?,
        })
    }

    fn into_automation(self) -> Result<Automation, RepositoryError> {
        let definition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid definition JSON: {e}")))?;
        let test_data = self
            .test_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid test data JSON: {e}")))?;

        Ok(Automation {
            id: Some(self.id),
            revision: Some(self.revision),
            name: self.name,
            definition,
            test_data,
            disabled: self.disabled,
        })
    }
}

fn new_revision(generation: u64) -> String {
    let nonce = Uuid::now_v7().simple().to_string();
    format!("{generation}-{}", &nonce[nonce.len() - 12..])
}

fn revision_generation(revision: &str) -> Result<u64, RepositoryError> {
    revision
        .split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .ok_or_else(|| RepositoryError::Conflict(format!("malformed revision '{revision}'")))
}

/// JSON columns of an automation: (definition, test_data).
fn encode(automation: &Automation) -> Result<(String, Option<String>), RepositoryError> {
    let definition = serde_json::to_string(&automation.definition)
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let test_data = automation
        .test_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok((definition, test_data))
}

impl SqliteAutomationRepository {
    async fn exists(&self, id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM automations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(row.is_some())
    }

    /// Explain a write that matched no row.
    async fn missed_write(&self, id: &str, revision: &str) -> RepositoryError {
        match self.exists(id).await {
            Ok(true) => RepositoryError::Conflict(format!(
                "automation '{id}' is not at revision '{revision}'"
            )),
            Ok(false) => RepositoryError::NotFound,
            Err(e) => e,
        }
    }
}

impl AutomationRepository for SqliteAutomationRepository {
    async fn create(&self, automation: &Automation) -> Result<Automation, RepositoryError> {
        let (definition, test_data) = encode(automation)?;
        let id = automation
            .id
            .clone()
            .unwrap_or_else(|| format!("au_{}", Uuid::now_v7().simple()));
        let revision = new_revision(1);
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO automations (id, revision, name, definition, test_data, disabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&revision)
        .bind(&automation.name)
        .bind(&definition)
        .bind(&test_data)
        .bind(automation.disabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(automation_id = %id, %revision, "automation created");
                let mut stored = automation.clone();
                stored.id = Some(id);
                stored.revision = Some(revision);
                Ok(stored)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("automation '{id}' already exists")),
            ),
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn update(&self, automation: &Automation) -> Result<Automation, RepositoryError> {
        let (Some(id), Some(current)) = (automation.id.as_deref(), automation.revision.as_deref())
        else {
            return self.create(automation).await;
        };

        let (definition, test_data) = encode(automation)?;
        let revision = new_revision(revision_generation(current)? + 1);

        let result = sqlx::query(
            "UPDATE automations
             SET revision = ?, name = ?, definition = ?, test_data = ?, disabled = ?, updated_at = ?
             WHERE id = ? AND revision = ?",
        )
        .bind(&revision)
        .bind(&automation.name)
        .bind(&definition)
        .bind(&test_data)
        .bind(automation.disabled)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(current)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.missed_write(id, current).await);
        }

        tracing::debug!(automation_id = %id, %revision, "automation updated");
        let mut stored = automation.clone();
        stored.revision = Some(revision);
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Automation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM automations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| {
            AutomationRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_automation()
        })
        .transpose()
    }

    async fn delete(&self, id: &str, revision: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM automations WHERE id = ? AND revision = ?")
            .bind(id)
            .bind(revision)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.missed_write(id, revision).await);
        }
        tracing::debug!(automation_id = %id, "automation deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Automation>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM automations ORDER BY name COLLATE NOCASE")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                AutomationRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_automation()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_types::automation::{ActionStepId, Block, TriggerStepId};
    use serde_json::json;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_automation(name: &str) -> Automation {
        let mut automation = Automation::new(name, Block::trigger(TriggerStepId::App));
        automation
            .definition
            .steps
            .push(Block::action(ActionStepId::ServerLog));
        automation
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let created = repo.create(&make_automation("Welcome")).await.unwrap();

        let id = created.id.clone().unwrap();
        assert!(id.starts_with("au_"));
        assert!(created.revision.as_deref().unwrap().starts_with("1-"));

        let fetched = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.definition.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        assert!(repo.get("au_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_bumps_revision() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let mut automation = repo.create(&make_automation("Welcome")).await.unwrap();
        automation.test_data = Some(json!({ "fields": { "email": "a@b.c" } }));

        let updated = repo.update(&automation).await.unwrap();
        assert!(updated.revision.as_deref().unwrap().starts_with("2-"));

        let fetched = repo.get(updated.id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched.test_data, automation.test_data);
        assert_eq!(fetched.revision, updated.revision);
    }

    #[tokio::test]
    async fn test_update_stale_revision_conflicts() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let created = repo.create(&make_automation("Welcome")).await.unwrap();
        repo.update(&created).await.unwrap();

        let result = repo.update(&created).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let mut automation = make_automation("Ghost");
        automation.id = Some("au_ghost".to_string());
        automation.revision = Some("1-abc".to_string());

        let result = repo.update(&automation).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_without_revision_creates() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let created = repo.update(&make_automation("Fresh")).await.unwrap();
        assert!(created.is_persisted());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_checks_revision() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        let created = repo.create(&make_automation("Welcome")).await.unwrap();
        let id = created.id.clone().unwrap();

        let stale = repo.delete(&id, "0-000000000000").await;
        assert!(matches!(stale, Err(RepositoryError::Conflict(_))));

        repo.delete(&id, created.revision.as_deref().unwrap())
            .await
            .unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());

        let again = repo.delete(&id, "1-abc").await;
        assert!(matches!(again, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_sorted_by_name() {
        let repo = SqliteAutomationRepository::new(test_pool().await);
        repo.create(&make_automation("beta")).await.unwrap();
        repo.create(&make_automation("Alpha")).await.unwrap();
        repo.create(&make_automation("gamma")).await.unwrap();

        let names: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_revision_generation() {
        assert_eq!(revision_generation("7-abcdef").unwrap(), 7);
        assert!(revision_generation("garbage").is_err());
        assert!(new_revision(3).starts_with("3-"));
    }
}
