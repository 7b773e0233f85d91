//! HTTP client for the automation runtime.
//!
//! Test and trigger runs are delegated to a running automation server:
//! `POST {base}/api/automations/{id}/test` and `.../trigger`, both taking the
//! trigger payload as the JSON body.

use std::time::Duration;

use autoflow_core::repository::ExecutionClient;
use autoflow_types::error::ExecutionError;
use autoflow_types::results::TestAutomationResponse;
use reqwest::StatusCode;
use serde_json::Value;

/// `ExecutionClient` backed by the runtime's HTTP API.
pub struct HttpExecutionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ExecutionError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, automation_id: &str, action: &str) -> String {
        format!(
            "{}/api/automations/{automation_id}/{action}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn post(
        &self,
        automation_id: &str,
        action: &str,
        body: &Value,
    ) -> Result<TestAutomationResponse, ExecutionError> {
        let url = self.url(automation_id, action);
        tracing::debug!(%url, "calling automation runtime");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ExecutionError::Request(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, automation_id, error_body));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutionError::Request(format!("failed to parse response: {e}")))
    }
}

fn status_error(status: StatusCode, automation_id: &str, body: String) -> ExecutionError {
    match status {
        StatusCode::NOT_FOUND => ExecutionError::NotFound(automation_id.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
            ExecutionError::Rejected(body)
        }
        _ => ExecutionError::Request(format!("HTTP {status}: {body}")),
    }
}

impl ExecutionClient for HttpExecutionClient {
    async fn trigger(
        &self,
        automation_id: &str,
        payload: &Value,
    ) -> Result<TestAutomationResponse, ExecutionError> {
        self.post(automation_id, "trigger", payload).await
    }

    async fn test(
        &self,
        automation_id: &str,
        test_data: &Value,
    ) -> Result<TestAutomationResponse, ExecutionError> {
        self.post(automation_id, "test", test_data).await
    }
}
