//! Execution collaborator trait.
//!
//! Running automations is out of scope for the editor; the store only asks an
//! external executor to trigger or test a persisted automation and keeps the
//! response for result lookup.

use autoflow_types::error::ExecutionError;
use autoflow_types::results::TestAutomationResponse;
use serde_json::Value;

pub trait ExecutionClient: Send + Sync {
    /// Fire the automation with `payload` as trigger input.
    fn trigger(
        &self,
        automation_id: &str,
        payload: &Value,
    ) -> impl std::future::Future<Output = Result<TestAutomationResponse, ExecutionError>> + Send;

    /// Run the automation against test data and return every block's outputs.
    fn test(
        &self,
        automation_id: &str,
        test_data: &Value,
    ) -> impl std::future::Future<Output = Result<TestAutomationResponse, ExecutionError>> + Send;
}
