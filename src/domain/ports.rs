use crate::domain::model::{Message, NodeState};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Language model used by LLM nodes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// `tools` holds the JSON schemas of the tools the node may call.
    async fn invoke(&self, messages: &[Message], tools: &[Value]) -> Result<Message>;
}

/// Persistence of executor trees and node actor states.
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn save_executor_state(&self, execution_id: Uuid, state: Value) -> Result<()>;
    async fn load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>>;
    async fn save_actor_state(&self, execution_id: Uuid, actor_id: Uuid, state: Value)
        -> Result<()>;
    async fn load_actor_state(&self, execution_id: Uuid, actor_id: Uuid) -> Result<Option<Value>>;
    async fn delete_execution_state(&self, execution_id: Uuid) -> Result<()>;
}

/// Extends component specs with an extra field and hooks into actor setup.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Existing kinds whose specs receive the plugin field.
    fn applies_to(&self) -> Vec<String>;

    /// New component kinds introduced by the plugin.
    fn registered_kinds(&self) -> Vec<String> {
        Vec::new()
    }

    fn field_name(&self) -> &str;

    /// Validates (and may normalize) the plugin field of a spec.
    fn validate(&self, value: &Value) -> Result<Value>;

    /// Called while a node actor is initialized.
    fn apply(&self, _state: &mut NodeState, _field: Option<&Value>) -> Result<()> {
        Ok(())
    }
}
