use crate::domain::ports::StateStorage;
use crate::utils::error::{LimanError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// State storage kept in process memory. Used by tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryStateStorage {
    executor_states: RwLock<HashMap<Uuid, Value>>,
    actor_states: RwLock<HashMap<Uuid, HashMap<Uuid, Value>>>,
}

impl InMemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn save_executor_state(&self, execution_id: Uuid, state: Value) -> Result<()> {
        self.executor_states.write().await.insert(execution_id, state);
        Ok(())
    }

    async fn load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>> {
        Ok(self.executor_states.read().await.get(&execution_id).cloned())
    }

    async fn save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> Result<()> {
        self.actor_states
            .write()
            .await
            .entry(execution_id)
            .or_default()
            .insert(actor_id, state);
        Ok(())
    }

    async fn load_actor_state(&self, execution_id: Uuid, actor_id: Uuid) -> Result<Option<Value>> {
        Ok(self
            .actor_states
            .read()
            .await
            .get(&execution_id)
            .and_then(|states| states.get(&actor_id))
            .cloned())
    }

    async fn delete_execution_state(&self, execution_id: Uuid) -> Result<()> {
        self.executor_states.write().await.remove(&execution_id);
        self.actor_states.write().await.remove(&execution_id);
        Ok(())
    }
}

/// File-backed state storage:
///
/// ```text
/// {base_path}/{execution_id}/executor.json
/// {base_path}/{execution_id}/actors/{actor_id}.json
/// ```
#[derive(Debug, Clone)]
pub struct LocalStateStorage {
    base_path: PathBuf,
}

impl LocalStateStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn execution_dir(&self, execution_id: Uuid) -> PathBuf {
        self.base_path.join(execution_id.to_string())
    }

    fn actor_path(&self, execution_id: Uuid, actor_id: Uuid) -> PathBuf {
        self.execution_dir(execution_id)
            .join("actors")
            .join(format!("{}.json", actor_id))
    }

    async fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(value)?;
        fs::write(path, data).await?;
        debug!("Saved state to {}", path.display());
        Ok(())
    }

    async fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        match fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data).map(Some).map_err(|e| {
                LimanError::Storage {
                    message: format!("Corrupted state file {}: {}", path.display(), e),
                }
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateStorage for LocalStateStorage {
    async fn save_executor_state(&self, execution_id: Uuid, state: Value) -> Result<()> {
        let path = self.execution_dir(execution_id).join("executor.json");
        self.write_json(&path, &state).await
    }

    async fn load_executor_state(&self, execution_id: Uuid) -> Result<Option<Value>> {
        let path = self.execution_dir(execution_id).join("executor.json");
        self.read_json(&path).await
    }

    async fn save_actor_state(
        &self,
        execution_id: Uuid,
        actor_id: Uuid,
        state: Value,
    ) -> Result<()> {
        self.write_json(&self.actor_path(execution_id, actor_id), &state)
            .await
    }

    async fn load_actor_state(&self, execution_id: Uuid, actor_id: Uuid) -> Result<Option<Value>> {
        self.read_json(&self.actor_path(execution_id, actor_id))
            .await
    }

    async fn delete_execution_state(&self, execution_id: Uuid) -> Result<()> {
        match fs::remove_dir_all(self.execution_dir(execution_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
