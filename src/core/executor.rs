//! Drives node actors through a flow, forking child executors when a node
//! fans out to several next nodes.

use crate::core::actor::{NextNode, NodeActor};
use crate::core::nodes::Node;
use crate::core::registry::Registry;
use crate::domain::model::NodeOutput;
use crate::domain::ports::{ChatModel, StateStorage};
use crate::utils::error::{LimanError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInput {
    pub execution_id: Uuid,
    pub node_actor_id: Uuid,
    pub node_input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    pub execution_id: Uuid,
    pub node_actor_id: Uuid,
    pub node_output: NodeOutput,
    pub exit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

/// Snapshot of one executor of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorState {
    pub execution_id: Uuid,
    pub node_actor_id: Uuid,
    pub status: ExecutorStatus,
    #[serde(default)]
    pub child_executor_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub iteration_count: usize,
    #[serde(default)]
    pub is_child: bool,
}

type ChildRun = (usize, Executor, Result<ExecutorOutput>);

pub struct Executor {
    registry: Arc<Registry>,
    storage: Arc<dyn StateStorage>,
    llm: Option<Arc<dyn ChatModel>>,
    state: ExecutorState,
    max_iterations: usize,
    actors: HashMap<Uuid, NodeActor>,
    children: Vec<Executor>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("state", &self.state)
            .field("max_iterations", &self.max_iterations)
            .field("actors", &self.actors.len())
            .field("children", &self.children)
            .finish()
    }
}

impl Executor {
    pub fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn StateStorage>,
        actor: NodeActor,
        llm: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        Self::build(registry, storage, actor, llm, false)
    }

    fn build(
        registry: Arc<Registry>,
        storage: Arc<dyn StateStorage>,
        actor: NodeActor,
        llm: Option<Arc<dyn ChatModel>>,
        is_child: bool,
    ) -> Self {
        let state = ExecutorState {
            execution_id: Uuid::new_v4(),
            node_actor_id: actor.id(),
            status: ExecutorStatus::Running,
            child_executor_ids: BTreeSet::new(),
            iteration_count: 0,
            is_child,
        };
        let mut actors = HashMap::new();
        actors.insert(actor.id(), actor);

        Self {
            registry,
            storage,
            llm,
            state,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            actors,
            children: Vec::new(),
        }
    }

    /// Iteration limit used by [`Executor::run`], usually
    /// `runtime.max_iterations` from the settings.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn execution_id(&self) -> Uuid {
        self.state.execution_id
    }

    pub fn is_child(&self) -> bool {
        self.state.is_child
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    pub fn children(&self) -> &[Executor] {
        &self.children
    }

    pub fn actor(&self, actor_id: Uuid) -> Option<&NodeActor> {
        self.actors.get(&actor_id)
    }

    /// Input addressed to the actor the executor was created with.
    pub fn input(&self, node_input: Value) -> ExecutorInput {
        ExecutorInput {
            execution_id: self.state.execution_id,
            node_actor_id: self.state.node_actor_id,
            node_input,
        }
    }

    /// Runs [`Executor::step`] with the configured iteration limit.
    pub async fn run(&mut self, input: ExecutorInput) -> Result<ExecutorOutput> {
        self.step(input, self.max_iterations).await
    }

    /// Executes actors until a node has no next nodes.
    ///
    /// A single next node continues in this executor. Several next nodes run
    /// in child executors and their outputs return, as a list, to the actor
    /// that fanned out.
    pub async fn step(
        &mut self,
        input: ExecutorInput,
        max_iterations: usize,
    ) -> Result<ExecutorOutput> {
        let mut input = input;

        while self.state.iteration_count < max_iterations {
            self.state.iteration_count += 1;
            self.state.node_actor_id = input.node_actor_id;
            self.state.status = ExecutorStatus::Running;
            self.save_state().await?;

            let execution_id = self.state.execution_id;
            let Some(actor) = self.actors.get_mut(&input.node_actor_id) else {
                return Err(self
                    .fail(format!(
                        "Target node actor with ID {} not found",
                        input.node_actor_id
                    ))
                    .await);
            };
            let actor_id = actor.id();

            let result = match actor.execute(input.node_input, execution_id, None).await {
                Ok(result) => result,
                Err(e) => {
                    self.state.status = ExecutorStatus::Failed;
                    self.save_state_quietly().await;
                    return Err(e);
                }
            };
            let actor_state = actor.serialize_state();
            self.storage
                .save_actor_state(execution_id, actor_id, actor_state)
                .await?;

            let mut next_nodes = result.next_nodes;
            match next_nodes.len() {
                0 => {
                    self.state.status = ExecutorStatus::Completed;
                    self.save_state().await?;
                    debug!(execution_id = %execution_id, "Execution completed");
                    return Ok(ExecutorOutput {
                        execution_id,
                        node_actor_id: actor_id,
                        node_output: result.output,
                        exit: true,
                    });
                }
                1 => {
                    let next = next_nodes.remove(0);
                    let next_actor_id = self.get_or_create_actor(next.node).await?;
                    input = ExecutorInput {
                        execution_id,
                        node_actor_id: next_actor_id,
                        node_input: next.input,
                    };
                }
                _ => {
                    let outputs = self.execute_parallel(next_nodes, max_iterations).await?;
                    input = ExecutorInput {
                        execution_id,
                        node_actor_id: actor_id,
                        node_input: Value::Array(
                            outputs
                                .iter()
                                .map(|output| output.node_output.to_value())
                                .collect(),
                        ),
                    };
                }
            }
        }

        Err(self
            .fail(format!(
                "Execution exceeded max iterations ({})",
                max_iterations
            ))
            .await)
    }

    async fn fail(&mut self, message: String) -> LimanError {
        self.state.status = ExecutorStatus::Failed;
        self.save_state_quietly().await;
        warn!(execution_id = %self.state.execution_id, "{}", message);
        LimanError::Executor { message }
    }

    async fn save_state_quietly(&self) {
        if let Err(e) = self.save_state().await {
            warn!(execution_id = %self.state.execution_id, "Failed to save executor state: {}", e);
        }
    }

    /// Actors are reused per node within one executor so an LLM node keeps
    /// its conversation when the flow returns to it.
    async fn get_or_create_actor(&mut self, node: Arc<Node>) -> Result<Uuid> {
        let key = node.key();
        if let Some(actor) = self.actors.values().find(|actor| actor.node().key() == key) {
            return Ok(actor.id());
        }

        let actor = NodeActor::create(node, Arc::clone(&self.registry), self.llm.clone())?;
        let actor_id = actor.id();
        self.storage
            .save_actor_state(self.state.execution_id, actor_id, actor.serialize_state())
            .await?;
        self.actors.insert(actor_id, actor);
        Ok(actor_id)
    }

    async fn execute_parallel(
        &mut self,
        next_nodes: Vec<NextNode>,
        max_iterations: usize,
    ) -> Result<Vec<ExecutorOutput>> {
        let mut inputs = Vec::with_capacity(next_nodes.len());
        for next in next_nodes {
            let actor = NodeActor::create(next.node, Arc::clone(&self.registry), self.llm.clone())?;
            let child = Self::build(
                Arc::clone(&self.registry),
                Arc::clone(&self.storage),
                actor,
                self.llm.clone(),
                true,
            )
            .with_max_iterations(max_iterations);
            self.state.child_executor_ids.insert(child.execution_id());
            inputs.push(child.input(next.input));
            self.children.push(child);
        }

        self.state.status = ExecutorStatus::Suspended;
        self.save_state().await?;
        info!(
            execution_id = %self.state.execution_id,
            "Forked {} child executor(s)",
            inputs.len()
        );

        let forked = self.children.split_off(self.children.len() - inputs.len());
        let mut tasks = JoinSet::new();
        for (index, (child, input)) in forked.into_iter().zip(inputs).enumerate() {
            tasks.spawn(run_child(index, child, input, max_iterations));
        }

        let mut finished = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => finished.push(run),
                Err(e) => warn!(execution_id = %self.state.execution_id, "Child executor task failed: {}", e),
            }
        }
        finished.sort_by_key(|(index, _, _)| *index);

        let mut outputs = Vec::with_capacity(finished.len());
        for (_, child, result) in finished {
            match result {
                Ok(output) => outputs.push(output),
                Err(e) => warn!(execution_id = %child.execution_id(), "Child executor failed: {}", e),
            }
            self.children.push(child);
        }

        self.state.status = ExecutorStatus::Running;
        self.save_state().await?;
        Ok(outputs)
    }

    /// Saves the whole executor tree under the root execution id. Child
    /// executors only save their own actor states.
    pub async fn save_state(&self) -> Result<()> {
        if self.state.is_child {
            return Ok(());
        }

        let mut snapshot = Map::new();
        let mut actor_states = Vec::new();
        let mut stack = vec![self];
        while let Some(executor) = stack.pop() {
            snapshot.insert(
                executor.state.execution_id.to_string(),
                serde_json::to_value(&executor.state)?,
            );
            for actor in executor.actors.values() {
                actor_states.push((actor.id(), actor.serialize_state()));
            }
            stack.extend(executor.children.iter());
        }

        let execution_id = self.state.execution_id;
        for (actor_id, state) in actor_states {
            self.storage
                .save_actor_state(execution_id, actor_id, state)
                .await?;
        }
        self.storage
            .save_executor_state(execution_id, Value::Object(snapshot))
            .await
    }
}

fn run_child(
    index: usize,
    mut child: Executor,
    input: ExecutorInput,
    max_iterations: usize,
) -> Pin<Box<dyn Future<Output = ChildRun> + Send>> {
    Box::pin(async move {
        let result = child.step(input, max_iterations).await;
        (index, child, result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryStateStorage;
    use crate::core::nodes::NodeOptions;
    use crate::domain::spec::NodeKind;
    use serde_json::json;

    fn function(name: &str, edges: Value) -> Value {
        json!({"kind": "FunctionNode", "name": name, "func": "lib.test.add_one", "nodes": edges})
    }

    fn registry(decls: Vec<Value>) -> Arc<Registry> {
        let mut registry = Registry::new();
        for decl in decls {
            registry.load_value(decl, NodeOptions::default()).unwrap();
        }
        let functions = registry.functions_mut();
        functions
            .register("lib.test.add_one", |input: Value, _ctx| async move {
                Ok(json!({"n": input["n"].as_i64().unwrap_or(0) + 1}))
            })
            .unwrap();
        functions
            .register("lib.test.merge", |input: Value, _ctx| async move {
                match input {
                    Value::Array(items) => Ok(json!({"merged": items})),
                    other => Ok(json!({"n": other["n"].as_i64().unwrap_or(0) + 1})),
                }
            })
            .unwrap();
        Arc::new(registry)
    }

    fn executor(registry: &Arc<Registry>, storage: &Arc<InMemoryStateStorage>, start: &str) -> Executor {
        let node = registry.lookup(NodeKind::FunctionNode, start).unwrap();
        let actor = NodeActor::create(node, Arc::clone(registry), None).unwrap();
        Executor::new(Arc::clone(registry), storage.clone(), actor, None)
    }

    #[tokio::test]
    async fn test_sequential_flow() {
        let registry = registry(vec![
            function("first", json!([{"target": "second"}])),
            function("second", json!([])),
        ]);
        let storage = Arc::new(InMemoryStateStorage::new());
        let mut executor = executor(&registry, &storage, "first");

        let input = executor.input(json!({"n": 1}));
        let output = executor.step(input, DEFAULT_MAX_ITERATIONS).await.unwrap();

        assert!(output.exit);
        assert_eq!(output.node_output, NodeOutput::Value(json!({"n": 3})));
        assert_eq!(executor.state().status, ExecutorStatus::Completed);
        assert_eq!(executor.state().iteration_count, 2);

        let snapshot = storage
            .load_executor_state(executor.execution_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot[executor.execution_id().to_string()]["status"],
            json!("completed")
        );
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let registry = registry(vec![function("looping", json!([{"target": "looping"}]))]);
        let storage = Arc::new(InMemoryStateStorage::new());
        let mut executor = executor(&registry, &storage, "looping");

        let input = executor.input(json!({"n": 0}));
        let error = executor.step(input, 3).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "Execution failed: Execution exceeded max iterations (3)"
        );
        assert_eq!(executor.state().status, ExecutorStatus::Failed);
        assert_eq!(executor.state().iteration_count, 3);
    }

    #[tokio::test]
    async fn test_run_uses_configured_limit() {
        let registry = registry(vec![function("looping", json!([{"target": "looping"}]))]);
        let storage = Arc::new(InMemoryStateStorage::new());
        let mut executor = executor(&registry, &storage, "looping").with_max_iterations(4);
        assert_eq!(executor.max_iterations(), 4);

        let input = executor.input(json!({"n": 0}));
        let error = executor.run(input).await.unwrap_err();

        assert!(error.to_string().contains("max iterations (4)"));
        assert_eq!(executor.state().iteration_count, 4);
    }

    #[tokio::test]
    async fn test_parallel_branches_feed_back_as_list() {
        let registry = registry(vec![
            json!({
                "kind": "FunctionNode",
                "name": "fan_out",
                "func": "lib.test.merge",
                "nodes": [
                    {"target": "left", "when": "$output.n < 2"},
                    {"target": "right", "when": "$output.n > -1"}
                ]
            }),
            function("left", json!([])),
            function("right", json!([])),
        ]);
        let storage = Arc::new(InMemoryStateStorage::new());
        let mut executor = executor(&registry, &storage, "fan_out");

        // fan_out runs twice: once with the input, once with the branch outputs
        let input = executor.input(json!({"n": 0}));
        let output = executor.step(input, DEFAULT_MAX_ITERATIONS).await.unwrap();

        assert!(output.exit);
        assert_eq!(executor.state().iteration_count, 2);
        assert_eq!(executor.children().len(), 2);
        assert_eq!(executor.state().child_executor_ids.len(), 2);
        assert!(executor.children().iter().all(Executor::is_child));
        assert_eq!(
            output.node_output,
            NodeOutput::Value(json!({"merged": [{"n": 2}, {"n": 2}]}))
        );
    }

    #[tokio::test]
    async fn test_unknown_actor() {
        let registry = registry(vec![function("first", json!([]))]);
        let storage = Arc::new(InMemoryStateStorage::new());
        let mut executor = executor(&registry, &storage, "first");

        let mut input = executor.input(json!({}));
        input.node_actor_id = Uuid::new_v4();
        let error = executor.step(input, 5).await.unwrap_err();
        assert_eq!(error.code(), "executor_error");
    }
}
