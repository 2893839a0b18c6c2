//! Node actors: the runtime wrapper that executes a node and decides where
//! the flow goes next.

use crate::core::nodes::Node;
use crate::core::registry::Registry;
use crate::core::when::{parse_when, ConditionalEvaluator};
use crate::domain::model::{ExecutionContext, Message, NodeOutput, NodeState, ToolCall};
use crate::domain::ports::ChatModel;
use crate::domain::spec::{EdgeSpec, NodeKind};
use crate::utils::error::{LimanError, Result};
use crate::utils::text::to_snake_case;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeActorStatus {
    Idle,
    Initializing,
    Ready,
    Executing,
    Completed,
    Shutdown,
}

impl NodeActorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeActorStatus::Idle => "idle",
            NodeActorStatus::Initializing => "initializing",
            NodeActorStatus::Ready => "ready",
            NodeActorStatus::Executing => "executing",
            NodeActorStatus::Completed => "completed",
            NodeActorStatus::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for NodeActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node to run next and the input it receives.
#[derive(Debug, Clone)]
pub struct NextNode {
    pub node: Arc<Node>,
    pub input: Value,
}

#[derive(Debug, Clone)]
pub struct ActorResult {
    pub output: NodeOutput,
    pub next_nodes: Vec<NextNode>,
}

#[derive(Debug, Clone)]
pub struct PreHookData {
    pub input: Value,
    pub execution_id: Uuid,
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct PostHookData {
    pub input: Value,
    pub execution_id: Uuid,
    pub context: Map<String, Value>,
    pub output: NodeOutput,
    pub next_nodes: Vec<NextNode>,
}

pub type PreExecutionHook = Box<dyn Fn(&NodeActor, PreHookData) -> Result<PreHookData> + Send + Sync>;
pub type PostExecutionHook =
    Box<dyn Fn(&NodeActor, PostHookData) -> Result<PostHookData> + Send + Sync>;

const RESERVED_CONTEXT_KEYS: [&str; 4] = ["actor_id", "execution_id", "node_name", "node_type"];

pub struct NodeActor {
    id: Uuid,
    node: Arc<Node>,
    registry: Arc<Registry>,
    llm: Option<Arc<dyn ChatModel>>,
    node_state: NodeState,
    status: NodeActorStatus,
    error: Option<String>,
    last_executed_at: Option<DateTime<Utc>>,
    pre_hooks: Vec<PreExecutionHook>,
    post_hooks: Vec<PostExecutionHook>,
}

impl fmt::Debug for NodeActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeActor(id={}, node={}, status={})",
            self.id,
            self.node.name(),
            self.status
        )
    }
}

impl NodeActor {
    /// Creates an actor and initializes it: the node is compiled if needed
    /// and the plugins of its kind are applied to the fresh state.
    pub fn create(
        node: Arc<Node>,
        registry: Arc<Registry>,
        llm: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), node, registry, llm)
    }

    pub fn with_id(
        id: Uuid,
        node: Arc<Node>,
        registry: Arc<Registry>,
        llm: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        let node_state = node.new_state();
        let mut actor = Self {
            id,
            node,
            registry,
            llm,
            node_state,
            status: NodeActorStatus::Idle,
            error: None,
            last_executed_at: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        };
        actor.initialize()?;
        Ok(actor)
    }

    /// Tool actors restore only before they ran; LLM actors keep their
    /// conversation and restore at any point after initialization.
    pub fn can_restore(node: &Node, saved_state: &Value) -> bool {
        let Some(status) = saved_state
            .get("status")
            .and_then(|s| serde_json::from_value::<NodeActorStatus>(s.clone()).ok())
        else {
            return false;
        };

        match node {
            Node::Tool(_) => status == NodeActorStatus::Ready,
            Node::Llm(_) => matches!(
                status,
                NodeActorStatus::Ready | NodeActorStatus::Executing | NodeActorStatus::Completed
            ),
            _ => false,
        }
    }

    pub fn create_or_restore(
        node: Arc<Node>,
        registry: Arc<Registry>,
        state: Option<&Value>,
        llm: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        let Some(state) = state.filter(|state| Self::can_restore(&node, state)) else {
            return Self::create(node, registry, llm);
        };

        let actor_id = state
            .get("actor_id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| LimanError::generic("Saved actor state has no valid actor_id"))?;

        let mut actor = Self::with_id(actor_id, node, registry, llm)?;
        actor.restore_state(state)?;
        debug!(actor_id = %actor.id, "Restored {}", actor.composite_id());
        Ok(actor)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn status(&self) -> NodeActorStatus {
        self.status
    }

    pub fn node_state(&self) -> &NodeState {
        &self.node_state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `node_actor/{node_type}/{node_name}/{uuid}`
    pub fn composite_id(&self) -> String {
        format!(
            "node_actor/{}/{}/{}",
            to_snake_case(self.node.kind().as_str()),
            self.node.name(),
            self.id
        )
    }

    pub fn add_pre_hook<F>(&mut self, hook: F)
    where
        F: Fn(&NodeActor, PreHookData) -> Result<PreHookData> + Send + Sync + 'static,
    {
        self.pre_hooks.push(Box::new(hook));
    }

    pub fn add_post_hook<F>(&mut self, hook: F)
    where
        F: Fn(&NodeActor, PostHookData) -> Result<PostHookData> + Send + Sync + 'static,
    {
        self.post_hooks.push(Box::new(hook));
    }

    fn create_error(&self, message: impl Into<String>, execution_id: Option<Uuid>) -> LimanError {
        LimanError::NodeActor {
            message: message.into(),
            actor_id: self.id,
            composite_id: self.composite_id(),
            node_kind: self.node.kind().to_string(),
            node_name: self.node.name().to_string(),
            execution_id,
        }
    }

    fn initialize(&mut self) -> Result<()> {
        if self.status != NodeActorStatus::Idle {
            return Err(self.create_error(
                format!("Cannot initialize actor in status {}", self.status),
                None,
            ));
        }
        self.status = NodeActorStatus::Initializing;

        if let Err(e) = self.prepare() {
            let message = format!("Failed to initialize actor: {}", e);
            self.error = Some(message.clone());
            return Err(self.create_error(message, None));
        }

        self.status = NodeActorStatus::Ready;
        debug!(actor_id = %self.id, "Initialized {}", self.composite_id());
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        if !self.node.is_compiled() {
            self.node.compile(&self.registry)?;
        }
        let kind = self.node.kind();
        for plugin in self.registry.get_plugins(kind.as_str()) {
            let field = self.node.extensions().get(plugin.field_name());
            plugin.apply(&mut self.node_state, field)?;
        }
        Ok(())
    }

    /// Runs the node once.
    ///
    /// LLM nodes take a string, a message or a list of messages; tool nodes a
    /// tool call; function nodes any JSON value.
    pub async fn execute(
        &mut self,
        input: Value,
        execution_id: Uuid,
        context: Option<Map<String, Value>>,
    ) -> Result<ActorResult> {
        if matches!(
            self.status,
            NodeActorStatus::Idle | NodeActorStatus::Shutdown
        ) {
            return Err(self.create_error(
                format!("Cannot execute actor in status {}", self.status),
                Some(execution_id),
            ));
        }

        self.status = NodeActorStatus::Executing;
        let context = context.unwrap_or_default();

        let data = PreHookData {
            input,
            execution_id,
            context,
        };
        let result = match self.apply_pre_hooks(data) {
            Ok(data) => {
                debug!(
                    actor_id = %self.id,
                    "NodeActor executes {} with input: {}",
                    self.node.full_name(),
                    data.input
                );
                let result = self.execute_internal(data).await;
                self.last_executed_at = Some(Utc::now());
                result
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => {
                self.status = NodeActorStatus::Completed;
                Ok(result)
            }
            Err(e) => {
                let message = format!("Node execution failed: {}", e);
                warn!(actor_id = %self.id, "{}", message);
                self.error = Some(message.clone());
                Err(self.create_error(message, Some(execution_id)))
            }
        }
    }

    fn apply_pre_hooks(&self, mut data: PreHookData) -> Result<PreHookData> {
        for hook in &self.pre_hooks {
            data = hook(self, data)?;
        }
        Ok(data)
    }

    async fn execute_internal(&mut self, data: PreHookData) -> Result<ActorResult> {
        let ctx = self.execution_context(&data.context, data.execution_id)?;
        let node = Arc::clone(&self.node);

        let output = match node.as_ref() {
            Node::Llm(_) => self.execute_llm_node(&data.input).await?,
            Node::Tool(tool) => {
                let tool_call = ToolCall::from_input(&data.input)?;
                let message = tool
                    .invoke(self.registry.functions(), &tool_call, ctx)
                    .await?;
                self.node_state.input = Some(serde_json::to_value(&tool_call)?);
                self.node_state.output = Some(serde_json::to_value(&message)?);
                NodeOutput::Message(message)
            }
            Node::Function(function) => {
                let value = function
                    .invoke(self.registry.functions(), data.input.clone(), ctx)
                    .await?;
                self.node_state.input = Some(data.input.clone());
                self.node_state.output = Some(value.clone());
                NodeOutput::Value(value)
            }
            Node::Custom(_) => {
                return Err(LimanError::generic(format!(
                    "Unsupported node type {} for execution",
                    node.kind()
                )))
            }
        };

        debug!(
            actor_id = %self.id,
            "NodeActor completed {} with output: {}",
            self.node.full_name(),
            output.to_value()
        );

        let next_nodes = self.next_nodes(&output)?;
        debug!(actor_id = %self.id, "Next nodes to execute: {}", next_nodes.len());

        let mut post = PostHookData {
            input: data.input,
            execution_id: data.execution_id,
            context: data.context,
            output,
            next_nodes,
        };
        for hook in &self.post_hooks {
            post = hook(self, post)?;
        }

        Ok(ActorResult {
            output: post.output,
            next_nodes: post.next_nodes,
        })
    }

    async fn execute_llm_node(&mut self, input: &Value) -> Result<NodeOutput> {
        let Node::Llm(node) = self.node.as_ref() else {
            return Err(LimanError::generic("Expected LLMNode"));
        };
        let llm = self.llm.as_ref().ok_or_else(|| {
            LimanError::generic("LLM required for LLMNode execution but not provided")
        })?;

        let inputs = llm_inputs(input)?;
        let mut messages = self.node_state.messages.clone();
        messages.extend(inputs.iter().cloned());

        let response = node
            .invoke(&self.registry, llm.as_ref(), &messages, None)
            .await?;

        self.node_state.messages.extend(inputs);
        self.node_state.messages.push(response.clone());
        Ok(NodeOutput::Message(response))
    }

    fn execution_context(
        &self,
        context: &Map<String, Value>,
        execution_id: Uuid,
    ) -> Result<ExecutionContext> {
        let mut ctx = ExecutionContext::new(self.node_state.clone());
        for (key, value) in context {
            if !RESERVED_CONTEXT_KEYS.contains(&key.as_str()) {
                ctx.insert(key.clone(), value.clone())?;
            }
        }
        ctx.insert("actor_id", json!(self.id))?;
        ctx.insert("execution_id", json!(execution_id))?;
        ctx.insert("node_name", json!(self.node.name()))?;
        ctx.insert("node_type", json!(self.node.kind().as_str()))?;
        Ok(ctx)
    }

    /// LLM nodes continue with one tool node per tool call; other nodes
    /// follow the edges whose condition holds.
    fn next_nodes(&self, output: &NodeOutput) -> Result<Vec<NextNode>> {
        if self.node.is_llm_node() {
            let NodeOutput::Message(message) = output else {
                return Ok(Vec::new());
            };
            return message
                .tool_calls()
                .iter()
                .map(|tool_call| -> Result<NextNode> {
                    Ok(NextNode {
                        node: self.registry.lookup(NodeKind::ToolNode, &tool_call.name)?,
                        input: serde_json::to_value(tool_call)?,
                    })
                })
                .collect();
        }

        let edges = self.node.edges();
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let (context, state_context) = self.evaluation_context(output)?;
        let evaluator = ConditionalEvaluator::new(context, state_context)
            .with_functions(self.registry.functions());

        let mut next_nodes = Vec::new();
        for (kind, edge) in edges {
            if self.should_follow_edge(edge, &evaluator) {
                next_nodes.push(NextNode {
                    node: self.registry.lookup_edge_target(kind, &edge.target)?,
                    input: output.to_value(),
                });
            }
        }
        Ok(next_nodes)
    }

    /// `$output`, `$status` and `$state` for `$` variables; plain names
    /// resolve against the node state context.
    fn evaluation_context(
        &self,
        output: &NodeOutput,
    ) -> Result<(Map<String, Value>, Map<String, Value>)> {
        let mut context = Map::new();
        context.insert("$output".to_string(), output.evaluation_value());
        context.insert("$status".to_string(), json!(self.status.as_str()));
        context.insert("$state".to_string(), serde_json::to_value(&self.node_state)?);
        Ok((context, self.node_state.context.clone()))
    }

    fn should_follow_edge(&self, edge: &EdgeSpec, evaluator: &ConditionalEvaluator) -> bool {
        let Some(when) = &edge.when else {
            return true;
        };
        match parse_when(when).and_then(|expr| evaluator.evaluate(&expr)) {
            Ok(follow) => follow,
            Err(e) => {
                debug!(actor_id = %self.id, "Edge to '{}' not followed: {}", edge.target, e);
                false
            }
        }
    }

    pub fn serialize_state(&self) -> Value {
        json!({
            "actor_id": self.id,
            "node_id": self.node.id(),
            "node_type": self.node.kind().as_str(),
            "node_name": self.node.name(),
            "status": self.status,
            "node_state": self.node_state,
        })
    }

    fn restore_state(&mut self, state: &Value) -> Result<()> {
        let restored = state
            .get("node_state")
            .cloned()
            .ok_or_else(|| LimanError::generic("missing node_state"))
            .and_then(|value| Ok(serde_json::from_value::<NodeState>(value)?))
            .and_then(|node_state| {
                let status = serde_json::from_value::<NodeActorStatus>(
                    state.get("status").cloned().unwrap_or(Value::Null),
                )?;
                Ok((node_state, status))
            });

        match restored {
            Ok((node_state, status)) => {
                self.node_state = node_state;
                self.status = status;
                self.error = None;
                Ok(())
            }
            Err(e) => Err(self.create_error(format!("Failed to restore actor state: {}", e), None)),
        }
    }

    pub fn shutdown(&mut self) {
        debug!(actor_id = %self.id, "Shutting down {}", self.composite_id());
        self.status = NodeActorStatus::Shutdown;
    }

    pub fn status_report(&self) -> Value {
        json!({
            "actor_id": self.id,
            "composite_id": self.composite_id(),
            "node": self.node.full_name(),
            "status": self.status,
            "has_error": self.error.is_some(),
            "error": self.error,
            "last_executed_at": self.last_executed_at.map(|at| at.to_rfc3339()),
        })
    }
}

fn llm_inputs(input: &Value) -> Result<Vec<Message>> {
    match input {
        Value::String(text) => Ok(vec![Message::human(text.clone())]),
        Value::Object(_) => Ok(vec![serde_json::from_value(input.clone())?]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(Message::human(text.clone())),
                other => Ok(serde_json::from_value(other.clone())?),
            })
            .collect(),
        other => Err(LimanError::generic(format!(
            "Unsupported input type {} for LLMNode",
            other
        ))),
    }
}
