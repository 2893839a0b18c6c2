use crate::utils::error::{LimanError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    /// Parses a tool call handed to a tool node as input.
    pub fn from_input(input: &Value) -> Result<Self> {
        if input.get("args").is_none() {
            return Err(LimanError::generic(
                "Tool call input must contain 'args' field",
            ));
        }
        Ok(serde_json::from_value(input.clone())?)
    }
}

/// Chat message exchanged between nodes and the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::Human { content }
            | Message::Ai { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Output produced by a single node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeOutput {
    Message(Message),
    Value(Value),
}

impl NodeOutput {
    /// Object exposed as `$output` to edge conditions.
    ///
    /// Tool messages whose content is a JSON object expose that object.
    pub fn evaluation_value(&self) -> Value {
        match self {
            NodeOutput::Value(value @ Value::Object(_)) => value.clone(),
            NodeOutput::Message(Message::Tool { content, .. }) => {
                match serde_json::from_str::<Value>(content) {
                    Ok(value @ Value::Object(_)) => value,
                    _ => Value::Object(Map::new()),
                }
            }
            _ => Value::Object(Map::new()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Runtime state of a node, owned by its actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl NodeState {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            context: Map::new(),
            messages: Vec::new(),
            input: None,
            output: None,
        }
    }
}

/// Node state plus per-execution data handed to tools and functions.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub node_state: NodeState,
    data: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(node_state: NodeState) -> Self {
        Self {
            node_state,
            data: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(LimanError::generic(format!(
                "Attribute {} already exists in ExecutionContext",
                key
            )));
        }
        self.data.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.data.get(key).ok_or_else(|| {
            LimanError::generic(format!("Key {} not found in ExecutionContext", key))
        })
    }
}
