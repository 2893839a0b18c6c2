//! Component manifests.
//!
//! ```yaml
//! kind: ToolNode
//! name: get_weather
//! description:
//!   en: Retrieves the current weather for a location.
//! func: lib.tools.get_weather
//! arguments:
//!   - name: lat
//!     type: number
//!     description: latitude of the location
//! ```

use crate::domain::languages::{LanguageCode, LocalizedValue};
use crate::utils::error::{LimanError, Result};
use crate::utils::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "Node")]
    Node,
    #[serde(rename = "LLMNode")]
    LlmNode,
    #[serde(rename = "ToolNode")]
    ToolNode,
    #[serde(rename = "FunctionNode")]
    FunctionNode,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Node => "Node",
            NodeKind::LlmNode => "LLMNode",
            NodeKind::ToolNode => "ToolNode",
            NodeKind::FunctionNode => "FunctionNode",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = LimanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Node" => Ok(NodeKind::Node),
            "LLMNode" => Ok(NodeKind::LlmNode),
            "ToolNode" => Ok(NodeKind::ToolNode),
            "FunctionNode" => Ok(NodeKind::FunctionNode),
            other => Err(LimanError::invalid_spec(format!("Unsupported kind: {}", other))),
        }
    }
}

/// Fields shared by every manifest. Extra properties are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSpec {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
}

impl EdgeSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            when: None,
            id: None,
            depends: None,
        }
    }

    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }
}

/// Reference to another node: a bare name or a full edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    Name(String),
    Edge(EdgeSpec),
}

impl NodeRef {
    pub fn target(&self) -> &str {
        match self {
            NodeRef::Name(name) => name,
            NodeRef::Edge(edge) => &edge.target,
        }
    }

    pub fn edge(&self) -> Option<&EdgeSpec> {
        match self {
            NodeRef::Edge(edge) => Some(edge),
            NodeRef::Name(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: String,
    pub description: LocalizedValue,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolNodeSpec {
    pub name: String,
    pub description: LocalizedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<ToolArgument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<LocalizedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_prompt_template: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_nodes: Option<Vec<NodeRef>>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmNodeSpec {
    pub name: String,
    pub prompts: LocalizedValue,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNodeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<LocalizedValue>,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
    #[serde(default)]
    pub llm_nodes: Vec<NodeRef>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Manifest of the generic `Node` kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomNodeSpec {
    pub name: String,
    pub func: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<LocalizedValue>,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
    #[serde(default)]
    pub llm_nodes: Vec<NodeRef>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeSpec {
    #[serde(rename = "Node")]
    Custom(CustomNodeSpec),
    #[serde(rename = "LLMNode")]
    Llm(LlmNodeSpec),
    #[serde(rename = "ToolNode")]
    Tool(ToolNodeSpec),
    #[serde(rename = "FunctionNode")]
    Function(FunctionNodeSpec),
}

impl NodeSpec {
    /// Validates the base fields first so that a missing `kind` or `name`
    /// is reported before kind-specific errors.
    pub fn from_value(data: Value) -> Result<Self> {
        if !data.is_object() {
            return Err(LimanError::invalid_spec(
                "Spec must be a dictionary at the top level.",
            ));
        }
        let base: BaseSpec = serde_json::from_value(data.clone())
            .map_err(|e| LimanError::invalid_spec(format!("Invalid base spec: {}", e)))?;
        base.kind.parse::<NodeKind>()?;
        validate_identifier("component name", &base.name)?;

        serde_json::from_value(data).map_err(|e| {
            LimanError::invalid_spec(format!("Invalid {} spec '{}': {}", base.kind, base.name, e))
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::Custom(_) => NodeKind::Node,
            NodeSpec::Llm(_) => NodeKind::LlmNode,
            NodeSpec::Tool(_) => NodeKind::ToolNode,
            NodeSpec::Function(_) => NodeKind::FunctionNode,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeSpec::Custom(spec) => &spec.name,
            NodeSpec::Llm(spec) => &spec.name,
            NodeSpec::Tool(spec) => &spec.name,
            NodeSpec::Function(spec) => &spec.name,
        }
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        match self {
            NodeSpec::Custom(spec) => &spec.extensions,
            NodeSpec::Llm(spec) => &spec.extensions,
            NodeSpec::Tool(spec) => &spec.extensions,
            NodeSpec::Function(spec) => &spec.extensions,
        }
    }

    pub fn extensions_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            NodeSpec::Custom(spec) => &mut spec.extensions,
            NodeSpec::Llm(spec) => &mut spec.extensions,
            NodeSpec::Tool(spec) => &mut spec.extensions,
            NodeSpec::Function(spec) => &mut spec.extensions,
        }
    }

    /// Field names defined by the kind itself; plugins may not reuse them.
    pub fn base_fields(kind: NodeKind) -> &'static [&'static str] {
        match kind {
            NodeKind::Node | NodeKind::FunctionNode => &[
                "kind",
                "name",
                "func",
                "description",
                "prompts",
                "nodes",
                "llm_nodes",
                "tools",
            ],
            NodeKind::LlmNode => &["kind", "name", "prompts", "tools", "nodes"],
            NodeKind::ToolNode => &[
                "kind",
                "name",
                "description",
                "func",
                "arguments",
                "triggers",
                "tool_prompt_template",
                "nodes",
                "llm_nodes",
            ],
        }
    }

    /// Re-normalizes plain-string localized values under `lang`.
    pub fn rebase_languages(&mut self, lang: LanguageCode) -> Result<()> {
        match self {
            NodeSpec::Tool(spec) => {
                spec.description.rebase(lang)?;
                for argument in spec.arguments.iter_mut().flatten() {
                    argument.description.rebase(lang)?;
                }
                for trigger in spec.triggers.iter_mut().flatten() {
                    trigger.rebase(lang)?;
                }
                if let Some(template) = spec.tool_prompt_template.as_mut() {
                    template.rebase(lang)?;
                }
            }
            NodeSpec::Llm(spec) => spec.prompts.rebase(lang)?,
            NodeSpec::Function(FunctionNodeSpec {
                description,
                prompts,
                ..
            })
            | NodeSpec::Custom(CustomNodeSpec {
                description,
                prompts,
                ..
            }) => {
                if let Some(description) = description.as_mut() {
                    description.rebase(lang)?;
                }
                if let Some(prompts) = prompts.as_mut() {
                    prompts.rebase(lang)?;
                }
            }
        }
        Ok(())
    }
}

/// Edges of `nodes` point at function nodes, edges of `llm_nodes` at LLM nodes.
pub fn collect_edges<'a>(
    nodes: &'a [NodeRef],
    llm_nodes: &'a [NodeRef],
) -> Vec<(NodeKind, &'a EdgeSpec)> {
    nodes
        .iter()
        .filter_map(NodeRef::edge)
        .map(|edge| (NodeKind::FunctionNode, edge))
        .chain(
            llm_nodes
                .iter()
                .filter_map(NodeRef::edge)
                .map(|edge| (NodeKind::LlmNode, edge)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_spec_allows_extra_properties() {
        let spec: BaseSpec =
            serde_json::from_value(json!({"kind": "TestNode", "name": "test", "extra": "property"}))
                .unwrap();
        assert_eq!(spec.kind, "TestNode");
        assert_eq!(spec.name, "test");
    }

    #[test]
    fn test_base_spec_rejects_missing_fields() {
        assert!(serde_json::from_value::<BaseSpec>(json!({"name": "test"})).is_err());
        assert!(serde_json::from_value::<BaseSpec>(json!({"kind": "TestNode"})).is_err());
        assert!(serde_json::from_value::<BaseSpec>(json!({"kind": 123, "name": "test"})).is_err());
        assert!(serde_json::from_value::<BaseSpec>(json!({"kind": "TestNode", "name": 123})).is_err());
    }

    #[test]
    fn test_edge_spec_target_only() {
        let spec: EdgeSpec = serde_json::from_value(json!({"target": "target_node"})).unwrap();
        assert_eq!(spec.target, "target_node");
        assert!(spec.when.is_none());
        assert!(spec.id.is_none());
        assert!(spec.depends.is_none());
    }

    #[test]
    fn test_edge_spec_full() {
        let spec: EdgeSpec = serde_json::from_value(json!({
            "target": "target_node",
            "when": "condition == true",
            "id": "edge_1",
            "depends": ["dep1", "dep2"]
        }))
        .unwrap();
        assert_eq!(spec.when.as_deref(), Some("condition == true"));
        assert_eq!(spec.id.as_deref(), Some("edge_1"));
        assert_eq!(spec.depends, Some(vec!["dep1".to_string(), "dep2".to_string()]));
    }

    #[test]
    fn test_edge_spec_invalid_target() {
        assert!(serde_json::from_value::<EdgeSpec>(json!({})).is_err());
        assert!(serde_json::from_value::<EdgeSpec>(json!({"target": 123})).is_err());
    }

    #[test]
    fn test_node_spec_tool_with_extensions() {
        let spec = NodeSpec::from_value(json!({
            "kind": "ToolNode",
            "name": "get_weather",
            "description": {"en": "Weather", "ru": "Погода"},
            "func": "lib.tools.get_weather",
            "arguments": [{"name": "lat", "type": "number", "description": "latitude"}],
            "auth": {"scopes": ["weather"]}
        }))
        .unwrap();

        assert_eq!(spec.kind(), NodeKind::ToolNode);
        assert_eq!(spec.name(), "get_weather");
        assert!(spec.extensions().contains_key("auth"));
        let NodeSpec::Tool(tool) = spec else {
            panic!("expected tool spec");
        };
        assert_eq!(tool.arguments.unwrap()[0].arg_type, "number");
    }

    #[test]
    fn test_node_spec_rejects_invalid_name() {
        let error = NodeSpec::from_value(json!({"kind": "ToolNode", "name": "get weather"}))
            .unwrap_err();
        assert_eq!(error.code(), "invalid_spec");
        assert!(error.to_string().contains("not a valid identifier"));
    }

    #[test]
    fn test_node_spec_unknown_kind() {
        let error = NodeSpec::from_value(json!({"kind": "Weird", "name": "x"})).unwrap_err();
        assert_eq!(error.code(), "invalid_spec");
    }
}
