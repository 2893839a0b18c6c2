//! Executable components built from manifests.

pub mod custom_node;
pub mod function_node;
pub mod llm_node;
pub mod tool_node;

pub use custom_node::CustomNode;
pub use function_node::FunctionNode;
pub use llm_node::LlmNode;
pub use tool_node::ToolNode;

use crate::core::registry::Registry;
use crate::domain::languages::LanguageCode;
use crate::domain::model::NodeState;
use crate::domain::ports::Plugin;
use crate::domain::spec::{collect_edges, EdgeSpec, NodeKind, NodeSpec};
use crate::utils::error::{LimanError, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Options applied when a node is built from its manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOptions {
    /// Rejects extension fields that no registered plugin claims.
    pub strict: bool,
    pub yaml_path: Option<PathBuf>,
    pub default_lang: LanguageCode,
    pub fallback_lang: LanguageCode,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            yaml_path: None,
            default_lang: LanguageCode::En,
            fallback_lang: LanguageCode::En,
        }
    }
}

impl NodeOptions {
    pub fn with_languages(default_lang: &str, fallback_lang: &str) -> Result<Self> {
        let default_lang = default_lang.parse::<LanguageCode>().map_err(|_| {
            LimanError::generic(format!("Invalid default language code: {}", default_lang))
        })?;
        let fallback_lang = fallback_lang.parse::<LanguageCode>().map_err(|_| {
            LimanError::generic(format!("Invalid fallback language code: {}", fallback_lang))
        })?;
        Ok(Self {
            default_lang,
            fallback_lang,
            ..Self::default()
        })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// State shared by every node kind.
#[derive(Debug)]
pub struct NodeBase {
    pub id: Uuid,
    pub options: NodeOptions,
    initial_data: Value,
    compiled: AtomicBool,
}

impl NodeBase {
    fn new(initial_data: Value, options: NodeOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            initial_data,
            compiled: AtomicBool::new(false),
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.load(Ordering::Acquire)
    }

    pub fn initial_data(&self) -> &Value {
        &self.initial_data
    }

    fn ensure_not_compiled(&self, kind: NodeKind) -> Result<()> {
        if self.is_compiled() {
            return Err(LimanError::generic(format!("{} is already compiled", kind)));
        }
        Ok(())
    }

    fn mark_compiled(&self, kind: NodeKind) -> Result<()> {
        if self.compiled.swap(true, Ordering::AcqRel) {
            return Err(LimanError::generic(format!("{} is already compiled", kind)));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum Node {
    Tool(ToolNode),
    Llm(LlmNode),
    Function(FunctionNode),
    Custom(CustomNode),
}

impl Node {
    /// Builds a node from a manifest, validating plugin fields against the
    /// plugins registered for its kind.
    pub fn from_value(data: Value, options: NodeOptions, registry: &Registry) -> Result<Self> {
        let mut spec = NodeSpec::from_value(data.clone())?;
        let plugins = registry.get_plugins(spec.kind().as_str());
        apply_plugins(&mut spec, plugins, options.strict)?;
        spec.rebase_languages(options.default_lang)?;

        let base = NodeBase::new(data, options);
        debug!("Built {}:{} ({})", spec.kind(), spec.name(), base.id);
        Ok(match spec {
            NodeSpec::Tool(spec) => Node::Tool(ToolNode::new(spec, base)),
            NodeSpec::Llm(spec) => Node::Llm(LlmNode::new(spec, base)),
            NodeSpec::Function(spec) => Node::Function(FunctionNode::new(spec, base)),
            NodeSpec::Custom(spec) => Node::Custom(CustomNode::new(spec, base)),
        })
    }

    /// Loads a manifest file. Files are validated strictly.
    pub fn from_yaml_path(path: impl AsRef<Path>, registry: &Registry) -> Result<Self> {
        Self::from_yaml_path_with(path, NodeOptions::default().strict(true), registry)
    }

    pub fn from_yaml_path_with(
        path: impl AsRef<Path>,
        mut options: NodeOptions,
        registry: &Registry,
    ) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let data: Value = serde_yaml::from_str(&content)?;
        if !data.is_object() {
            return Err(LimanError::invalid_spec(
                "YAML content must be a dictionary at the top level.",
            ));
        }
        options.yaml_path = Some(path.to_path_buf());
        Self::from_value(data, options, registry)
    }

    pub fn base(&self) -> &NodeBase {
        match self {
            Node::Tool(node) => &node.base,
            Node::Llm(node) => &node.base,
            Node::Function(node) => &node.base,
            Node::Custom(node) => &node.base,
        }
    }

    pub fn id(&self) -> Uuid {
        self.base().id
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Tool(_) => NodeKind::ToolNode,
            Node::Llm(_) => NodeKind::LlmNode,
            Node::Function(_) => NodeKind::FunctionNode,
            Node::Custom(_) => NodeKind::Node,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Tool(node) => &node.spec.name,
            Node::Llm(node) => &node.spec.name,
            Node::Function(node) => &node.spec.name,
            Node::Custom(node) => &node.spec.name,
        }
    }

    /// Registry key, `kind:name`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind(), self.name())
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    pub fn is_llm_node(&self) -> bool {
        matches!(self, Node::Llm(_))
    }

    pub fn is_tool_node(&self) -> bool {
        matches!(self, Node::Tool(_))
    }

    pub fn is_compiled(&self) -> bool {
        self.base().is_compiled()
    }

    pub fn compile(&self, registry: &Registry) -> Result<()> {
        match self {
            Node::Tool(node) => node.compile(),
            Node::Llm(node) => node.compile(registry),
            Node::Function(node) => node.compile(),
            Node::Custom(node) => node.compile(),
        }
    }

    pub fn new_state(&self) -> NodeState {
        NodeState::new(self.kind().as_str(), self.name())
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        match self {
            Node::Tool(node) => &node.spec.extensions,
            Node::Llm(node) => &node.spec.extensions,
            Node::Function(node) => &node.spec.extensions,
            Node::Custom(node) => &node.spec.extensions,
        }
    }

    pub fn edges(&self) -> Vec<(NodeKind, &EdgeSpec)> {
        match self {
            Node::Tool(node) => collect_edges(
                node.spec.nodes.as_deref().unwrap_or_default(),
                node.spec.llm_nodes.as_deref().unwrap_or_default(),
            ),
            Node::Function(node) => collect_edges(&node.spec.nodes, &node.spec.llm_nodes),
            Node::Custom(node) => collect_edges(&node.spec.nodes, &node.spec.llm_nodes),
            Node::Llm(_) => Vec::new(),
        }
    }

    pub fn to_spec(&self) -> NodeSpec {
        match self {
            Node::Tool(node) => NodeSpec::Tool(node.spec.clone()),
            Node::Llm(node) => NodeSpec::Llm(node.spec.clone()),
            Node::Function(node) => NodeSpec::Function(node.spec.clone()),
            Node::Custom(node) => NodeSpec::Custom(node.spec.clone()),
        }
    }

    /// Renders the validated spec, or the manifest as it was given, as YAML.
    pub fn print_spec(&self, initial: bool) -> Result<String> {
        let value = if initial {
            strip_nulls(self.base().initial_data().clone())
        } else {
            strip_nulls(serde_json::to_value(self.to_spec())?)
        };
        Ok(serde_yaml::to_string(&value)?)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.name())
    }
}

fn apply_plugins(spec: &mut NodeSpec, plugins: &[Arc<dyn Plugin>], strict: bool) -> Result<()> {
    let kind = spec.kind();
    let base_fields = NodeSpec::base_fields(kind);
    let mut claimed = HashSet::new();

    for plugin in plugins {
        if !plugin.applies_to().iter().any(|k| k == kind.as_str()) {
            continue;
        }
        let field = plugin.field_name().to_string();
        if base_fields.contains(&field.as_str()) {
            return Err(LimanError::PluginFieldConflict {
                field,
                kind: kind.to_string(),
            });
        }

        if let Some(value) = spec.extensions().get(&field) {
            let validated = plugin.validate(value)?;
            spec.extensions_mut().insert(field.clone(), validated);
        }
        claimed.insert(field);
    }

    if strict {
        if let Some(unknown) = spec.extensions().keys().find(|k| !claimed.contains(*k)) {
            return Err(LimanError::invalid_spec(format!(
                "Unknown field '{}' in {} spec '{}'",
                unknown,
                kind,
                spec.name()
            )));
        }
    }
    Ok(())
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    struct AuditPlugin;

    impl Plugin for AuditPlugin {
        fn name(&self) -> &str {
            "audit"
        }

        fn applies_to(&self) -> Vec<String> {
            vec!["ToolNode".to_string()]
        }

        fn field_name(&self) -> &str {
            "audit"
        }

        fn validate(&self, value: &Value) -> Result<Value> {
            match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(LimanError::invalid_spec("audit must be a boolean")),
            }
        }
    }

    fn tool_decl() -> Value {
        json!({
            "kind": "ToolNode",
            "name": "get_weather",
            "description": "Get the weather",
            "func": "lib.tools.get_weather"
        })
    }

    #[test]
    fn test_display_and_names() {
        let registry = Registry::new();
        let node = Node::from_value(tool_decl(), NodeOptions::default(), &registry).unwrap();
        assert_eq!(node.to_string(), "ToolNode:get_weather");
        assert_eq!(node.full_name(), "ToolNode/get_weather");
        assert!(node.is_tool_node());
        assert!(!node.is_llm_node());
    }

    #[test]
    fn test_edges_skip_bare_names() {
        let registry = Registry::new();
        let node = Node::from_value(
            json!({
                "kind": "FunctionNode",
                "name": "router",
                "func": "lib.flow.route",
                "nodes": ["plain", {"target": "next", "when": "ok == true"}],
                "llm_nodes": [{"target": "chat"}]
            }),
            NodeOptions::default(),
            &registry,
        )
        .unwrap();

        let edges = node.edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].0, NodeKind::FunctionNode);
        assert_eq!(edges[0].1.target, "next");
        assert_eq!(edges[1].0, NodeKind::LlmNode);

        let llm = Node::from_value(
            json!({
                "kind": "LLMNode",
                "name": "chat",
                "prompts": {"system": "You route requests."},
                "nodes": [{"target": "router"}]
            }),
            NodeOptions::default(),
            &registry,
        )
        .unwrap();
        assert!(llm.edges().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = Registry::new();
        let a = Node::from_value(tool_decl(), NodeOptions::default(), &registry).unwrap();
        let b = Node::from_value(tool_decl(), NodeOptions::default(), &registry).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_invalid_language_options() {
        assert!(NodeOptions::with_languages("en", "ru").is_ok());
        let error = NodeOptions::with_languages("xx", "en").unwrap_err();
        assert_eq!(error.to_string(), "Invalid default language code: xx");
        assert!(NodeOptions::with_languages("en", "yy").is_err());
    }

    #[test]
    fn test_strict_rejects_unknown_fields() {
        let registry = Registry::new();
        let mut decl = tool_decl();
        decl["unknown"] = json!(1);

        assert!(Node::from_value(decl.clone(), NodeOptions::default(), &registry).is_ok());
        let error =
            Node::from_value(decl, NodeOptions::default().strict(true), &registry).unwrap_err();
        assert_eq!(error.code(), "invalid_spec");
    }

    #[test]
    fn test_plugin_field_is_validated() {
        let mut registry = Registry::new();
        registry.add_plugins(vec![Arc::new(AuditPlugin)]).unwrap();

        let mut decl = tool_decl();
        decl["audit"] = json!(true);
        let node = Node::from_value(decl.clone(), NodeOptions::default().strict(true), &registry)
            .unwrap();
        assert_eq!(node.extensions().get("audit"), Some(&json!(true)));

        decl["audit"] = json!("yes");
        assert!(Node::from_value(decl, NodeOptions::default(), &registry).is_err());
    }

    #[test]
    fn test_compile_twice_fails() {
        let registry = Registry::new();
        let node = Node::from_value(tool_decl(), NodeOptions::default(), &registry).unwrap();
        node.compile(&registry).unwrap();
        let error = node.compile(&registry).unwrap_err();
        assert_eq!(error.to_string(), "ToolNode is already compiled");
    }

    #[test]
    fn test_print_spec() {
        let registry = Registry::new();
        let node = Node::from_value(tool_decl(), NodeOptions::default(), &registry).unwrap();

        let printed = node.print_spec(false).unwrap();
        assert!(printed.contains("kind: ToolNode"));
        assert!(printed.contains("en: Get the weather"));

        let initial = node.print_spec(true).unwrap();
        assert!(initial.contains("description: Get the weather"));
    }

    #[test]
    fn test_from_yaml_path_requires_mapping() {
        let registry = Registry::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- just\n- a list").unwrap();

        let error = Node::from_yaml_path(file.path(), &registry).unwrap_err();
        assert_eq!(
            error.to_string(),
            "YAML content must be a dictionary at the top level."
        );
    }

    #[test]
    fn test_from_yaml_path_sets_path() {
        let registry = Registry::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "kind: FunctionNode\nname: summarize\nfunc: lib.funcs.summarize\n"
        )
        .unwrap();

        let node = Node::from_yaml_path(file.path(), &registry).unwrap();
        assert_eq!(node.kind(), NodeKind::FunctionNode);
        assert_eq!(node.base().options.yaml_path.as_deref(), Some(file.path()));
        assert!(node.base().options.strict);
    }
}
