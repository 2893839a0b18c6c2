use crate::core::functions::FunctionRegistry;
use crate::core::nodes::{FunctionNode, LlmNode, Node, NodeOptions, ToolNode};
use crate::domain::ports::Plugin;
use crate::domain::spec::NodeKind;
use crate::utils::error::{LimanError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Components keyed by `kind:name`, the plugins extending them and the
/// functions their manifests reference.
pub struct Registry {
    components: HashMap<String, Arc<Node>>,
    order: Vec<String>,
    plugins: HashMap<String, Vec<Arc<dyn Plugin>>>,
    functions: FunctionRegistry,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.plugins.keys().collect();
        kinds.sort();
        f.debug_struct("Registry")
            .field("components", &self.order)
            .field("plugin_kinds", &kinds)
            .field("functions", &self.functions)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        let plugins = [NodeKind::Node, NodeKind::LlmNode, NodeKind::ToolNode]
            .into_iter()
            .map(|kind| (kind.to_string(), Vec::new()))
            .collect();

        Self {
            components: HashMap::new(),
            order: Vec::new(),
            plugins,
            functions: FunctionRegistry::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn add(&mut self, node: Node) -> Result<Arc<Node>> {
        let key = node.key();
        if self.components.contains_key(&key) {
            return Err(LimanError::ComponentAlreadyExists { key });
        }
        debug!("Registered component {}", key);
        let node = Arc::new(node);
        self.components.insert(key.clone(), Arc::clone(&node));
        self.order.push(key);
        Ok(node)
    }

    /// Builds a component from a manifest value and registers it.
    pub fn load_value(&mut self, data: Value, options: NodeOptions) -> Result<Arc<Node>> {
        let node = Node::from_value(data, options, self)?;
        self.add(node)
    }

    pub fn load_yaml_path(&mut self, path: impl AsRef<Path>) -> Result<Arc<Node>> {
        let node = Node::from_yaml_path(path, self)?;
        self.add(node)
    }

    pub fn load_yaml_path_with(
        &mut self,
        path: impl AsRef<Path>,
        options: NodeOptions,
    ) -> Result<Arc<Node>> {
        let node = Node::from_yaml_path_with(path, options, self)?;
        self.add(node)
    }

    /// Loads every `.yaml`/`.yml` file of a directory, sorted by file name.
    pub fn load_dir(
        &mut self,
        dir: impl AsRef<Path>,
        options: &NodeOptions,
    ) -> Result<Vec<Arc<Node>>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut nodes = Vec::with_capacity(paths.len());
        for path in paths {
            nodes.push(self.load_yaml_path_with(&path, options.clone())?);
        }
        info!(
            "Loaded {} component(s) from {}",
            nodes.len(),
            dir.as_ref().display()
        );
        Ok(nodes)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Node>> {
        self.components.get(key).cloned()
    }

    pub fn lookup(&self, kind: NodeKind, name: &str) -> Result<Arc<Node>> {
        let key = format!("{}:{}", kind, name);
        self.components
            .get(&key)
            .cloned()
            .ok_or(LimanError::ComponentNotFound { key })
    }

    pub fn lookup_tool(&self, name: &str) -> Result<&ToolNode> {
        match self.lookup_ref(NodeKind::ToolNode, name)? {
            Node::Tool(node) => Ok(node),
            other => Err(unexpected_kind(other, NodeKind::ToolNode)),
        }
    }

    pub fn lookup_llm(&self, name: &str) -> Result<&LlmNode> {
        match self.lookup_ref(NodeKind::LlmNode, name)? {
            Node::Llm(node) => Ok(node),
            other => Err(unexpected_kind(other, NodeKind::LlmNode)),
        }
    }

    pub fn lookup_function(&self, name: &str) -> Result<&FunctionNode> {
        match self.lookup_ref(NodeKind::FunctionNode, name)? {
            Node::Function(node) => Ok(node),
            other => Err(unexpected_kind(other, NodeKind::FunctionNode)),
        }
    }

    fn lookup_ref(&self, kind: NodeKind, name: &str) -> Result<&Node> {
        let key = format!("{}:{}", kind, name);
        self.components
            .get(&key)
            .map(Arc::as_ref)
            .ok_or(LimanError::ComponentNotFound { key })
    }

    /// Resolves the target of an edge. Targets listed under `nodes` may be
    /// function nodes or generic nodes.
    pub fn lookup_edge_target(&self, kind: NodeKind, name: &str) -> Result<Arc<Node>> {
        match kind {
            NodeKind::FunctionNode => self
                .lookup(NodeKind::FunctionNode, name)
                .or_else(|_| self.lookup(NodeKind::Node, name)),
            other => self.lookup(other, name),
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &Arc<Node>> + '_ {
        self.order.iter().filter_map(|key| self.components.get(key))
    }

    /// Compiles every component that is not compiled yet.
    pub fn compile_all(&self) -> Result<()> {
        for node in self.components() {
            if !node.is_compiled() {
                node.compile(self)?;
            }
        }
        Ok(())
    }

    /// All specs as YAML documents separated by `---`, in registration order.
    pub fn print_specs(&self, initial: bool) -> Result<String> {
        let docs = self
            .components()
            .map(|node| node.print_spec(initial))
            .collect::<Result<Vec<_>>>()?;
        Ok(docs.join("---\n"))
    }

    /// Registers the plugins in order. The whole batch is checked before
    /// anything is inserted, so a rejected batch leaves the registry as it was.
    pub fn add_plugins(&mut self, plugins: Vec<Arc<dyn Plugin>>) -> Result<()> {
        let mut known: HashSet<String> = self.plugins.keys().cloned().collect();
        for plugin in &plugins {
            for kind in plugin.registered_kinds() {
                if !known.insert(kind.clone()) {
                    return Err(LimanError::PluginKindConflict { kind });
                }
            }
            for kind in plugin.applies_to() {
                if !known.contains(&kind) {
                    return Err(LimanError::invalid_spec(format!(
                        "Plugin '{}' applies to unknown kind: {}",
                        plugin.name(),
                        kind
                    )));
                }
            }
        }

        for plugin in plugins {
            for kind in plugin.registered_kinds() {
                self.plugins.insert(kind, Vec::new());
            }
            for kind in plugin.applies_to() {
                if let Some(list) = self.plugins.get_mut(&kind) {
                    list.push(Arc::clone(&plugin));
                }
            }
            info!("Registered plugin '{}'", plugin.name());
        }
        Ok(())
    }

    pub fn get_plugins(&self, kind: &str) -> &[Arc<dyn Plugin>] {
        self.plugins.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }
}

fn unexpected_kind(node: &Node, expected: NodeKind) -> LimanError {
    LimanError::invalid_spec(format!("Component {} is not a {}", node, expected))
}
