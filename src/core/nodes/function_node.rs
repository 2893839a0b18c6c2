use super::NodeBase;
use crate::core::functions::{FunctionRegistry, NodeFunction};
use crate::domain::model::ExecutionContext;
use crate::domain::spec::{FunctionNodeSpec, NodeKind};
use crate::utils::error::{LimanError, Result};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Runs a registered function inside the graph.
pub struct FunctionNode {
    pub base: NodeBase,
    pub spec: FunctionNodeSpec,
    func: Option<NodeFunction>,
}

impl fmt::Debug for FunctionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionNode")
            .field("base", &self.base)
            .field("spec", &self.spec)
            .field("func_set", &self.func.is_some())
            .finish()
    }
}

impl FunctionNode {
    pub(super) fn new(spec: FunctionNodeSpec, base: NodeBase) -> Self {
        Self {
            base,
            spec,
            func: None,
        }
    }

    pub fn set_func<F, Fut>(&mut self, func: F)
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.func = Some(Arc::new(move |input, ctx| Box::pin(func(input, ctx))));
    }

    pub fn compile(&self) -> Result<()> {
        self.base.mark_compiled(NodeKind::FunctionNode)
    }

    pub async fn invoke(
        &self,
        functions: &FunctionRegistry,
        input: Value,
        ctx: ExecutionContext,
    ) -> Result<Value> {
        let func = match (&self.func, &self.spec.func) {
            (Some(func), _) => func.clone(),
            (None, Some(name)) => functions.resolve(name)?,
            (None, None) => {
                return Err(LimanError::generic("func is not set for the FunctionNode"))
            }
        };
        func(input, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use crate::core::functions::FunctionRegistry;
    use crate::core::nodes::{Node, NodeOptions};
    use crate::core::registry::Registry;
    use crate::domain::model::{ExecutionContext, NodeState};
    use serde_json::{json, Value};

    fn function_node(decl: Value) -> super::FunctionNode {
        let registry = Registry::new();
        match Node::from_value(decl, NodeOptions::default(), &registry).unwrap() {
            Node::Function(node) => node,
            other => panic!("expected function node, got {}", other),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(NodeState::new("FunctionNode", "double"))
    }

    #[tokio::test]
    async fn test_invoke_registered_function() {
        let node = function_node(json!({
            "kind": "FunctionNode",
            "name": "double",
            "func": "lib.math.double"
        }));
        let mut functions = FunctionRegistry::new();
        functions
            .register("lib.math.double", |input: Value, _ctx| async move {
                Ok(json!({"value": input["value"].as_i64().unwrap_or_default() * 2}))
            })
            .unwrap();

        let output = node.invoke(&functions, json!({"value": 21}), ctx()).await.unwrap();
        assert_eq!(output, json!({"value": 42}));
    }

    #[tokio::test]
    async fn test_set_func_overrides_registry() {
        let mut node = function_node(json!({"kind": "FunctionNode", "name": "double"}));
        node.set_func(|_input, ctx| async move { Ok(json!(ctx.node_state.name)) });

        let output = node
            .invoke(&FunctionRegistry::new(), Value::Null, ctx())
            .await
            .unwrap();
        assert_eq!(output, json!("double"));
    }

    #[tokio::test]
    async fn test_invoke_without_func() {
        let node = function_node(json!({"kind": "FunctionNode", "name": "double"}));
        let error = node
            .invoke(&FunctionRegistry::new(), Value::Null, ctx())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "func is not set for the FunctionNode");
    }
}
