//! Named callables referenced from manifests.
//!
//! Tool nodes (`func`), function nodes (`func`) and `when` function
//! references are resolved by dotted name against this table.

use crate::domain::model::ExecutionContext;
use crate::utils::error::{LimanError, Result};
use crate::utils::validation::validate_dotted_name;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type FunctionFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Async function called by tool and function nodes.
///
/// Receives the call arguments and the execution context of the node.
pub type NodeFunction = Arc<dyn Fn(Value, ExecutionContext) -> FunctionFuture + Send + Sync>;

/// Condition referenced by a `when` clause. Receives the `$` context and the
/// node state context.
pub type ConditionFunction =
    Arc<dyn Fn(&Map<String, Value>, &Map<String, Value>) -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NodeFunction>,
    conditions: HashMap<String, ConditionFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: &str, func: F) -> Result<()>
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        validate_dotted_name("function name", name)?;
        let func: NodeFunction = Arc::new(move |args, ctx| Box::pin(func(args, ctx)));
        self.functions.insert(name.to_string(), func);
        Ok(())
    }

    pub fn register_condition<F>(&mut self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>, &Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        validate_dotted_name("condition name", name)?;
        self.conditions.insert(name.to_string(), Arc::new(func));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<NodeFunction> {
        self.functions.get(name).cloned()
    }

    pub fn get_condition(&self, name: &str) -> Option<ConditionFunction> {
        self.conditions.get(name).cloned()
    }

    /// Looks up a node function, failing the same way a missing import would.
    pub fn resolve(&self, name: &str) -> Result<NodeFunction> {
        self.get(name).ok_or_else(|| {
            LimanError::invalid_spec(format!("Function '{}' is not registered", name))
        })
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        let mut conditions: Vec<&String> = self.conditions.keys().collect();
        conditions.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &functions)
            .field("conditions", &conditions)
            .finish()
    }
}
