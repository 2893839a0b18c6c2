use super::ast::{CompareOp, Expr, LogicalOp, WhenExpr};
use crate::core::functions::FunctionRegistry;
use crate::utils::error::{LimanError, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Evaluates parsed `when` expressions against a node's output and state.
///
/// `context` holds the `$` variables (`$output`, `$status`, `$state`),
/// `state_context` the `context` map of the node state.
pub struct ConditionalEvaluator<'a> {
    pub context: Map<String, Value>,
    pub state_context: Map<String, Value>,
    functions: Option<&'a FunctionRegistry>,
}

impl<'a> ConditionalEvaluator<'a> {
    pub fn new(context: Map<String, Value>, state_context: Map<String, Value>) -> Self {
        Self {
            context,
            state_context,
            functions: None,
        }
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn evaluate(&self, expr: &WhenExpr) -> Result<bool> {
        match expr {
            WhenExpr::Conditional(expr) => self.evaluate_expr(expr),
            WhenExpr::FunctionRef(name) => self.evaluate_function_ref(name),
        }
    }

    pub fn evaluate_expr(&self, expr: &Expr) -> Result<bool> {
        match expr {
            Expr::Bool(value) => Ok(*value),
            Expr::Number(value) => Ok(*value != 0.0),
            Expr::Str(value) => Ok(!value.is_empty()),
            Expr::Var(name) => Ok(is_truthy(self.resolve_variable(name)?)),
            Expr::Not(inner) => Ok(!self.evaluate_expr(inner)?),
            Expr::Logical { op, left, right } => match op {
                LogicalOp::And => Ok(self.evaluate_expr(left)? && self.evaluate_expr(right)?),
                LogicalOp::Or => Ok(self.evaluate_expr(left)? || self.evaluate_expr(right)?),
            },
            Expr::Comparison { op, left, right } => self.evaluate_comparison(*op, left, right),
        }
    }

    fn evaluate_comparison(&self, op: CompareOp, left: &Expr, right: &Expr) -> Result<bool> {
        let left = self.resolve_operand(left)?;
        let right = self.resolve_operand(right)?;

        match op {
            CompareOp::Eq => Ok(values_equal(&left, &right)),
            CompareOp::Ne => Ok(!values_equal(&left, &right)),
            CompareOp::Gt | CompareOp::Lt => {
                let ordering = compare_values(&left, &right).ok_or_else(|| {
                    LimanError::evaluation(format!(
                        "Cannot compare {} and {} with '{}'",
                        left,
                        right,
                        op.as_str()
                    ))
                })?;
                Ok(match op {
                    CompareOp::Gt => ordering == Ordering::Greater,
                    _ => ordering == Ordering::Less,
                })
            }
        }
    }

    fn resolve_operand(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Number(value) => Ok(number_value(*value)),
            Expr::Str(value) => Ok(Value::String(value.clone())),
            Expr::Var(name) => self.resolve_variable(name).cloned(),
            other => Ok(Value::Bool(self.evaluate_expr(other)?)),
        }
    }

    /// `$name` (optionally with a dotted path) is looked up in the `$` context.
    /// Plain names are looked up in the state context first.
    pub fn resolve_variable(&self, name: &str) -> Result<&Value> {
        if name.starts_with('$') {
            let mut segments = name.split('.');
            let head = segments.next().unwrap_or(name);
            let not_found = || LimanError::VariableNotFound {
                name: name.to_string(),
                scope: "context".to_string(),
            };

            let mut value = self.context.get(head).ok_or_else(not_found)?;
            for segment in segments {
                value = value.get(segment).ok_or_else(not_found)?;
            }
            return Ok(value);
        }

        self.state_context
            .get(name)
            .or_else(|| self.context.get(name))
            .ok_or_else(|| LimanError::VariableNotFound {
                name: name.to_string(),
                scope: "context or state.context".to_string(),
            })
    }

    fn evaluate_function_ref(&self, name: &str) -> Result<bool> {
        let func = self
            .functions
            .and_then(|functions| functions.get_condition(name))
            .ok_or_else(|| {
                LimanError::invalid_spec(format!(
                    "Failed to import or execute function '{}': not registered",
                    name
                ))
            })?;

        let value = func(&self.context, &self.state_context).map_err(|e| {
            LimanError::evaluation(format!("Function execution failed: {}", e))
        })?;
        Ok(is_truthy(&value))
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(value) => !value.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}
