//! Edge conditions: the `when` expression language.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{CompareOp, Expr, LogicalOp, WhenExpr};
pub use evaluator::{is_truthy, ConditionalEvaluator};
pub use parser::parse_when;
