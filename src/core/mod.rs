pub mod actor;
pub mod executor;
pub mod functions;
pub mod nodes;
pub mod registry;
pub mod when;

pub use crate::domain::model::{ExecutionContext, Message, NodeOutput, NodeState, ToolCall};
pub use crate::domain::ports::{ChatModel, Plugin, StateStorage};
pub use crate::utils::error::Result;
pub use actor::{ActorResult, NextNode, NodeActor, NodeActorStatus};
pub use executor::{Executor, ExecutorInput, ExecutorOutput, ExecutorState, ExecutorStatus};
pub use functions::FunctionRegistry;
pub use nodes::{Node, NodeOptions};
pub use registry::Registry;
