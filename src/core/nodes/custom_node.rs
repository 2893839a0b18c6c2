use super::NodeBase;
use crate::domain::spec::{CustomNodeSpec, NodeKind};
use crate::utils::error::{LimanError, Result};

/// Generic `Node` kind. It can be registered and compiled but has no
/// execution behaviour of its own.
#[derive(Debug)]
pub struct CustomNode {
    pub base: NodeBase,
    pub spec: CustomNodeSpec,
}

impl CustomNode {
    pub(super) fn new(spec: CustomNodeSpec, base: NodeBase) -> Self {
        Self { base, spec }
    }

    pub fn compile(&self) -> Result<()> {
        self.base.mark_compiled(NodeKind::Node)
    }

    pub fn invoke(&self) -> Result<()> {
        Err(LimanError::generic(format!(
            "Node.invoke() is not implemented yet (node '{}')",
            self.spec.name
        )))
    }
}
