use std::sync::Arc;

use frost_common::Result;
use tracing::trace;

/// One executable step of a query plan: a scan, filter, aggregate or merge.
///
/// Children run after the node itself, in the order returned by
/// [`PlanNode::children`]. A node never refers back to its parent.
pub trait PlanNode: Send + Sync {
    /// Runs this node's own logic, not its children's.
    fn execute(&self) -> Result<()>;

    fn children(&self) -> &[PlanNodeRef] {
        &[]
    }

    fn name(&self) -> &str {
        "plan_node"
    }
}

pub type PlanNodeRef = Arc<dyn PlanNode>;

/// Executes a plan tree depth-first, pre-order, stopping at the first error.
///
/// A node runs before any of its children, and siblings run in declaration
/// order. The first failing node's error is returned unchanged and nothing
/// after it in traversal order runs. An absent root is a successful no-op.
///
/// The walk keeps pending nodes on an explicit stack, so tree depth is not
/// bounded by the thread's call stack.
pub fn execute_tree(root: Option<&PlanNodeRef>) -> Result<()> {
    let Some(root) = root else {
        return Ok(());
    };

    let mut pending: Vec<&PlanNodeRef> = vec![root];
    while let Some(node) = pending.pop() {
        trace!(node = node.name(), "executing plan node");
        node.execute()?;
        // Reversed so the first child is popped next.
        pending.extend(node.children().iter().rev());
    }
    Ok(())
}
