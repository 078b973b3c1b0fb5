//! Reusable plan node building blocks.
//!
//! Concrete nodes (shard scans, groupings, merges) usually only implement
//! [`PlanNode::execute`]. The wrappers here add the cross-cutting parts:
//! cooperative cancellation and tracing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use frost_common::{ExecContext, Result};
use tracing::{debug, warn};

use crate::plan::{PlanNode, PlanNodeRef};

/// A node whose logic is a closure.
pub struct FnNode<F> {
    name: String,
    f: F,
    children: Vec<PlanNodeRef>,
}

impl<F> FnNode<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<PlanNodeRef>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: PlanNodeRef) -> Self {
        self.children.push(child);
        self
    }
}

impl<F> PlanNode for FnNode<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn execute(&self) -> Result<()> {
        (self.f)()
    }

    fn children(&self) -> &[PlanNodeRef] {
        &self.children
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnNode<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Checks the query context before running the wrapped node, so a
/// cancelled or expired query stops at the next node boundary.
pub struct CancellableNode<N> {
    ctx: ExecContext,
    inner: N,
}

impl<N: PlanNode> CancellableNode<N> {
    pub fn new(ctx: ExecContext, inner: N) -> Self {
        Self { ctx, inner }
    }
}

impl<N: PlanNode> PlanNode for CancellableNode<N> {
    fn execute(&self) -> Result<()> {
        self.ctx.check()?;
        self.inner.execute()
    }

    fn children(&self) -> &[PlanNodeRef] {
        self.inner.children()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Logs timing and outcome of the wrapped node and counts its runs.
pub struct TracedNode<N> {
    inner: N,
    runs: AtomicU64,
}

impl<N: PlanNode> TracedNode<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            runs: AtomicU64::new(0),
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

impl<N: PlanNode> PlanNode for TracedNode<N> {
    fn execute(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = self.inner.execute();
        let elapsed_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(()) => debug!(node = self.inner.name(), elapsed_us, "plan node done"),
            Err(err) => warn!(node = self.inner.name(), elapsed_us, %err, "plan node failed"),
        }
        result
    }

    fn children(&self) -> &[PlanNodeRef] {
        self.inner.children()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
