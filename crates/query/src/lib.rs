//! Query crate
//!
//! Execution orchestration of the Frost query core: plan node trees are
//! run depth-first by [`Stage`]s, and a [`Pipeline`] chains stages through
//! their `next_stages`.

pub mod node;
pub mod pipeline;
pub mod plan;
pub mod stage;

pub use node::{CancellableNode, FnNode, TracedNode};
pub use pipeline::{Pipeline, PipelineStats};
pub use plan::{execute_tree, PlanNode, PlanNodeRef};
pub use stage::{
    BaseStage, OnComplete, OnError, PlanStage, Stage, StageBuilder, StageRef, StageState,
    StageType,
};
