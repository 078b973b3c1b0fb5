//! Query stages: execution phases that each own a plan subtree.

mod base;
mod plan_stage;

use std::fmt;
use std::sync::Arc;

use frost_common::Error;

use crate::plan::PlanNodeRef;

pub use base::BaseStage;
pub use plan_stage::{PlanStage, StageBuilder};

pub type OnComplete = Box<dyn FnOnce() + Send>;
pub type OnError = Box<dyn FnOnce(Error) + Send>;

pub type StageRef = Arc<dyn Stage>;

/// Role of a stage in a distributed time-series query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageType {
    /// Resolves metric, tag and field metadata.
    MetadataLookup,
    /// Builds the physical plan fanned out to storage nodes.
    PhysicalPlan,
    /// Scans shard data on storage nodes.
    ShardScan,
    /// Groups and aggregates scanned series.
    Grouping,
    /// Loads field data for grouped series.
    DataLoad,
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageType::MetadataLookup => "MetadataLookup",
            StageType::PhysicalPlan => "PhysicalPlan",
            StageType::ShardScan => "ShardScan",
            StageType::Grouping => "Grouping",
            StageType::DataLoad => "DataLoad",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one stage run.
///
/// `Created -> Executing -> {Completed, Failed}`; the last two are terminal
/// for that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Created,
    Executing,
    Completed,
    Failed,
}

/// One phase of a multi-phase query, driven by the pipeline.
pub trait Stage: Send + Sync {
    fn stage_type(&self) -> StageType;

    /// The plan subtree this stage owns, handed to `execute` by the pipeline.
    fn root(&self) -> Option<PlanNodeRef> {
        None
    }

    /// Runs `node` depth-first and reports through exactly one of the two
    /// continuations. With a pool and a context configured the call returns
    /// before the node runs; otherwise everything, continuation included,
    /// happens before it returns.
    fn execute(&self, node: Option<PlanNodeRef>, on_complete: OnComplete, on_error: OnError);

    /// Called by the pipeline after `on_complete` fired.
    fn complete(&self) {}

    /// Stages to schedule once this one completes.
    fn next_stages(&self) -> Vec<StageRef> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Terminal;

    impl Stage for Terminal {
        fn stage_type(&self) -> StageType {
            StageType::Grouping
        }

        fn execute(&self, _node: Option<PlanNodeRef>, on_complete: OnComplete, _: OnError) {
            on_complete();
        }
    }

    #[test]
    fn trait_defaults_are_terminal_no_ops() {
        let stage = Terminal;
        assert!(stage.root().is_none());
        assert!(stage.next_stages().is_empty());
        stage.complete();
        assert_eq!(stage.stage_type(), StageType::Grouping);
    }

    #[test]
    fn stage_type_names() {
        assert_eq!(StageType::MetadataLookup.to_string(), "MetadataLookup");
        assert_eq!(StageType::ShardScan.to_string(), "ShardScan");
        assert_eq!(StageType::DataLoad.to_string(), "DataLoad");
    }
}
