use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frost_common::ExecContext;
use frost_concurrent::Pool;
use parking_lot::Mutex;
use tracing::warn;

use super::{BaseStage, OnComplete, OnError, Stage, StageRef, StageState, StageType};
use crate::plan::PlanNodeRef;

type CompleteHook = Box<dyn FnOnce() + Send>;

/// General-purpose stage: a plan root, the stages that follow it and an
/// optional hook run from `complete` to release resources.
pub struct PlanStage {
    base: BaseStage,
    root: Option<PlanNodeRef>,
    next: Vec<StageRef>,
    hook: Mutex<Option<CompleteHook>>,
    completed: AtomicBool,
}

impl PlanStage {
    pub fn builder(stage_type: StageType) -> StageBuilder {
        StageBuilder::new(stage_type)
    }

    pub fn state(&self) -> StageState {
        self.base.state()
    }

    pub fn is_async(&self) -> bool {
        self.base.is_async()
    }
}

impl Stage for PlanStage {
    fn stage_type(&self) -> StageType {
        self.base.stage_type()
    }

    fn root(&self) -> Option<PlanNodeRef> {
        self.root.clone()
    }

    fn execute(&self, node: Option<PlanNodeRef>, on_complete: OnComplete, on_error: OnError) {
        self.base.execute(node, on_complete, on_error);
    }

    fn complete(&self) {
        if self.base.state() != StageState::Completed {
            warn!(
                stage = %self.stage_type(),
                state = ?self.base.state(),
                "complete called before stage completed"
            );
            return;
        }
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hook) = self.hook.lock().take() {
            hook();
        }
    }

    fn next_stages(&self) -> Vec<StageRef> {
        self.next.clone()
    }
}

/// Fluent construction of a [`PlanStage`].
pub struct StageBuilder {
    stage_type: StageType,
    root: Option<PlanNodeRef>,
    ctx: Option<ExecContext>,
    pool: Option<Arc<dyn Pool>>,
    next: Vec<StageRef>,
    hook: Option<CompleteHook>,
}

impl StageBuilder {
    pub fn new(stage_type: StageType) -> Self {
        Self {
            stage_type,
            root: None,
            ctx: None,
            pool: None,
            next: Vec::new(),
            hook: None,
        }
    }

    pub fn root(mut self, root: PlanNodeRef) -> Self {
        self.root = Some(root);
        self
    }

    pub fn context(mut self, ctx: ExecContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn pool(mut self, pool: Arc<dyn Pool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Adds a stage to run after this one; order is kept.
    pub fn then(mut self, stage: StageRef) -> Self {
        self.next.push(stage);
        self
    }

    pub fn on_complete(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> PlanStage {
        let mut base = BaseStage::new(self.stage_type);
        if let Some(ctx) = self.ctx {
            base = base.with_context(ctx);
        }
        if let Some(pool) = self.pool {
            base = base.with_pool(pool);
        }
        PlanStage {
            base,
            root: self.root,
            next: self.next,
            hook: Mutex::new(self.hook),
            completed: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FnNode;
    use frost_concurrent::InlinePool;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn builder_wires_everything() {
        let tail: StageRef = Arc::new(PlanStage::builder(StageType::Grouping).build());
        let stage = PlanStage::builder(StageType::ShardScan)
            .root(Arc::new(FnNode::new("scan", || Ok(()))))
            .context(ExecContext::new())
            .pool(Arc::new(InlinePool))
            .then(tail.clone())
            .build();

        assert_eq!(stage.stage_type(), StageType::ShardScan);
        assert_eq!(stage.root().map(|r| r.name().to_string()), Some("scan".to_string()));
        assert!(stage.is_async());
        let next = stage.next_stages();
        assert_eq!(next.len(), 1);
        assert!(Arc::ptr_eq(&next[0], &tail));
    }

    #[test]
    fn complete_hook_runs_once_and_only_after_completion() {
        let (count, hook) = counting_hook();
        let stage = PlanStage::builder(StageType::Grouping)
            .root(Arc::new(FnNode::new("group", || Ok(()))))
            .on_complete(hook)
            .build();

        // Not completed yet.
        stage.complete();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        stage.execute(stage.root(), Box::new(|| {}), Box::new(|_| {}));
        stage.complete();
        stage.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_stage_never_runs_hook() {
        let (count, hook) = counting_hook();
        let stage = PlanStage::builder(StageType::DataLoad)
            .root(Arc::new(FnNode::new("load", || {
                Err(frost_common::Error::execution("no data"))
            })))
            .on_complete(hook)
            .build();

        stage.execute(stage.root(), Box::new(|| {}), Box::new(|_| {}));
        assert_eq!(stage.state(), StageState::Failed);
        stage.complete();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
