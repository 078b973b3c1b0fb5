use std::sync::Arc;

use frost_common::{Error, ExecContext};
use frost_concurrent::{Pool, Task};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{OnComplete, OnError, StageState, StageType};
use crate::plan::{execute_tree, PlanNodeRef};

/// Shared behaviour of every stage kind: type tag, optional pool/context
/// pair, and the run that executes a plan tree and reports its outcome.
pub struct BaseStage {
    stage_type: StageType,
    ctx: Option<ExecContext>,
    pool: Option<Arc<dyn Pool>>,
    state: Arc<Mutex<RunSlot>>,
}

/// State of the latest run. `generation` identifies that run so a stale
/// outcome from an earlier, overlapping run cannot overwrite it.
#[derive(Debug)]
struct RunSlot {
    generation: u64,
    state: StageState,
}

impl BaseStage {
    /// A stage that runs inline on the caller's thread.
    pub fn new(stage_type: StageType) -> Self {
        Self {
            stage_type,
            ctx: None,
            pool: None,
            state: Arc::new(Mutex::new(RunSlot {
                generation: 0,
                state: StageState::Created,
            })),
        }
    }

    pub fn with_context(mut self, ctx: ExecContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn Pool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn stage_type(&self) -> StageType {
        self.stage_type
    }

    /// State of the most recent `execute`.
    pub fn state(&self) -> StageState {
        self.state.lock().state
    }

    pub fn context(&self) -> Option<&ExecContext> {
        self.ctx.as_ref()
    }

    /// Whether `execute` hands its work to the pool.
    pub fn is_async(&self) -> bool {
        self.pool.is_some() && self.ctx.is_some()
    }

    /// Executes `node` and fires exactly one of the continuations.
    ///
    /// Without both a pool and a context the tree runs on the calling
    /// thread. Otherwise the run is submitted as a pool task under the
    /// stage's context and this call returns immediately. Errors from the
    /// tree, pool rejections and panics all reach `on_error` unchanged.
    pub fn execute(&self, node: Option<PlanNodeRef>, on_complete: OnComplete, on_error: OnError) {
        let generation = {
            let mut slot = self.state.lock();
            slot.generation += 1;
            slot.state = StageState::Executing;
            slot.generation
        };
        let outcome = Arc::new(Outcome {
            stage_type: self.stage_type,
            generation,
            state: self.state.clone(),
            pending: Mutex::new(Some((on_complete, on_error))),
        });

        let run = {
            let outcome = outcome.clone();
            move || match execute_tree(node.as_ref()) {
                Ok(()) => outcome.complete(),
                Err(err) => outcome.fail(err),
            }
        };
        let task = Task::new(run, move |err| outcome.fail(err));

        match (&self.pool, &self.ctx) {
            (Some(pool), Some(ctx)) => {
                debug!(stage = %self.stage_type, pool = pool.name(), "submitting stage");
                pool.submit(ctx, task);
            }
            _ => {
                debug!(stage = %self.stage_type, "executing stage inline");
                task.run();
            }
        }
    }
}

/// Continuations of one run. Whichever of `complete`/`fail` comes first
/// wins; later calls are ignored.
struct Outcome {
    stage_type: StageType,
    generation: u64,
    state: Arc<Mutex<RunSlot>>,
    pending: Mutex<Option<(OnComplete, OnError)>>,
}

impl Outcome {
    fn settle(&self, state: StageState) {
        let mut slot = self.state.lock();
        if slot.generation == self.generation {
            slot.state = state;
        }
    }

    fn complete(&self) {
        let Some((on_complete, _)) = self.pending.lock().take() else {
            return;
        };
        self.settle(StageState::Completed);
        debug!(stage = %self.stage_type, "stage completed");
        on_complete();
    }

    fn fail(&self, err: Error) {
        let Some((_, on_error)) = self.pending.lock().take() else {
            debug!(stage = %self.stage_type, %err, "ignoring error after stage finished");
            return;
        };
        self.settle(StageState::Failed);
        warn!(stage = %self.stage_type, %err, "stage failed");
        on_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FnNode;
    use frost_concurrent::InlinePool;
    use std::sync::mpsc;

    fn ok_node() -> Option<PlanNodeRef> {
        Some(Arc::new(FnNode::new("ok", || Ok(()))))
    }

    fn report() -> (OnComplete, OnError, mpsc::Receiver<Result<(), Error>>) {
        let (tx, rx) = mpsc::channel();
        let err_tx = tx.clone();
        (
            Box::new(move || tx.send(Ok(())).unwrap()),
            Box::new(move |e| err_tx.send(Err(e)).unwrap()),
            rx,
        )
    }

    #[test]
    fn pool_without_context_runs_inline() {
        let stage = BaseStage::new(StageType::ShardScan).with_pool(Arc::new(InlinePool));
        assert!(!stage.is_async());

        let (c, e, rx) = report();
        stage.execute(ok_node(), c, e);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert_eq!(stage.state(), StageState::Completed);
    }

    #[test]
    fn context_without_pool_runs_inline() {
        let stage = BaseStage::new(StageType::ShardScan).with_context(ExecContext::new());
        assert!(!stage.is_async());

        let (c, e, rx) = report();
        stage.execute(ok_node(), c, e);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
    }

    #[test]
    fn state_moves_from_created_to_failed() {
        let stage = BaseStage::new(StageType::Grouping);
        assert_eq!(stage.state(), StageState::Created);

        let (c, e, rx) = report();
        let node: PlanNodeRef = Arc::new(FnNode::new("bad", || Err(Error::execution("bad"))));
        stage.execute(Some(node), c, e);
        assert_eq!(rx.try_recv(), Ok(Err(Error::execution("bad"))));
        assert_eq!(stage.state(), StageState::Failed);
    }

    #[test]
    fn panic_in_inline_run_reaches_on_error() {
        let stage = BaseStage::new(StageType::DataLoad);
        let (c, e, rx) = report();
        let node: PlanNodeRef = Arc::new(FnNode::new("boom", || panic!("corrupt block")));
        stage.execute(Some(node), c, e);
        assert_eq!(
            rx.try_recv(),
            Ok(Err(Error::Panic("corrupt block".to_string())))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_run_does_not_overwrite_latest_state() {
        let pool: Arc<dyn frost_concurrent::Pool> = Arc::new(
            frost_concurrent::WorkerPool::new(
                "rerun",
                &frost_concurrent::PoolSettings::default().with_workers(1),
            )
            .unwrap(),
        );
        let stage = BaseStage::new(StageType::ShardScan)
            .with_context(ExecContext::new())
            .with_pool(pool);

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let slow: PlanNodeRef = Arc::new(FnNode::new("slow", move || {
            let _ = release_rx.lock().recv_timeout(std::time::Duration::from_secs(5));
            Err(Error::execution("stale"))
        }));
        let (c, e, first_rx) = report();
        stage.execute(Some(slow), c, e);

        // The second run queues behind the first on the single worker.
        let (c, e, second_rx) = report();
        stage.execute(ok_node(), c, e);
        release_tx.send(()).unwrap();

        let timeout = std::time::Duration::from_secs(5);
        assert_eq!(
            first_rx.recv_timeout(timeout),
            Ok(Err(Error::execution("stale")))
        );
        assert_eq!(second_rx.recv_timeout(timeout), Ok(Ok(())));
        assert_eq!(stage.state(), StageState::Completed);
    }

    #[test]
    fn panicking_on_complete_does_not_fire_on_error() {
        let stage = BaseStage::new(StageType::DataLoad);
        let (tx, rx) = mpsc::channel::<&str>();
        stage.execute(
            ok_node(),
            Box::new(|| panic!("listener bug")),
            Box::new(move |_| tx.send("error").unwrap()),
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(stage.state(), StageState::Completed);
    }
}
