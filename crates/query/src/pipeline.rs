//! Drives stages to completion, scheduling each stage's `next_stages`
//! after it succeeds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use frost_common::{Error, ExecContext, Result};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::stage::{StageRef, StageType};

/// Summary of a successful pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub stages_completed: usize,
}

enum StageEvent {
    Completed(usize),
    Failed(usize, Error),
}

/// Bookkeeping of one `run`, owned by the driver loop.
struct RunState {
    pending: VecDeque<StageRef>,
    in_flight: HashMap<usize, StageRef>,
    // Keyed by address, so finished stages stay alive until the run ends.
    seen: HashSet<usize>,
    finished: Vec<StageRef>,
    next_id: usize,
    completed: usize,
}

impl RunState {
    fn new(entry: Vec<StageRef>) -> Self {
        Self {
            pending: entry.into(),
            in_flight: HashMap::new(),
            seen: HashSet::new(),
            finished: Vec::new(),
            next_id: 0,
            completed: 0,
        }
    }
}

/// Runs the stages of one query.
///
/// Stages should be built with this pipeline's [`context`](Self::context)
/// (or a child of it): on the first stage failure the pipeline cancels it so
/// in-flight pool work can stop early, and returns that stage's error
/// without waiting for the rest.
pub struct Pipeline {
    id: Uuid,
    ctx: ExecContext,
}

impl Pipeline {
    pub fn new(ctx: ExecContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Executes `entry` and everything reachable through `next_stages`.
    ///
    /// Each stage instance runs at most once per call, even if several
    /// stages name it as a successor. `complete` is called on a stage only
    /// after its completion continuation fired, and before its successors
    /// are scheduled. Events from inline stages are handled before the next
    /// stage is scheduled, so nothing starts after a failure.
    pub async fn run(&self, entry: Vec<StageRef>) -> Result<PipelineStats> {
        let started = Instant::now();
        info!(query_id = %self.id, stages = entry.len(), "pipeline started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut run = RunState::new(entry);

        loop {
            while let Some(stage) = run.pending.pop_front() {
                if !run.seen.insert(Arc::as_ptr(&stage) as *const () as usize) {
                    debug!(
                        query_id = %self.id,
                        stage = %stage.stage_type(),
                        "stage already scheduled"
                    );
                    continue;
                }
                let id = run.next_id;
                run.next_id += 1;
                run.in_flight.insert(id, stage.clone());
                self.schedule(id, stage, tx.clone());

                while let Ok(event) = rx.try_recv() {
                    self.handle(&mut run, event)?;
                }
            }

            if run.in_flight.is_empty() {
                break;
            }

            let event = rx
                .recv()
                .await
                .ok_or_else(|| Error::Internal("pipeline event channel closed".to_string()))?;
            self.handle(&mut run, event)?;
        }

        info!(
            query_id = %self.id,
            stages = run.completed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(PipelineStats {
            stages_completed: run.completed,
        })
    }

    /// Runs the pipeline to completion on a private current-thread runtime.
    ///
    /// Must not be called from within an async runtime.
    pub fn run_blocking(&self, entry: Vec<StageRef>) -> Result<PipelineStats> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build pipeline runtime: {e}")))?;
        runtime.block_on(self.run(entry))
    }

    fn handle(&self, run: &mut RunState, event: StageEvent) -> Result<()> {
        match event {
            StageEvent::Completed(id) => {
                let Some(stage) = run.in_flight.remove(&id) else {
                    return Ok(());
                };
                stage.complete();
                run.completed += 1;
                let next = stage.next_stages();
                debug!(
                    query_id = %self.id,
                    stage = %stage.stage_type(),
                    next = next.len(),
                    "stage finished"
                );
                run.pending.extend(next);
                run.finished.push(stage);
                Ok(())
            }
            StageEvent::Failed(id, err) => {
                let stage_type = run.in_flight.get(&id).map(|s| s.stage_type());
                self.ctx.cancel();
                error!(
                    query_id = %self.id,
                    stage = %display_type(stage_type),
                    in_flight = run.in_flight.len().saturating_sub(1),
                    %err,
                    "pipeline aborted"
                );
                Err(err)
            }
        }
    }

    fn schedule(&self, id: usize, stage: StageRef, tx: UnboundedSender<StageEvent>) {
        debug!(query_id = %self.id, stage = %stage.stage_type(), "scheduling stage");
        let err_tx = tx.clone();
        stage.execute(
            stage.root(),
            Box::new(move || {
                // The receiver is gone once the pipeline has already failed.
                let _ = tx.send(StageEvent::Completed(id));
            }),
            Box::new(move |err| {
                let _ = err_tx.send(StageEvent::Failed(id, err));
            }),
        );
    }
}

fn display_type(stage_type: Option<StageType>) -> String {
    stage_type.map_or_else(|| "unknown".to_string(), |t| t.to_string())
}
