//! Demo time-series query: resolve a metric to its shards, scan every
//! shard in the requested time range, then sum the points per host.
//!
//! The data is synthetic. Shard `i` holds one series per host whose
//! points all have value `i + 1`, which keeps results easy to check.

use std::collections::BTreeMap;
use std::sync::Arc;

use frost_common::{Error, ExecContext, FlushEvent, FlushNotifier, Flusher, Result};
use frost_concurrent::Pool;
use frost_query::{
    CancellableNode, FnNode, PlanNodeRef, PlanStage, StageBuilder, StageRef, StageType, TracedNode,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Series {
    pub host: String,
    pub points: Vec<(i64, f64)>,
}

#[derive(Debug, Clone)]
pub struct Shard {
    pub id: u32,
    pub series: Vec<Series>,
}

/// In-memory stand-in for the storage engine.
#[derive(Debug)]
pub struct SeriesStore {
    metric: String,
    shards: Vec<Shard>,
}

impl SeriesStore {
    pub fn synthetic(metric: impl Into<String>, shards: u32, hosts: usize, points: i64) -> Self {
        let shards = (0..shards)
            .map(|id| Shard {
                id,
                series: (0..hosts)
                    .map(|h| Series {
                        host: format!("host-{h}"),
                        points: (0..points).map(|ts| (ts, f64::from(id + 1))).collect(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            metric: metric.into(),
            shards,
        }
    }

    pub fn shard_ids(&self) -> Vec<u32> {
        self.shards.iter().map(|s| s.id).collect()
    }

    fn shard(&self, id: u32) -> Option<&Shard> {
        self.shards.iter().find(|s| s.id == id)
    }
}

/// Intermediate and final state shared by the stages of one query.
#[derive(Debug, Default)]
pub struct QueryState {
    shards: Mutex<Vec<u32>>,
    rows: Mutex<Vec<(String, f64)>>,
    groups: Mutex<BTreeMap<String, f64>>,
    persisted: Mutex<Option<BTreeMap<String, f64>>>,
}

impl QueryState {
    pub fn groups(&self) -> BTreeMap<String, f64> {
        self.groups.lock().clone()
    }

    pub fn rows_scanned(&self) -> usize {
        self.rows.lock().len()
    }

    /// The result as last written by a flush.
    pub fn persisted(&self) -> Option<BTreeMap<String, f64>> {
        self.persisted.lock().clone()
    }
}

impl Flusher for QueryState {
    fn flush(&self) -> Result<()> {
        let groups = self.groups.lock().clone();
        if groups.is_empty() {
            return Err(Error::Flush("no grouped rows to persist".to_string()));
        }
        *self.persisted.lock() = Some(groups);
        Ok(())
    }
}

/// `SELECT sum(value) FROM <metric> WHERE time in [start, end) GROUP BY host`.
#[derive(Debug, Clone)]
pub struct DemoQuery {
    pub metric: String,
    pub start: i64,
    pub end: i64,
    /// Name of a plan node that fails instead of running.
    pub fail_at: Option<String>,
}

impl DemoQuery {
    pub fn new(metric: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            metric: metric.into(),
            start,
            end,
            fail_at: None,
        }
    }

    pub fn fail_at(mut self, node: impl Into<String>) -> Self {
        self.fail_at = Some(node.into());
        self
    }

    /// Builds the stage chain for this query, writing into `state`. Stages
    /// run on `pool` when one is given and inline otherwise. With a
    /// `notifier`, the grouping stage asks it to persist the result once it
    /// completes.
    pub fn build(
        &self,
        store: Arc<SeriesStore>,
        state: &Arc<QueryState>,
        ctx: &ExecContext,
        pool: Option<Arc<dyn Pool>>,
        notifier: Option<Arc<FlushNotifier>>,
    ) -> StageRef {
        let mut grouping = self
            .stage(StageType::Grouping, ctx, &pool)
            .root(self.grouping_node(state, ctx));
        if let Some(notifier) = notifier {
            grouping = grouping.on_complete(move || {
                notifier.notify(FlushEvent::new(|result| match result {
                    Ok(()) => info!("query result persisted"),
                    Err(err) => warn!(%err, "failed to persist query result"),
                }));
            });
        }
        let grouping: StageRef = Arc::new(grouping.build());

        let scan: StageRef = Arc::new(
            self.stage(StageType::ShardScan, ctx, &pool)
                .root(self.scan_node(&store, state, ctx))
                .then(grouping)
                .build(),
        );

        let lookup = self
            .stage(StageType::MetadataLookup, ctx, &pool)
            .root(self.lookup_node(&store, state, ctx))
            .then(scan)
            .build();

        Arc::new(lookup)
    }

    fn stage(
        &self,
        stage_type: StageType,
        ctx: &ExecContext,
        pool: &Option<Arc<dyn Pool>>,
    ) -> StageBuilder {
        let builder = PlanStage::builder(stage_type).context(ctx.clone());
        match pool {
            Some(pool) => builder.pool(pool.clone()),
            None => builder,
        }
    }

    /// Wraps node logic with cancellation checks, tracing and failure
    /// injection.
    fn node<F>(
        &self,
        ctx: &ExecContext,
        name: String,
        f: F,
        children: Vec<PlanNodeRef>,
    ) -> PlanNodeRef
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let fail = self.fail_at.as_deref() == Some(name.as_str());
        let failing_name = name.clone();
        let inner = FnNode::new(name, move || {
            if fail {
                return Err(Error::execution(format!("injected failure at {failing_name}")));
            }
            f()
        })
        .with_children(children);
        Arc::new(CancellableNode::new(ctx.clone(), TracedNode::new(inner)))
    }

    fn lookup_node(
        &self,
        store: &Arc<SeriesStore>,
        state: &Arc<QueryState>,
        ctx: &ExecContext,
    ) -> PlanNodeRef {
        let store = store.clone();
        let state = state.clone();
        let metric = self.metric.clone();
        self.node(
            ctx,
            "lookup-metric".to_string(),
            move || {
                if store.metric != metric {
                    return Err(Error::execution(format!("metric {metric} not found")));
                }
                *state.shards.lock() = store.shard_ids();
                debug!(%metric, shards = store.shards.len(), "metric resolved");
                Ok(())
            },
            Vec::new(),
        )
    }

    fn scan_node(
        &self,
        store: &Arc<SeriesStore>,
        state: &Arc<QueryState>,
        ctx: &ExecContext,
    ) -> PlanNodeRef {
        let (start, end) = (self.start, self.end);
        let shards = store
            .shard_ids()
            .into_iter()
            .map(|id| {
                let store = store.clone();
                let state = state.clone();
                self.node(
                    ctx,
                    format!("scan-shard-{id}"),
                    move || {
                        if !state.shards.lock().contains(&id) {
                            return Ok(());
                        }
                        let Some(shard) = store.shard(id) else {
                            return Err(Error::execution(format!("shard {id} missing")));
                        };
                        let rows: Vec<_> = shard
                            .series
                            .iter()
                            .flat_map(|s| {
                                s.points
                                    .iter()
                                    .filter(|(ts, _)| *ts >= start && *ts < end)
                                    .map(|(_, v)| (s.host.clone(), *v))
                            })
                            .collect();
                        state.rows.lock().extend(rows);
                        Ok(())
                    },
                    Vec::new(),
                )
            })
            .collect();

        let state = state.clone();
        self.node(
            ctx,
            "scan-shards".to_string(),
            move || {
                let shards = state.shards.lock().len();
                if shards == 0 {
                    return Err(Error::execution("no shards to scan"));
                }
                debug!(shards, start, end, "scanning shards");
                Ok(())
            },
            shards,
        )
    }

    fn grouping_node(&self, state: &Arc<QueryState>, ctx: &ExecContext) -> PlanNodeRef {
        let state = state.clone();
        self.node(
            ctx,
            "group-by-host".to_string(),
            move || {
                let mut groups = BTreeMap::new();
                for (host, value) in state.rows.lock().iter() {
                    *groups.entry(host.clone()).or_insert(0.0) += value;
                }
                *state.groups.lock() = groups;
                Ok(())
            },
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frost_query::Pipeline;

    fn store() -> Arc<SeriesStore> {
        Arc::new(SeriesStore::synthetic("cpu.load", 4, 3, 10))
    }

    fn build(query: DemoQuery, pipeline: &Pipeline) -> (StageRef, Arc<QueryState>) {
        let state = Arc::new(QueryState::default());
        let entry = query.build(store(), &state, pipeline.context(), None, None);
        (entry, state)
    }

    #[test]
    fn sync_query_sums_points_per_host() {
        let pipeline = Pipeline::new(ExecContext::new());
        let (entry, state) = build(DemoQuery::new("cpu.load", 0, 10), &pipeline);

        let stats = pipeline.run_blocking(vec![entry]).unwrap();
        assert_eq!(stats.stages_completed, 3);
        assert_eq!(state.rows_scanned(), 4 * 3 * 10);
        // (1 + 2 + 3 + 4) * 10 points per host.
        let groups = state.groups();
        assert_eq!(groups.len(), 3);
        assert!(groups.values().all(|v| *v == 100.0));
    }

    #[test]
    fn time_range_filters_points() {
        let pipeline = Pipeline::new(ExecContext::new());
        let (entry, state) = build(DemoQuery::new("cpu.load", 5, 7), &pipeline);

        pipeline.run_blocking(vec![entry]).unwrap();
        assert_eq!(state.groups().get("host-0"), Some(&20.0));
    }

    #[test]
    fn unknown_metric_fails_lookup() {
        let pipeline = Pipeline::new(ExecContext::new());
        let (entry, state) = build(DemoQuery::new("mem.used", 0, 10), &pipeline);

        assert_eq!(
            pipeline.run_blocking(vec![entry]),
            Err(Error::execution("metric mem.used not found"))
        );
        assert_eq!(state.rows_scanned(), 0);
    }

    #[test]
    fn injected_failure_stops_later_shards() {
        let pipeline = Pipeline::new(ExecContext::new());
        let query = DemoQuery::new("cpu.load", 0, 10).fail_at("scan-shard-1");
        let (entry, state) = build(query, &pipeline);

        assert_eq!(
            pipeline.run_blocking(vec![entry]),
            Err(Error::execution("injected failure at scan-shard-1"))
        );
        // Only shard 0 ran before the failure.
        assert_eq!(state.rows_scanned(), 3 * 10);
        assert!(state.groups().is_empty());
    }

    #[test]
    fn flush_without_groups_is_an_error() {
        let state = QueryState::default();
        assert_eq!(
            state.flush(),
            Err(Error::Flush("no grouped rows to persist".to_string()))
        );
    }
}
