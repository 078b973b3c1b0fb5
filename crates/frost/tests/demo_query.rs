use std::sync::Arc;

use frost::demo::{DemoQuery, QueryState, SeriesStore};
use frost_common::{Error, ExecContext, FlushNotifier, Flusher};
use frost_concurrent::{Pool, PoolSettings, WorkerPool};
use frost_query::Pipeline;

fn pool() -> Arc<dyn Pool> {
    let settings = PoolSettings::default().with_workers(3).with_queue_capacity(16);
    Arc::new(WorkerPool::new("demo-test", &settings).unwrap())
}

fn notifier(state: &Arc<QueryState>) -> Arc<FlushNotifier> {
    let flusher: Arc<dyn Flusher> = state.clone();
    Arc::new(FlushNotifier::start("demo-test", flusher).unwrap())
}

#[tokio::test]
async fn pooled_query_groups_and_persists() {
    let store = Arc::new(SeriesStore::synthetic("cpu.load", 3, 2, 5));
    let state = Arc::new(QueryState::default());
    let notifier = notifier(&state);
    let pipeline = Pipeline::new(ExecContext::new());

    let entry = DemoQuery::new("cpu.load", 0, 5).build(
        store,
        &state,
        pipeline.context(),
        Some(pool()),
        Some(notifier.clone()),
    );
    let stats = pipeline.run(vec![entry]).await.unwrap();
    notifier.close();

    assert_eq!(stats.stages_completed, 3);
    // (1 + 2 + 3) * 5 points per host.
    let groups = state.groups();
    assert_eq!(groups.get("host-0"), Some(&30.0));
    assert_eq!(groups.get("host-1"), Some(&30.0));
    assert_eq!(state.persisted(), Some(groups));
}

#[tokio::test]
async fn failed_query_cancels_and_skips_persisting() {
    let store = Arc::new(SeriesStore::synthetic("cpu.load", 3, 2, 5));
    let state = Arc::new(QueryState::default());
    let notifier = notifier(&state);
    let pipeline = Pipeline::new(ExecContext::new());

    let entry = DemoQuery::new("cpu.load", 0, 5).fail_at("group-by-host").build(
        store,
        &state,
        pipeline.context(),
        Some(pool()),
        Some(notifier.clone()),
    );
    let err = pipeline.run(vec![entry]).await.unwrap_err();
    notifier.close();

    assert_eq!(err, Error::execution("injected failure at group-by-host"));
    assert!(pipeline.context().is_cancelled());
    assert_eq!(state.rows_scanned(), 3 * 2 * 5);
    assert_eq!(state.persisted(), None);
}

#[tokio::test]
async fn expired_query_is_rejected_by_the_pool() {
    let store = Arc::new(SeriesStore::synthetic("cpu.load", 2, 1, 5));
    let state = Arc::new(QueryState::default());
    let ctx = ExecContext::with_timeout(std::time::Duration::ZERO);
    let pipeline = Pipeline::new(ctx);

    let entry = DemoQuery::new("cpu.load", 0, 5).build(
        store,
        &state,
        pipeline.context(),
        Some(pool()),
        None,
    );
    let err = pipeline.run(vec![entry]).await.unwrap_err();

    assert_eq!(err, Error::DeadlineExceeded);
    assert_eq!(state.rows_scanned(), 0);
}
