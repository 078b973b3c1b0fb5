use std::sync::Arc;

use clap::Parser;
use frost::demo::{DemoQuery, QueryState, SeriesStore};
use frost::{logging, AppError, Settings};
use frost_common::{FlushNotifier, Flusher};
use frost_concurrent::{Pool, WorkerPool};
use frost_query::Pipeline;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs a staged time-series query")]
struct Args {
    /// Configuration file; overrides FROST_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of pool worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Name of a plan node to fail, e.g. `scan-shard-2`.
    #[arg(long)]
    fail_at: Option<String>,

    /// Run every stage inline instead of on the worker pool.
    #[arg(long)]
    sync: bool,

    #[arg(long, default_value = "cpu.load")]
    metric: String,

    #[arg(long, default_value_t = 4)]
    shards: u32,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    if let Some(workers) = args.workers {
        settings.pool.workers = workers;
    }
    logging::init(&settings.log)?;
    info!(?settings, "Frost starting");

    let pool: Option<Arc<dyn Pool>> = if args.sync {
        None
    } else {
        Some(Arc::new(WorkerPool::new("query", &settings.pool)?))
    };

    let store = Arc::new(SeriesStore::synthetic(args.metric.clone(), args.shards, 3, 60));
    let mut query = DemoQuery::new(args.metric, 0, 60);
    if let Some(node) = args.fail_at {
        query = query.fail_at(node);
    }

    let state = Arc::new(QueryState::default());
    let flusher: Arc<dyn Flusher> = state.clone();
    let notifier = Arc::new(FlushNotifier::start("result", flusher)?);

    let pipeline = Pipeline::new(settings.query.context());
    let entry = query.build(store, &state, pipeline.context(), pool, Some(notifier.clone()));

    let outcome = pipeline.run(vec![entry]).await;
    // Waits for the result flush queued by the grouping stage.
    notifier.close();

    match outcome {
        Ok(stats) => {
            info!(
                query_id = %pipeline.id(),
                stages = stats.stages_completed,
                rows = state.rows_scanned(),
                "query finished"
            );
            if state.persisted().is_none() {
                error!(query_id = %pipeline.id(), "query result was not persisted");
            }
            for (host, total) in state.groups() {
                println!("{host}\t{total}");
            }
            Ok(())
        }
        Err(err) => {
            error!(query_id = %pipeline.id(), %err, "query failed");
            Err(err.into())
        }
    }
}
