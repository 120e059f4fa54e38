//! sous-search-indexer: search index request consumer
//!
//! Consumes index requests from the indexing topic and reconciles the
//! search index with the system of record until Ctrl-C.
//!
//! ## Configuration
//! - SOUS_CONFIG: Path to a YAML config file (optional)
//! - SEARCH_INDEXING_TOPIC_NAME: Overrides `queues.search_indexing_topic_name`
//! - CEASE_OPERATION: `true` exits immediately without work

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use sous::bus::{init_consumer_provider, BusError};
use sous::config::Config;
use sous::indexing::Indexer;
use sous::search::IndexProvider;
use sous::storage::PostgresDataManager;
use sous::utils::bootstrap::{init_tracing, shutdown_signal};
use sous::utils::env::{cease_operation, search_indexing_topic};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    if cease_operation() {
        info!("CEASE_OPERATION is set to true, exiting");
        return Ok(());
    }

    let config = Config::load(None)?;

    // One attempt, bounded by `database.connect_timeout_secs`.
    let data_manager = PostgresDataManager::connect(&config.database)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to connect to PostgreSQL"))?;
    let indexes = IndexProvider::from_config(&config.search)?;
    info!(search = indexes.backend_name(), "Search backend ready");

    let indexer = Arc::new(Indexer::new(
        Arc::new(data_manager),
        indexes,
        config.indexer.max_attempts,
    ));

    let consumers = init_consumer_provider(&config.messaging).await?;
    let topic = search_indexing_topic(&config.queues.search_indexing_topic_name);
    let consumer = consumers
        .provide_consumer(&topic, indexer.handler())
        .await?;

    let (errors_tx, mut errors_rx) = mpsc::channel::<BusError>(config.indexer.error_buffer.max(1));
    let error_logger = tokio::spawn(async move {
        while let Some(e) = errors_rx.recv().await {
            warn!(error = %e, "Index request failed");
        }
    });

    info!(topic = %topic, "sous-search-indexer started");

    let result = consumer.consume(Some(shutdown_signal()), Some(errors_tx)).await;

    consumers.close().await;
    let _ = error_logger.await;

    info!("sous-search-indexer stopped");
    result.map_err(Into::into)
}
