//! sous-search-scheduler: one-shot search reindex scheduler
//!
//! Picks one enabled index type at random, lists the rows whose search
//! representation is stale, and publishes an index request for each.
//!
//! ## Configuration
//! - SOUS_CONFIG: Path to a YAML config file (optional)
//! - SEARCH_INDEXING_TOPIC_NAME: Overrides `queues.search_indexing_topic_name`
//! - CEASE_OPERATION: `true` exits immediately without work

use std::sync::Arc;

use tracing::{error, info};

use sous::bus::init_publisher_provider;
use sous::config::Config;
use sous::indexing::Scheduler;
use sous::storage::PostgresDataManager;
use sous::utils::bootstrap::init_tracing;
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

    let publishers = init_publisher_provider(&config.messaging).await?;
    let topic = search_indexing_topic(&config.queues.search_indexing_topic_name);
    let publisher = publishers.provide_publisher(&topic).await?;

    let scheduler = Scheduler::new(
        Arc::new(data_manager),
        publisher,
        config.scheduler.enabled_index_types.clone(),
    );

    let outcome = scheduler.run_once().await;
    publishers.close().await;

    match outcome {
        Ok(report) => {
            info!(topic = %topic, "Scheduled {}", report);
            Ok(())
        }
        Err(e) => {
            error!(topic = %topic, error = %e, "Scheduler run failed");
            Err(e.into())
        }
    }
}
