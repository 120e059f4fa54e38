//! sous-data-changes: data-change router
//!
//! Consumes data-change messages and publishes the index requests they
//! call for onto the indexing topic until Ctrl-C. When a webhook execution
//! topic is configured, each change is also fanned out to the household's
//! webhooks, which needs the database.
//!
//! ## Configuration
//! - SOUS_CONFIG: Path to a YAML config file (optional)
//! - DATA_CHANGES_TOPIC_NAME: Overrides `queues.data_changes_topic_name`
//! - SEARCH_INDEXING_TOPIC_NAME: Overrides `queues.search_indexing_topic_name`
//! - WEBHOOK_EXECUTION_REQUESTS_TOPIC_NAME: Overrides
//!   `queues.webhook_execution_requests_topic_name` (empty disables webhooks)

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use sous::bus::{init_consumer_provider, init_publisher_provider, BusError};
use sous::config::Config;
use sous::indexing::{DataChangeRouter, WebhookFanout};
use sous::storage::PostgresDataManager;
use sous::utils::bootstrap::{init_tracing, shutdown_signal};
use sous::utils::env::{data_changes_topic, search_indexing_topic, webhook_execution_topic};

const ERROR_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;

    let publishers = init_publisher_provider(&config.messaging).await?;
    let indexing_topic = search_indexing_topic(&config.queues.search_indexing_topic_name);
    let mut router = DataChangeRouter::new(publishers.provide_publisher(&indexing_topic).await?);

    let webhook_topic = webhook_execution_topic(&config.queues.webhook_execution_requests_topic_name);
    if webhook_topic.is_empty() {
        info!("No webhook execution topic configured, webhooks disabled");
    } else {
        let data_manager = PostgresDataManager::connect(&config.database)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to connect to PostgreSQL"))?;
        router = router.with_webhooks(WebhookFanout::new(
            Arc::new(data_manager),
            publishers.provide_publisher(&webhook_topic).await?,
        ));
    }
    let router = Arc::new(router);

    let consumers = init_consumer_provider(&config.messaging).await?;
    let changes_topic = data_changes_topic(&config.queues.data_changes_topic_name);
    let consumer = consumers
        .provide_consumer(&changes_topic, router.handler())
        .await?;

    let (errors_tx, mut errors_rx) = mpsc::channel::<BusError>(ERROR_BUFFER);
    let error_logger = tokio::spawn(async move {
        while let Some(e) = errors_rx.recv().await {
            warn!(error = %e, "Data change failed to route");
        }
    });

    info!(
        data_changes = %changes_topic,
        search_indexing = %indexing_topic,
        webhook_executions = %webhook_topic,
        "sous-data-changes started"
    );

    let result = consumer.consume(Some(shutdown_signal()), Some(errors_tx)).await;

    consumers.close().await;
    publishers.close().await;
    let _ = error_logger.await;

    info!("sous-data-changes stopped");
    result.map_err(Into::into)
}
