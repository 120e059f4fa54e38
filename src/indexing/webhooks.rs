//! Webhook fan-out for data changes.
//!
//! Each data change scoped to a household asks the webhook executor to call
//! every live webhook that household registered for the event type.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::{BusError, Publisher};
use crate::storage::{StorageError, WebhookDataManager};
use crate::types::{DataChangeMessage, WebhookExecutionRequest};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Failed to look up webhooks for household {household_id}: {source}")]
    Lookup {
        household_id: String,
        #[source]
        source: StorageError,
    },

    #[error("{failed} of {total} webhook execution requests failed to publish: {source}")]
    Publish {
        failed: usize,
        total: usize,
        #[source]
        source: BusError,
    },
}

/// Publishes [`WebhookExecutionRequest`]s for data changes.
pub struct WebhookFanout {
    data_manager: Arc<dyn WebhookDataManager>,
    publisher: Arc<Publisher>,
}

impl WebhookFanout {
    /// `publisher` targets the webhook execution request topic.
    pub fn new(data_manager: Arc<dyn WebhookDataManager>, publisher: Arc<Publisher>) -> Self {
        Self {
            data_manager,
            publisher,
        }
    }

    /// Publish one execution request per matching webhook and return how
    /// many were published.
    ///
    /// Messages without a household, and account events that never reach
    /// webhooks, publish nothing. A failed publish does not stop the rest.
    pub async fn fan_out(&self, message: &DataChangeMessage) -> Result<usize, WebhookError> {
        if message.household_id.is_empty() || !message.event_type.triggers_webhooks() {
            return Ok(0);
        }

        let webhooks = self
            .data_manager
            .get_webhooks_for_household_and_event(
                &message.household_id,
                message.event_type.as_str(),
            )
            .await
            .map_err(|source| WebhookError::Lookup {
                household_id: message.household_id.clone(),
                source,
            })?;

        let total = webhooks.len();
        let mut failed = 0;
        let mut last_error = None;
        for webhook in webhooks {
            let request = WebhookExecutionRequest {
                webhook_id: webhook.id,
                household_id: message.household_id.clone(),
                payload: message.clone(),
            };
            if let Err(e) = self.publisher.publish(&request).await {
                warn!(webhook_id = %request.webhook_id, error = %e, "Failed to request webhook execution");
                failed += 1;
                last_error = Some(e);
            }
        }

        debug!(
            household_id = %message.household_id,
            event_type = %message.event_type,
            total,
            failed,
            "Fanned data change out to webhooks"
        );

        match last_error {
            Some(source) => Err(WebhookError::Publish {
                failed,
                total,
                source,
            }),
            None => Ok(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBroker, PublisherProvider};
    use crate::test_utils::MockDataManager;
    use crate::types::{Meal, ServiceEventType, Webhook};

    const TOPIC: &str = "webhook_execution_requests";

    fn webhook(id: &str) -> Webhook {
        Webhook {
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            method: "POST".to_string(),
            belongs_to_household: "h1".to_string(),
            ..Default::default()
        }
    }

    async fn fanout(broker: &MemoryBroker, data: MockDataManager) -> WebhookFanout {
        let publishers = PublisherProvider::new(Arc::new(broker.clone()));
        WebhookFanout::new(
            Arc::new(data),
            publishers.provide_publisher(TOPIC).await.unwrap(),
        )
    }

    fn meal_created() -> DataChangeMessage {
        let mut message = DataChangeMessage::new(ServiceEventType::MealCreated, "u1")
            .with_household("h1")
            .with_meal(Meal {
                id: "m1".to_string(),
                ..Default::default()
            });
        message.context.insert("source".to_string(), serde_json::json!("api"));
        message
    }

    #[tokio::test]
    async fn test_one_request_per_matching_webhook() {
        let broker = MemoryBroker::new();
        let data = MockDataManager::new()
            .with_webhook("h1", "meal_created", webhook("w1"))
            .with_webhook("h1", "meal_created", webhook("w2"))
            .with_webhook("h1", "recipe_created", webhook("w3"))
            .with_webhook("h2", "meal_created", webhook("w4"));
        let fanout = fanout(&broker, data).await;

        assert_eq!(fanout.fan_out(&meal_created()).await.unwrap(), 2);

        let requests: Vec<WebhookExecutionRequest> = broker.take_pending(TOPIC).await.unwrap();
        let ids: Vec<&str> = requests.iter().map(|r| r.webhook_id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2"]);
        assert!(requests.iter().all(|r| r.household_id == "h1"));
        assert_eq!(requests[0].payload, meal_created());
    }

    #[tokio::test]
    async fn test_account_events_and_householdless_changes_are_skipped() {
        let broker = MemoryBroker::new();
        let data = MockDataManager::new()
            .with_webhook("h1", "user_signed_up", webhook("w1"))
            .with_webhook("h1", "meal_created", webhook("w2"));
        data.fail_fetches();
        let fanout = fanout(&broker, data).await;

        let signed_up =
            DataChangeMessage::new(ServiceEventType::UserSignedUp, "u1").with_household("h1");
        assert_eq!(fanout.fan_out(&signed_up).await.unwrap(), 0);

        let mut no_household = meal_created();
        no_household.household_id.clear();
        assert_eq!(fanout.fan_out(&no_household).await.unwrap(), 0);

        assert_eq!(broker.published_count(TOPIC).await, 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported() {
        let broker = MemoryBroker::new();
        let data = MockDataManager::new();
        data.fail_fetches();
        let fanout = fanout(&broker, data).await;

        assert!(matches!(
            fanout.fan_out(&meal_created()).await,
            Err(WebhookError::Lookup { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_failures_are_counted() {
        let broker = MemoryBroker::new();
        let data = MockDataManager::new()
            .with_webhook("h1", "meal_created", webhook("w1"))
            .with_webhook("h1", "meal_created", webhook("w2"));
        let fanout = fanout(&broker, data).await;
        broker.set_fail_on_publish(true);

        match fanout.fan_out(&meal_created()).await {
            Err(WebhookError::Publish { failed, total, .. }) => {
                assert_eq!((failed, total), (2, 2));
            }
            other => panic!("expected publish failure, got {other:?}"),
        }
    }
}
