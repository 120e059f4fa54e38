//! Google Cloud Pub/Sub backend.
//!
//! Topics map one-to-one to Pub/Sub topics and are created on first use.
//! Consumers pull from a subscription named `{topic}-{suffix}`, created when
//! the consumer starts and deleted when it stops.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher as TopicPublisher;
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::{Subscription as PubSubSubscription, SubscriptionConfig};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    BusError, ConsumerBackend, Delivery, InboundMessage, OutboundMessage, PubSubBusConfig,
    PublisherBackend, Result, Subscription, TopicSink,
};

/// Pub/Sub client shared by every topic of a fabric.
pub struct PubSubBackend {
    client: Client,
    config: PubSubBusConfig,
    publishers: Mutex<Vec<TopicPublisher>>,
}

impl PubSubBackend {
    /// Connect using Application Default Credentials.
    ///
    /// Set `PUBSUB_EMULATOR_HOST` to target the emulator.
    pub async fn connect(config: &PubSubBusConfig) -> Result<Self> {
        let mut client_config = ClientConfig::default().with_auth().await.map_err(|e| {
            BusError::Connection(format!("Failed to configure Pub/Sub auth: {}", e))
        })?;
        if !config.project_id.is_empty() {
            client_config.project_id = Some(config.project_id.clone());
        }

        let client = Client::new(client_config)
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create Pub/Sub client: {}", e)))?;

        info!(project_id = %config.project_id, "Connected to Google Pub/Sub");

        Ok(Self {
            client,
            config: config.clone(),
            publishers: Mutex::new(Vec::new()),
        })
    }

    /// Subscription name consumers of `topic` share.
    pub fn subscription_name(&self, topic: &str) -> String {
        subscription_name(topic, &self.config.subscription_suffix)
    }

    async fn ensure_topic(&self, topic_name: &str) -> Result<google_cloud_pubsub::topic::Topic> {
        let topic = self.client.topic(topic_name);
        if !topic
            .exists(None)
            .await
            .map_err(|e| BusError::Connection(format!("Failed to check topic existence: {}", e)))?
        {
            topic.create(None, None).await.map_err(|e| {
                BusError::Connection(format!("Failed to create topic {}: {}", topic_name, e))
            })?;
            info!(topic = %topic_name, "Created Pub/Sub topic");
        }
        Ok(topic)
    }
}

fn subscription_name(topic: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        topic.to_string()
    } else {
        format!("{}-{}", topic, suffix)
    }
}

fn pubsub_message(message: OutboundMessage) -> PubsubMessage {
    PubsubMessage {
        attributes: message.attributes_with_content_type(),
        data: message.data,
        ..Default::default()
    }
}

#[async_trait]
impl PublisherBackend for PubSubBackend {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    async fn topic_sink(&self, topic: &str) -> Result<Arc<dyn TopicSink>> {
        let handle = self.ensure_topic(topic).await?;
        let publisher = handle.new_publisher(None);
        self.publishers.lock().await.push(publisher.clone());
        Ok(Arc::new(PubSubSink {
            topic: topic.to_string(),
            publisher,
        }))
    }

    /// Stop every topic publisher's background workers, flushing what they
    /// still hold. Sinks handed out before this call stop accepting sends.
    async fn close(&self) -> Result<()> {
        let mut publishers = std::mem::take(&mut *self.publishers.lock().await);
        for publisher in publishers.iter_mut() {
            publisher.shutdown().await;
        }
        debug!(publishers = publishers.len(), "Shut down Pub/Sub publishers");
        Ok(())
    }
}

struct PubSubSink {
    topic: String,
    publisher: TopicPublisher,
}

#[async_trait]
impl TopicSink for PubSubSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let awaiter = self.publisher.publish(pubsub_message(message)).await;
        let message_id = awaiter
            .get()
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish to Pub/Sub: {}", e)))?;

        debug!(topic = %self.topic, message_id = %message_id, "Published message to Pub/Sub");
        Ok(())
    }
}

#[async_trait]
impl ConsumerBackend for PubSubBackend {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let handle = self.ensure_topic(topic).await?;
        let subscription_name = self.subscription_name(topic);
        let subscription = self.client.subscription(&subscription_name);

        if !subscription.exists(None).await.map_err(|e| {
            BusError::Subscribe(format!("Failed to check subscription existence: {}", e))
        })? {
            subscription
                .create(
                    handle.fully_qualified_name(),
                    SubscriptionConfig::default(),
                    None,
                )
                .await
                .map_err(|e| {
                    BusError::Subscribe(format!(
                        "Failed to create subscription {}: {}",
                        subscription_name, e
                    ))
                })?;
            info!(subscription = %subscription_name, topic = %topic, "Created Pub/Sub subscription");
        }

        Ok(Box::new(PubSubSubscriptionHandle {
            topic: topic.to_string(),
            subscription,
            max_messages: self.config.max_messages.max(1),
            buffered: VecDeque::new(),
        }))
    }

    /// Subscriptions are torn down by their consumers, and the client keeps
    /// no other open streams, so there is nothing left to release here.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct PubSubSubscriptionHandle {
    topic: String,
    subscription: PubSubSubscription,
    max_messages: i32,
    buffered: VecDeque<ReceivedMessage>,
}

#[async_trait]
impl Subscription for PubSubSubscriptionHandle {
    async fn next(&mut self) -> Result<Option<Box<dyn Delivery>>> {
        loop {
            if let Some(received) = self.buffered.pop_front() {
                return Ok(Some(Box::new(PubSubDelivery::new(&self.topic, received))));
            }

            // Pulled messages stay unacked if this future is dropped, so
            // the server redelivers them after the ack deadline.
            let pulled = self
                .subscription
                .pull(self.max_messages, None)
                .await
                .map_err(|e| BusError::Receive(format!("Failed to pull from Pub/Sub: {}", e)))?;
            self.buffered.extend(pulled);
        }
    }

    async fn release(self: Box<Self>) -> Result<()> {
        let Self {
            topic,
            subscription,
            buffered,
            ..
        } = *self;

        for received in buffered {
            if let Err(e) = received.nack().await {
                warn!(topic = %topic, error = %e, "Failed to nack buffered Pub/Sub message");
            }
        }

        subscription.delete(None).await.map_err(|e| {
            warn!(topic = %topic, subscription = %subscription.id(), error = %e, "Failed to delete Pub/Sub subscription");
            BusError::Subscribe(format!(
                "Failed to delete subscription {}: {}",
                subscription.id(),
                e
            ))
        })?;
        info!(topic = %topic, subscription = %subscription.id(), "Deleted Pub/Sub subscription");
        Ok(())
    }
}

struct PubSubDelivery {
    message: Arc<InboundMessage>,
    received: ReceivedMessage,
}

impl PubSubDelivery {
    fn new(topic: &str, received: ReceivedMessage) -> Self {
        let message = InboundMessage {
            topic: topic.to_string(),
            id: Some(received.message.message_id.clone()),
            data: received.message.data.clone(),
            attributes: received.message.attributes.clone(),
        };
        Self {
            message: Arc::new(message),
            received,
        }
    }
}

#[async_trait]
impl Delivery for PubSubDelivery {
    fn message(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.received
            .ack()
            .await
            .map_err(|e| BusError::Acknowledge(format!("Failed to ack Pub/Sub message: {}", e)))
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.received
            .nack()
            .await
            .map_err(|e| BusError::Acknowledge(format!("Failed to nack Pub/Sub message: {}", e)))
    }
}
