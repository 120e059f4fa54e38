//! Redis pub/sub backend.
//!
//! Topics are Redis channels. Delivery is at-most-once: a message published
//! while no subscriber listens is gone, and ack/nack settle nothing. Redis
//! pub/sub carries no metadata, so the content type is dropped.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::{aio::ConnectionManager, AsyncCommands, Client, Msg};
use tracing::{debug, info};

use super::{
    BusError, ConsumerBackend, Delivery, InboundMessage, OutboundMessage, PublisherBackend,
    RedisBusConfig, Result, Subscription, TopicSink,
};

/// Redis client shared by every topic of a fabric.
pub struct RedisBackend {
    client: Client,
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(config: &RedisBusConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| BusError::Connection(format!("Invalid Redis URL: {}", e)))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        info!(url = %config.url, "Connected to Redis");

        Ok(Self { client, conn })
    }
}

#[async_trait]
impl PublisherBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn topic_sink(&self, topic: &str) -> Result<Arc<dyn TopicSink>> {
        Ok(Arc::new(RedisSink {
            channel: topic.to_string(),
            conn: self.conn.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct RedisSink {
    channel: String,
    conn: ConnectionManager,
}

#[async_trait]
impl TopicSink for RedisSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(&self.channel, message.data)
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish to Redis: {}", e)))?;

        debug!(channel = %self.channel, receivers, "Published message to Redis");
        Ok(())
    }
}

type MessageStream = Pin<Box<dyn Stream<Item = Msg> + Send>>;

#[async_trait]
impl ConsumerBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to open Redis pub/sub: {}", e)))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(channel = %topic, "Subscribed to Redis channel");

        Ok(Box::new(RedisSubscription {
            channel: topic.to_string(),
            messages: pubsub.into_on_message().boxed(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct RedisSubscription {
    channel: String,
    messages: MessageStream,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next(&mut self) -> Result<Option<Box<dyn Delivery>>> {
        let Some(msg) = self.messages.next().await else {
            return Ok(None);
        };

        let message = InboundMessage::new(
            msg.get_channel_name().to_string(),
            msg.get_payload_bytes().to_vec(),
        );
        Ok(Some(Box::new(RedisDelivery {
            message: Arc::new(message),
        })))
    }

    /// Dropping the stream closes the pub/sub connection.
    async fn release(self: Box<Self>) -> Result<()> {
        debug!(channel = %self.channel, "Released Redis subscription");
        Ok(())
    }
}

struct RedisDelivery {
    message: Arc<InboundMessage>,
}

#[async_trait]
impl Delivery for RedisDelivery {
    fn message(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
