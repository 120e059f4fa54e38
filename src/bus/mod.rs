//! Topic fabric for publishing and consuming JSON messages.
//!
//! This module contains:
//! - `PublisherProvider`: per-topic cached `Publisher`s over one backend
//! - `ConsumerProvider`: per-topic cached `Consumer`s driving a `MessageHandler`
//! - Backend capability traits (`PublisherBackend`, `ConsumerBackend`)
//! - Bus configuration types
//! - Implementations: in-memory, Google Pub/Sub, SQS, Redis

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use crate::codec::{self, CodecError};

pub mod consumer;
pub mod memory;
pub mod publisher;
#[cfg(feature = "pubsub")]
pub mod pubsub;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqs")]
pub mod sqs;

pub use consumer::{Consumer, ConsumerProvider, JsonHandler};
pub use memory::MemoryBroker;
pub use publisher::{Publisher, PublisherProvider};

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Topic name must not be empty")]
    EmptyTopic,

    #[error("Invalid messaging provider: '{0}'")]
    InvalidProvider(String),

    #[error("Messaging provider '{provider}' requires the '{feature}' feature")]
    FeatureDisabled {
        provider: &'static str,
        feature: &'static str,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed: {0}")]
    Acknowledge(String),

    #[error("Encode failed: {0}")]
    Encode(#[source] CodecError),

    #[error("Decode failed: {0}")]
    Decode(#[source] CodecError),

    #[error("Handler failed: {0}")]
    Handler(String),

    /// The message can never be processed. Redelivery would fail the same way.
    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Bus is closed")]
    Closed,
}

impl BusError {
    /// Failures tied to the message itself rather than to the moment it was
    /// handled. The consumer drops these instead of asking for redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Rejected(_))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A message on its way to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub attributes: HashMap<String, String>,
}

impl OutboundMessage {
    /// Wrap an already-encoded JSON document.
    pub fn json(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: codec::CONTENT_TYPE,
            attributes: HashMap::new(),
        }
    }

    /// Attributes for backends that carry metadata, including the content type.
    pub fn attributes_with_content_type(&self) -> HashMap<String, String> {
        let mut attrs = self.attributes.clone();
        attrs.insert(
            codec::CONTENT_TYPE_ATTR.to_string(),
            self.content_type.to_string(),
        );
        attrs
    }
}

/// A message received from a backend subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub id: Option<String>,
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            id: None,
            data,
            attributes: HashMap::new(),
        }
    }

    /// Decode the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode(&self.data).map_err(BusError::Decode)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Backend handle for a single topic.
#[async_trait]
pub trait TopicSink: Send + Sync {
    /// Send one message and wait for the backend to accept it.
    async fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Flush buffered sends. No-op for backends that do not buffer.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Publishing capability of a backend client.
#[async_trait]
pub trait PublisherBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Build the backend handle for `topic`.
    async fn topic_sink(&self, topic: &str) -> Result<Arc<dyn TopicSink>>;

    /// Release the backend client.
    async fn close(&self) -> Result<()>;
}

/// A received message awaiting acknowledgement.
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> Arc<InboundMessage>;

    /// Settle the message as processed.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Settle the message as failed so the backend may redeliver.
    async fn nack(self: Box<Self>) -> Result<()>;
}

/// An active subscription to a topic.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `Ok(None)` means the subscription ended.
    ///
    /// Must be cancel-safe: the consume loop races it against the stop signal.
    async fn next(&mut self) -> Result<Option<Box<dyn Delivery>>>;

    /// Tear down the subscription.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Consuming capability of a backend client.
#[async_trait]
pub trait ConsumerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;

    async fn close(&self) -> Result<()>;
}

/// Handler for processing messages from the bus.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: Arc<InboundMessage>) -> BoxFuture<'static, Result<()>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging backend discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingProvider {
    /// In-process broker.
    Memory,
    /// Google Cloud Pub/Sub.
    PubSub,
    /// AWS SQS. Topics are queue URLs.
    Sqs,
    /// Redis pub/sub as the in-cluster broker.
    Redis,
}

impl MessagingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::PubSub => "pubsub",
            Self::Sqs => "sqs",
            Self::Redis => "redis",
        }
    }
}

impl FromStr for MessagingProvider {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "pubsub" => Ok(Self::PubSub),
            "sqs" => Ok(Self::Sqs),
            "redis" => Ok(Self::Redis),
            _ => Err(BusError::InvalidProvider(s.to_string())),
        }
    }
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Provider name, see [`MessagingProvider`].
    pub provider: String,
    pub pubsub: PubSubBusConfig,
    pub sqs: SqsBusConfig,
    pub redis: RedisBusConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            pubsub: PubSubBusConfig::default(),
            sqs: SqsBusConfig::default(),
            redis: RedisBusConfig::default(),
        }
    }
}

/// Google Pub/Sub configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PubSubBusConfig {
    /// GCP project ID.
    pub project_id: String,
    /// Appended to the topic name to form the subscription name.
    pub subscription_suffix: String,
    /// Max messages per pull.
    pub max_messages: i32,
}

impl Default for PubSubBusConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            subscription_suffix: "sub".to_string(),
            max_messages: 10,
        }
    }
}

/// AWS SQS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqsBusConfig {
    /// AWS region. Uses the default provider chain if not set.
    pub region: Option<String>,
    /// Custom endpoint URL (LocalStack).
    pub endpoint_url: Option<String>,
    /// Long-poll wait in seconds.
    pub wait_time_secs: i32,
    /// Max messages per receive.
    pub max_messages: i32,
    /// Visibility timeout applied to received messages.
    pub visibility_timeout_secs: i32,
}

impl Default for SqsBusConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            wait_time_secs: 20,
            max_messages: 10,
            visibility_timeout_secs: 30,
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisBusConfig {
    pub url: String,
}

impl Default for RedisBusConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the publisher fabric for the configured provider.
///
/// Requires the corresponding feature for cloud backends:
/// - Pub/Sub: `--features pubsub`
/// - SQS: `--features sqs`
/// - Redis: `--features redis`
pub async fn init_publisher_provider(config: &MessagingConfig) -> Result<PublisherProvider> {
    let provider: MessagingProvider = config.provider.parse()?;

    let backend: Arc<dyn PublisherBackend> = match provider {
        MessagingProvider::Memory => Arc::new(MemoryBroker::new()),
        MessagingProvider::PubSub => {
            #[cfg(feature = "pubsub")]
            {
                Arc::new(pubsub::PubSubBackend::connect(&config.pubsub).await?)
            }
            #[cfg(not(feature = "pubsub"))]
            {
                return Err(feature_disabled(provider));
            }
        }
        MessagingProvider::Sqs => {
            #[cfg(feature = "sqs")]
            {
                Arc::new(sqs::SqsBackend::connect(&config.sqs).await?)
            }
            #[cfg(not(feature = "sqs"))]
            {
                return Err(feature_disabled(provider));
            }
        }
        MessagingProvider::Redis => {
            #[cfg(feature = "redis")]
            {
                Arc::new(redis::RedisBackend::connect(&config.redis).await?)
            }
            #[cfg(not(feature = "redis"))]
            {
                return Err(feature_disabled(provider));
            }
        }
    };

    info!(provider = provider.as_str(), "Publisher fabric initialized");
    Ok(PublisherProvider::new(backend))
}

/// Initialize the consumer fabric for the configured provider.
pub async fn init_consumer_provider(config: &MessagingConfig) -> Result<ConsumerProvider> {
    let provider: MessagingProvider = config.provider.parse()?;

    let backend: Arc<dyn ConsumerBackend> = match provider {
        MessagingProvider::Memory => Arc::new(MemoryBroker::new()),
        MessagingProvider::PubSub => {
            #[cfg(feature = "pubsub")]
            {
                Arc::new(pubsub::PubSubBackend::connect(&config.pubsub).await?)
            }
            #[cfg(not(feature = "pubsub"))]
            {
                return Err(feature_disabled(provider));
            }
        }
        MessagingProvider::Sqs => {
            #[cfg(feature = "sqs")]
            {
                Arc::new(sqs::SqsBackend::connect(&config.sqs).await?)
            }
            #[cfg(not(feature = "sqs"))]
            {
                return Err(feature_disabled(provider));
            }
        }
        MessagingProvider::Redis => {
            #[cfg(feature = "redis")]
            {
                Arc::new(redis::RedisBackend::connect(&config.redis).await?)
            }
            #[cfg(not(feature = "redis"))]
            {
                return Err(feature_disabled(provider));
            }
        }
    };

    info!(provider = provider.as_str(), "Consumer fabric initialized");
    Ok(ConsumerProvider::new(backend))
}

#[allow(dead_code)]
fn feature_disabled(provider: MessagingProvider) -> BusError {
    let feature = match provider {
        MessagingProvider::Memory => "default",
        MessagingProvider::PubSub => "pubsub",
        MessagingProvider::Sqs => "sqs",
        MessagingProvider::Redis => "redis",
    };
    BusError::FeatureDisabled {
        provider: provider.as_str(),
        feature,
    }
}

#[cfg(test)]
mod tests;
