//! AWS SQS backend.
//!
//! A topic is either a queue URL or a queue name. Names are resolved with
//! an idempotent `CreateQueue`. Bodies are the JSON text itself; the
//! content type rides along as a message attribute.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::{Message, MessageAttributeValue, QueueAttributeName};
use aws_sdk_sqs::Client as SqsClient;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    BusError, ConsumerBackend, Delivery, InboundMessage, OutboundMessage, PublisherBackend,
    Result, SqsBusConfig, Subscription, TopicSink,
};

/// SQS client shared by every topic of a fabric.
pub struct SqsBackend {
    sqs: SqsClient,
    config: SqsBusConfig,
    /// Queue name to URL.
    queue_urls: RwLock<HashMap<String, String>>,
}

impl SqsBackend {
    /// Load AWS configuration and build the client.
    pub async fn connect(config: &SqsBusConfig) -> Result<Self> {
        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_builder =
                aws_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let Some(ref endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        info!(
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            "Connected to AWS SQS"
        );

        Ok(Self {
            sqs: SqsClient::new(&aws_config),
            config: config.clone(),
            queue_urls: RwLock::new(HashMap::new()),
        })
    }

    async fn queue_url(&self, topic: &str) -> Result<String> {
        if is_queue_url(topic) {
            return Ok(topic.to_string());
        }

        {
            let urls = self.queue_urls.read().await;
            if let Some(url) = urls.get(topic) {
                return Ok(url.clone());
            }
        }

        let result = self
            .sqs
            .create_queue()
            .queue_name(topic)
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                self.config.visibility_timeout_secs.to_string(),
            )
            .send()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create SQS queue: {}", e)))?;

        let url = result
            .queue_url()
            .ok_or_else(|| BusError::Connection("SQS create_queue returned no URL".to_string()))?
            .to_string();

        self.queue_urls
            .write()
            .await
            .insert(topic.to_string(), url.clone());

        info!(queue = %topic, url = %url, "Created/found SQS queue");
        Ok(url)
    }
}

fn is_queue_url(topic: &str) -> bool {
    topic.starts_with("https://") || topic.starts_with("http://")
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| BusError::Publish(format!("Failed to build attribute: {}", e)))
}

#[async_trait]
impl PublisherBackend for SqsBackend {
    fn name(&self) -> &'static str {
        "sqs"
    }

    async fn topic_sink(&self, topic: &str) -> Result<Arc<dyn TopicSink>> {
        let queue_url = self.queue_url(topic).await?;
        Ok(Arc::new(SqsSink {
            sqs: self.sqs.clone(),
            queue_url,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct SqsSink {
    sqs: SqsClient,
    queue_url: String,
}

#[async_trait]
impl TopicSink for SqsSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let attrs = message
            .attributes_with_content_type()
            .iter()
            .map(|(name, value)| Ok((name.clone(), string_attribute(value)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let body = String::from_utf8(message.data)
            .map_err(|e| BusError::Publish(format!("SQS bodies must be UTF-8: {}", e)))?;

        let output = self
            .sqs
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_attributes(Some(attrs))
            .send()
            .await
            .map_err(|e| BusError::Publish(format!("Failed to send to SQS: {}", e)))?;

        debug!(
            queue_url = %self.queue_url,
            message_id = ?output.message_id(),
            "Sent message to SQS"
        );
        Ok(())
    }
}

#[async_trait]
impl ConsumerBackend for SqsBackend {
    fn name(&self) -> &'static str {
        "sqs"
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let queue_url = self
            .queue_url(topic)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(queue_url = %queue_url, "Starting SQS consumer");

        Ok(Box::new(SqsSubscription {
            sqs: self.sqs.clone(),
            topic: topic.to_string(),
            queue_url,
            wait_time_secs: self.config.wait_time_secs.clamp(0, 20),
            max_messages: self.config.max_messages.clamp(1, 10),
            visibility_timeout_secs: self.config.visibility_timeout_secs,
            buffered: VecDeque::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct SqsSubscription {
    sqs: SqsClient,
    topic: String,
    queue_url: String,
    wait_time_secs: i32,
    max_messages: i32,
    visibility_timeout_secs: i32,
    buffered: VecDeque<Message>,
}

impl SqsSubscription {
    fn delivery(&self, message: Message) -> Option<SqsDelivery> {
        let Some(receipt_handle) = message.receipt_handle().map(str::to_string) else {
            warn!(queue_url = %self.queue_url, "SQS message without receipt handle");
            return None;
        };

        let attributes = message
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .string_value()
                            .map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let inbound = InboundMessage {
            topic: self.topic.clone(),
            id: message.message_id().map(str::to_string),
            data: message.body().unwrap_or_default().as_bytes().to_vec(),
            attributes,
        };

        Some(SqsDelivery {
            sqs: self.sqs.clone(),
            queue_url: self.queue_url.clone(),
            receipt_handle,
            message: Arc::new(inbound),
        })
    }
}

#[async_trait]
impl Subscription for SqsSubscription {
    async fn next(&mut self) -> Result<Option<Box<dyn Delivery>>> {
        loop {
            while let Some(message) = self.buffered.pop_front() {
                if let Some(delivery) = self.delivery(message) {
                    return Ok(Some(Box::new(delivery)));
                }
            }

            // Dropping this future leaves received messages invisible until
            // the visibility timeout lapses.
            let output = self
                .sqs
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(self.max_messages)
                .wait_time_seconds(self.wait_time_secs)
                .visibility_timeout(self.visibility_timeout_secs)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|e| BusError::Receive(format!("Failed to receive from SQS: {}", e)))?;

            self.buffered.extend(output.messages().iter().cloned());
        }
    }

    async fn release(self: Box<Self>) -> Result<()> {
        for message in &self.buffered {
            if let Some(receipt) = message.receipt_handle() {
                let _ = self
                    .sqs
                    .change_message_visibility()
                    .queue_url(&self.queue_url)
                    .receipt_handle(receipt)
                    .visibility_timeout(0)
                    .send()
                    .await;
            }
        }
        debug!(queue_url = %self.queue_url, "Released SQS subscription");
        Ok(())
    }
}

struct SqsDelivery {
    sqs: SqsClient,
    queue_url: String,
    receipt_handle: String,
    message: Arc<InboundMessage>,
}

#[async_trait]
impl Delivery for SqsDelivery {
    fn message(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.sqs
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&self.receipt_handle)
            .send()
            .await
            .map_err(|e| BusError::Acknowledge(format!("Failed to delete SQS message: {}", e)))?;
        Ok(())
    }

    /// Make the message visible again right away.
    async fn nack(self: Box<Self>) -> Result<()> {
        self.sqs
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&self.receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| BusError::Acknowledge(format!("Failed to release SQS message: {}", e)))?;
        Ok(())
    }
}
