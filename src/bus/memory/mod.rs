//! In-process broker.
//!
//! Each topic is a work queue: every published message is delivered to one
//! subscriber. Acked and nacked payloads are kept for inspection; nacked
//! messages are parked rather than redelivered.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{
    BusError, ConsumerBackend, Delivery, InboundMessage, OutboundMessage, PublisherBackend,
    Result, Subscription, TopicSink,
};
use crate::codec;

#[derive(Default)]
struct TopicQueue {
    pending: Mutex<VecDeque<InboundMessage>>,
    acked: Mutex<Vec<InboundMessage>>,
    nacked: Mutex<Vec<InboundMessage>>,
    published: AtomicUsize,
    notify: Notify,
}

#[derive(Default)]
struct BrokerState {
    topics: RwLock<HashMap<String, Arc<TopicQueue>>>,
    sinks_created: AtomicUsize,
    fail_on_publish: AtomicBool,
    publishing_closed: AtomicBool,
    consuming_closed: AtomicBool,
    consumer_close_signal: Notify,
}

/// In-memory broker usable as both publisher and consumer backend.
///
/// Clones share state, so one broker can back a `PublisherProvider` and a
/// `ConsumerProvider` in the same process.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue(&self, topic: &str) -> Arc<TopicQueue> {
        {
            let topics = self.state.topics.read().await;
            if let Some(queue) = topics.get(topic) {
                return Arc::clone(queue);
            }
        }
        let mut topics = self.state.topics.write().await;
        Arc::clone(topics.entry(topic.to_string()).or_default())
    }

    /// Make subsequent publishes fail with a connection error.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.fail_on_publish.store(fail, Ordering::Release);
    }

    /// How many topic handles have been constructed.
    pub fn sinks_created(&self) -> usize {
        self.state.sinks_created.load(Ordering::Acquire)
    }

    /// Total messages ever published to `topic`.
    pub async fn published_count(&self, topic: &str) -> usize {
        self.queue(topic).await.published.load(Ordering::Acquire)
    }

    /// Messages waiting for a subscriber.
    pub async fn pending_count(&self, topic: &str) -> usize {
        self.queue(topic).await.pending.lock().await.len()
    }

    /// Drain and decode the messages waiting on `topic`.
    pub async fn take_pending<T: DeserializeOwned>(&self, topic: &str) -> Result<Vec<T>> {
        let queue = self.queue(topic).await;
        let drained: Vec<InboundMessage> = queue.pending.lock().await.drain(..).collect();
        drained.iter().map(InboundMessage::decode).collect()
    }

    pub async fn acked(&self, topic: &str) -> Vec<InboundMessage> {
        self.queue(topic).await.acked.lock().await.clone()
    }

    /// Decode every acked payload on `topic`, skipping ones that do not parse.
    pub async fn acked_as<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.acked(topic)
            .await
            .iter()
            .filter_map(|m| codec::decode(&m.data).ok())
            .collect()
    }

    pub async fn nacked(&self, topic: &str) -> Vec<InboundMessage> {
        self.queue(topic).await.nacked.lock().await.clone()
    }

    /// Push a raw payload, bypassing the codec. Used to inject malformed data.
    pub async fn inject_raw(&self, topic: &str, data: Vec<u8>) {
        self.enqueue(topic, data, HashMap::new()).await;
    }

    async fn enqueue(&self, topic: &str, data: Vec<u8>, attributes: HashMap<String, String>) {
        let queue = self.queue(topic).await;
        let message = InboundMessage {
            topic: topic.to_string(),
            id: Some(Uuid::new_v4().to_string()),
            data,
            attributes,
        };
        queue.pending.lock().await.push_back(message);
        queue.published.fetch_add(1, Ordering::AcqRel);
        queue.notify.notify_one();
    }
}

struct MemorySink {
    broker: MemoryBroker,
    topic: String,
}

#[async_trait]
impl TopicSink for MemorySink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let state = &self.broker.state;
        if state.publishing_closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if state.fail_on_publish.load(Ordering::Acquire) {
            return Err(BusError::Connection("Memory broker publish failure".to_string()));
        }
        let attributes = message.attributes_with_content_type();
        self.broker.enqueue(&self.topic, message.data, attributes).await;
        Ok(())
    }
}

#[async_trait]
impl PublisherBackend for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn topic_sink(&self, topic: &str) -> Result<Arc<dyn TopicSink>> {
        self.state.sinks_created.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemorySink {
            broker: self.clone(),
            topic: topic.to_string(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.state.publishing_closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct MemoryDelivery {
    queue: Arc<TopicQueue>,
    message: Arc<InboundMessage>,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn message(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.queue.acked.lock().await.push((*self.message).clone());
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.queue.nacked.lock().await.push((*self.message).clone());
        Ok(())
    }
}

struct MemorySubscription {
    broker: MemoryBroker,
    topic: String,
    queue: Arc<TopicQueue>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Box<dyn Delivery>>> {
        loop {
            let arrived = self.queue.notify.notified();
            let closed = self.broker.state.consumer_close_signal.notified();
            tokio::pin!(arrived, closed);
            closed.as_mut().enable();

            if let Some(message) = self.queue.pending.lock().await.pop_front() {
                return Ok(Some(Box::new(MemoryDelivery {
                    queue: Arc::clone(&self.queue),
                    message: Arc::new(message),
                })));
            }
            if self.broker.state.consuming_closed.load(Ordering::Acquire) {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut arrived => {}
                _ = &mut closed => {}
            }
        }
    }

    async fn release(self: Box<Self>) -> Result<()> {
        debug!(topic = %self.topic, "Released memory subscription");
        Ok(())
    }
}

#[async_trait]
impl ConsumerBackend for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        if self.state.consuming_closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            topic: topic.to_string(),
            queue: self.queue(topic).await,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.state.consuming_closed.store(true, Ordering::Release);
        self.state.consumer_close_signal.notify_waiters();
        Ok(())
    }
}
