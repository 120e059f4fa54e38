//! Publisher fabric.
//!
//! `PublisherProvider` maps topic names to cached `Publisher`s bound to a
//! single backend client. Publishers are created on first request and live
//! until the provider is closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use super::{BusError, OutboundMessage, PublisherBackend, Result, TopicSink};
use crate::codec;

/// Publishes JSON payloads to one topic.
pub struct Publisher {
    topic: String,
    sink: Arc<dyn TopicSink>,
    span: Span,
    stopped: AtomicBool,
}

impl Publisher {
    fn new(topic: &str, sink: Arc<dyn TopicSink>) -> Self {
        Self {
            topic: topic.to_string(),
            sink,
            span: info_span!("publisher", topic = %topic, error = field::Empty),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode `payload` and wait for the backend to accept it.
    ///
    /// Encode failures suppress the send. Errors are logged and recorded on
    /// the publisher span before being returned.
    pub async fn publish<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let data = match codec::encode(payload) {
            Ok(data) => data,
            Err(e) => {
                let err = BusError::Encode(e);
                self.record_failure(&err);
                return Err(err);
            }
        };
        self.publish_message(OutboundMessage::json(data)).await
    }

    /// Send a pre-encoded message.
    pub async fn publish_message(&self, message: OutboundMessage) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let size = message.data.len();
        let result = self.sink.send(message).instrument(self.span.clone()).await;

        match &result {
            Ok(()) => {
                debug!(parent: &self.span, bytes = size, "Published message");
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    /// Fire-and-forget publish for write paths that must not fail on event
    /// emission. Errors are logged on the publisher span and dropped.
    ///
    /// The returned handle completes once the send has been attempted.
    pub fn publish_async<T>(self: &Arc<Self>, payload: T) -> JoinHandle<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            // Already logged and recorded by publish.
            let _ = publisher.publish(&payload).await;
        })
    }

    /// Flush pending sends. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sink.flush().instrument(self.span.clone()).await
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn record_failure(&self, err: &BusError) {
        self.span.record("error", field::display(err));
        error!(parent: &self.span, error = %err, "Publish failed");
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Per-process registry of publishers bound to one backend.
pub struct PublisherProvider {
    backend: Arc<dyn PublisherBackend>,
    publishers: RwLock<HashMap<String, Arc<Publisher>>>,
    closed: AtomicBool,
}

impl PublisherProvider {
    pub fn new(backend: Arc<dyn PublisherBackend>) -> Self {
        Self {
            backend,
            publishers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the cached publisher for `topic`, creating it on first use.
    pub async fn provide_publisher(&self, topic: &str) -> Result<Arc<Publisher>> {
        if topic.is_empty() {
            return Err(BusError::EmptyTopic);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        // Check cache
        {
            let publishers = self.publishers.read().await;
            if let Some(publisher) = publishers.get(topic) {
                return Ok(Arc::clone(publisher));
            }
        }

        let mut publishers = self.publishers.write().await;
        // Another task may have inserted while we waited for the write lock.
        if let Some(publisher) = publishers.get(topic) {
            return Ok(Arc::clone(publisher));
        }

        let sink = self.backend.topic_sink(topic).await?;
        let publisher = Arc::new(Publisher::new(topic, sink));
        publishers.insert(topic.to_string(), Arc::clone(&publisher));

        info!(
            topic = %topic,
            backend = self.backend.name(),
            "Created publisher"
        );
        Ok(publisher)
    }

    /// Number of cached publishers.
    pub async fn len(&self) -> usize {
        self.publishers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every cached publisher, then close the backend client once.
    ///
    /// Errors are logged, not returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let publishers: Vec<Arc<Publisher>> = {
            let mut guard = self.publishers.write().await;
            guard.drain().map(|(_, p)| p).collect()
        };

        for publisher in publishers {
            if let Err(e) = publisher.stop().await {
                warn!(topic = %publisher.topic(), error = %e, "Failed to stop publisher");
            }
        }

        if let Err(e) = self.backend.close().await {
            error!(backend = self.backend.name(), error = %e, "Failed to close publisher backend");
        }
    }
}
