//! Consumer fabric.
//!
//! A `Consumer` owns a topic, a handler and a backend. `consume` runs the
//! receive loop until the stop signal fires or the subscription ends.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn, Instrument};

use super::{
    BusError, ConsumerBackend, Delivery, InboundMessage, MessageHandler, Result, Subscription,
};
use crate::utils::retry::receive_backoff;

/// Adapts a typed async closure into a [`MessageHandler`].
///
/// Payloads are decoded as JSON before the closure runs; decode failures are
/// returned as [`BusError::Decode`], which the consumer treats as permanent.
pub struct JsonHandler<T, F> {
    f: F,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F> JsonHandler<T, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _payload: PhantomData,
        }
    }
}

impl<T, F, Fut> MessageHandler for JsonHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, message: Arc<InboundMessage>) -> BoxFuture<'static, Result<()>> {
        match message.decode::<T>() {
            Ok(payload) => (self.f)(payload).boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

/// Receive loop for one topic.
pub struct Consumer {
    topic: String,
    backend: Arc<dyn ConsumerBackend>,
    handler: Arc<dyn MessageHandler>,
    backoff: ExponentialBuilder,
}

impl Consumer {
    fn new(
        topic: &str,
        backend: Arc<dyn ConsumerBackend>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            backend,
            handler,
            backoff: receive_backoff(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run the receive loop until `stop` turns true.
    ///
    /// Each message is handed to the handler. Success acks the message.
    /// Failure forwards the error on `errors` (dropped if the sink is full),
    /// then nacks the message so the backend may redeliver, unless the error
    /// is permanent, in which case the message is acked and dropped. In-flight
    /// handler calls finish before the subscription is released.
    ///
    /// Without a stop signal a local one is created, so the loop still
    /// exits cleanly if the subscription ends. A stop sender that is
    /// dropped counts as a stop.
    pub async fn consume(
        &self,
        stop: Option<watch::Receiver<bool>>,
        errors: Option<mpsc::Sender<BusError>>,
    ) -> Result<()> {
        let (_local_stop, mut stop) = match stop {
            Some(rx) => (None, rx),
            None => {
                let (tx, rx) = watch::channel(false);
                (Some(tx), rx)
            }
        };

        let span = tracing::info_span!("consumer", topic = %self.topic, backend = self.backend.name());
        let mut subscription = self.backend.subscribe(&self.topic).instrument(span.clone()).await?;
        info!(parent: &span, "Consumer started");

        self.receive_loop(subscription.as_mut(), &mut stop, errors.as_ref())
            .instrument(span.clone())
            .await;

        let released = subscription.release().instrument(span.clone()).await;
        if let Err(e) = &released {
            warn!(parent: &span, error = %e, "Failed to release subscription");
        }
        info!(parent: &span, "Consumer stopped");
        released
    }

    async fn receive_loop(
        &self,
        subscription: &mut dyn Subscription,
        stop: &mut watch::Receiver<bool>,
        errors: Option<&mpsc::Sender<BusError>>,
    ) {
        let mut backoff_iter = self.backoff.build();

        loop {
            if *stop.borrow() {
                return;
            }

            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() {
                        debug!("Stop signal dropped");
                        return;
                    }
                }
                next = subscription.next() => match next {
                    Ok(Some(delivery)) => {
                        backoff_iter = self.backoff.build();
                        self.dispatch(delivery, errors).await;
                    }
                    Ok(None) => {
                        debug!("Subscription ended");
                        return;
                    }
                    Err(e) => {
                        let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
                        error!(
                            error = %e,
                            backoff_ms = %delay.as_millis(),
                            "Receive failed, retrying after backoff"
                        );
                        report(errors, e);

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            changed = stop.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, delivery: Box<dyn Delivery>, errors: Option<&mpsc::Sender<BusError>>) {
        let message = delivery.message();
        match self.handler.handle(Arc::clone(&message)).await {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    error!(error = %e, "Failed to ack message");
                    report(errors, e);
                }
            }
            Err(e) if e.is_permanent() => {
                warn!(message_id = ?message.id, error = %e, "Dropping message that cannot be handled");
                report(errors, e);
                if let Err(e) = delivery.ack().await {
                    error!(error = %e, "Failed to ack dropped message");
                }
            }
            Err(e) => {
                warn!(message_id = ?message.id, error = %e, "Handler failed");
                report(errors, e);
                if let Err(e) = delivery.nack().await {
                    error!(error = %e, "Failed to nack message");
                }
            }
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer").field("topic", &self.topic).finish()
    }
}

fn report(errors: Option<&mpsc::Sender<BusError>>, err: BusError) {
    if let Some(sink) = errors {
        if sink.try_send(err).is_err() {
            debug!("Error sink full or closed, dropping error");
        }
    }
}

/// Per-process registry of consumers bound to one backend.
///
/// Cached by topic. The first handler provided for a topic is the one the
/// consumer runs; later calls return the existing consumer.
pub struct ConsumerProvider {
    backend: Arc<dyn ConsumerBackend>,
    consumers: RwLock<HashMap<String, Arc<Consumer>>>,
    closed: AtomicBool,
}

impl ConsumerProvider {
    pub fn new(backend: Arc<dyn ConsumerBackend>) -> Self {
        Self {
            backend,
            consumers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the cached consumer for `topic`, creating it on first use.
    pub async fn provide_consumer(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<Consumer>> {
        if topic.is_empty() {
            return Err(BusError::EmptyTopic);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        {
            let consumers = self.consumers.read().await;
            if let Some(consumer) = consumers.get(topic) {
                return Ok(Arc::clone(consumer));
            }
        }

        let mut consumers = self.consumers.write().await;
        if let Some(consumer) = consumers.get(topic) {
            return Ok(Arc::clone(consumer));
        }

        let consumer = Arc::new(Consumer::new(topic, Arc::clone(&self.backend), handler));
        consumers.insert(topic.to_string(), Arc::clone(&consumer));

        info!(topic = %topic, backend = self.backend.name(), "Created consumer");
        Ok(consumer)
    }

    pub async fn len(&self) -> usize {
        self.consumers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close the backend client once. Errors are logged.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.consumers.write().await.clear();
        if let Err(e) = self.backend.close().await {
            error!(backend = self.backend.name(), error = %e, "Failed to close consumer backend");
        }
    }
}
