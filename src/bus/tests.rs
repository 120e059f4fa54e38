use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    text: String,
}

fn memory_fabrics() -> (MemoryBroker, PublisherProvider, ConsumerProvider) {
    let broker = MemoryBroker::new();
    let publishers = PublisherProvider::new(Arc::new(broker.clone()));
    let consumers = ConsumerProvider::new(Arc::new(broker.clone()));
    (broker, publishers, consumers)
}

struct CountingHandler {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl MessageHandler for CountingHandler {
    fn handle(&self, _message: Arc<InboundMessage>) -> BoxFuture<'static, Result<()>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(BusError::Handler("boom".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

fn counting(fail: bool) -> (Arc<AtomicUsize>, Arc<dyn MessageHandler>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
        fail,
    });
    (calls, handler)
}

async fn wait_until<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[test]
fn test_messaging_config_default() {
    let config = MessagingConfig::default();
    assert_eq!(config.provider, "memory");
    assert_eq!(config.redis.url, "redis://localhost:6379");
    assert_eq!(config.sqs.wait_time_secs, 20);
    assert_eq!(config.pubsub.subscription_suffix, "sub");
}

#[test]
fn test_provider_parse_normalizes() {
    assert_eq!("  PubSub ".parse::<MessagingProvider>().unwrap(), MessagingProvider::PubSub);
    assert_eq!("SQS".parse::<MessagingProvider>().unwrap(), MessagingProvider::Sqs);
    assert_eq!("redis\n".parse::<MessagingProvider>().unwrap(), MessagingProvider::Redis);
    assert_eq!("memory".parse::<MessagingProvider>().unwrap(), MessagingProvider::Memory);
}

#[test]
fn test_provider_parse_rejects_unknown() {
    match "kafka".parse::<MessagingProvider>() {
        Err(BusError::InvalidProvider(p)) => assert_eq!(p, "kafka"),
        other => panic!("expected InvalidProvider, got {other:?}"),
    }
    assert!(matches!(
        "".parse::<MessagingProvider>(),
        Err(BusError::InvalidProvider(_))
    ));
}

#[tokio::test]
async fn test_init_publisher_provider_invalid_provider() {
    let config = MessagingConfig {
        provider: "carrier-pigeon".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        init_publisher_provider(&config).await,
        Err(BusError::InvalidProvider(_))
    ));
    assert!(matches!(
        init_consumer_provider(&config).await,
        Err(BusError::InvalidProvider(_))
    ));
}

#[tokio::test]
async fn test_init_memory_providers() {
    let config = MessagingConfig::default();
    let publishers = init_publisher_provider(&config).await.unwrap();
    assert_eq!(publishers.backend_name(), "memory");
    let consumers = init_consumer_provider(&config).await.unwrap();
    assert_eq!(consumers.backend_name(), "memory");
}

#[tokio::test]
async fn test_provide_publisher_empty_topic() {
    let (broker, publishers, _) = memory_fabrics();
    assert!(matches!(
        publishers.provide_publisher("").await,
        Err(BusError::EmptyTopic)
    ));
    assert!(publishers.is_empty().await);
    assert_eq!(broker.sinks_created(), 0);
}

#[tokio::test]
async fn test_provide_publisher_caches_by_topic() {
    let (broker, publishers, _) = memory_fabrics();
    let a = publishers.provide_publisher("data_changes").await.unwrap();
    let b = publishers.provide_publisher("data_changes").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(broker.sinks_created(), 1);

    let other = publishers.provide_publisher("search_index_requests").await.unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
    assert_eq!(publishers.len().await, 2);
}

#[tokio::test]
async fn test_concurrent_provide_constructs_once() {
    let (broker, publishers, _) = memory_fabrics();
    let publishers = Arc::new(publishers);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let publishers = Arc::clone(&publishers);
        handles.push(tokio::spawn(async move {
            publishers.provide_publisher("hot").await.unwrap()
        }));
    }

    let mut first: Option<Arc<Publisher>> = None;
    for handle in handles {
        let publisher = handle.await.unwrap();
        match &first {
            Some(f) => assert!(Arc::ptr_eq(f, &publisher)),
            None => first = Some(publisher),
        }
    }
    assert_eq!(broker.sinks_created(), 1);
}

#[tokio::test]
async fn test_publish_encodes_json() {
    let (broker, publishers, _) = memory_fabrics();
    let publisher = publishers.provide_publisher("notes").await.unwrap();
    publisher
        .publish(&Note {
            text: "hello".to_string(),
        })
        .await
        .unwrap();

    let pending: Vec<Note> = broker.take_pending("notes").await.unwrap();
    assert_eq!(
        pending,
        vec![Note {
            text: "hello".to_string()
        }]
    );
}

#[tokio::test]
async fn test_publish_surfaces_backend_error() {
    let (broker, publishers, _) = memory_fabrics();
    broker.set_fail_on_publish(true);
    let publisher = publishers.provide_publisher("notes").await.unwrap();

    let result = publisher.publish(&Note { text: "x".into() }).await;
    assert!(matches!(result, Err(BusError::Connection(_))));
}

#[tokio::test]
async fn test_publish_async_swallows_errors() {
    let (broker, publishers, _) = memory_fabrics();
    broker.set_fail_on_publish(true);
    let publisher = publishers.provide_publisher("notes").await.unwrap();

    publisher
        .publish_async(Note { text: "x".into() })
        .await
        .unwrap();
    assert_eq!(broker.published_count("notes").await, 0);
}

#[tokio::test]
async fn test_publish_async_delivers() {
    let (broker, publishers, _) = memory_fabrics();
    let publisher = publishers.provide_publisher("notes").await.unwrap();

    publisher
        .publish_async(Note { text: "later".into() })
        .await
        .unwrap();
    assert_eq!(broker.published_count("notes").await, 1);
}

#[tokio::test]
async fn test_publisher_stop_is_idempotent() {
    let (_, publishers, _) = memory_fabrics();
    let publisher = publishers.provide_publisher("notes").await.unwrap();

    publisher.stop().await.unwrap();
    publisher.stop().await.unwrap();
    assert!(publisher.is_stopped());
    assert!(matches!(
        publisher.publish(&Note { text: "x".into() }).await,
        Err(BusError::Closed)
    ));
}

#[tokio::test]
async fn test_provider_close_stops_publishers() {
    let (_, publishers, _) = memory_fabrics();
    let publisher = publishers.provide_publisher("notes").await.unwrap();

    publishers.close().await;
    publishers.close().await;

    assert!(publisher.is_stopped());
    assert!(matches!(
        publishers.provide_publisher("notes").await,
        Err(BusError::Closed)
    ));
}

#[tokio::test]
async fn test_provide_consumer_empty_topic() {
    let (_, _, consumers) = memory_fabrics();
    let (_, handler) = counting(false);
    assert!(matches!(
        consumers.provide_consumer("", handler).await,
        Err(BusError::EmptyTopic)
    ));
    assert!(consumers.is_empty().await);
}

#[tokio::test]
async fn test_provide_consumer_caches_by_topic() {
    let (_, _, consumers) = memory_fabrics();
    let (_, handler) = counting(false);
    let a = consumers
        .provide_consumer("t", Arc::clone(&handler))
        .await
        .unwrap();
    let b = consumers.provide_consumer("t", handler).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(consumers.len().await, 1);
}

#[tokio::test]
async fn test_consume_acks_on_success() {
    let (broker, publishers, consumers) = memory_fabrics();
    let publisher = publishers.provide_publisher("t").await.unwrap();
    publisher.publish(&Note { text: "a".into() }).await.unwrap();
    publisher.publish(&Note { text: "b".into() }).await.unwrap();

    let (calls, handler) = counting(false);
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), None).await });

    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
    let acked = broker.clone();
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    let notes: Vec<Note> = acked.acked_as("t").await;
    assert_eq!(notes.len(), 2);
    assert!(broker.nacked("t").await.is_empty());
}

#[tokio::test]
async fn test_consume_reports_handler_errors_without_ack() {
    let (broker, publishers, consumers) = memory_fabrics();
    let publisher = publishers.provide_publisher("t").await.unwrap();
    publisher.publish(&Note { text: "a".into() }).await.unwrap();

    let (calls, handler) = counting(true);
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (err_tx, mut err_rx) = mpsc::channel(4);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), Some(err_tx)).await });

    let err = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, BusError::Handler(_)));

    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(broker.acked("t").await.is_empty());
    assert_eq!(broker.nacked("t").await.len(), 1);
}

#[tokio::test]
async fn test_consume_drops_errors_when_sink_full() {
    let (broker, _, consumers) = memory_fabrics();
    for _ in 0..3 {
        broker.inject_raw("t", b"{}".to_vec()).await;
    }

    let (calls, handler) = counting(true);
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (err_tx, mut err_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), Some(err_tx)).await });

    wait_until(|| calls.load(Ordering::SeqCst) == 3).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert!(err_rx.try_recv().is_ok());
    assert!(err_rx.try_recv().is_err());
    assert_eq!(broker.nacked("t").await.len(), 3);
}

#[tokio::test]
async fn test_json_handler_decode_failure_goes_to_error_sink() {
    let (broker, _, consumers) = memory_fabrics();
    broker.inject_raw("t", b"not json".to_vec()).await;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let handler: Arc<dyn MessageHandler> = Arc::new(JsonHandler::<Note, _>::new(move |_note: Note| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<(), BusError>(()) }
    }));
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (err_tx, mut err_rx) = mpsc::channel(4);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), Some(err_tx)).await });

    let err = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, BusError::Decode(_)));

    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(broker.acked("t").await.len(), 1);
    assert!(broker.nacked("t").await.is_empty());
}

#[tokio::test]
async fn test_rejected_message_is_dropped_not_redelivered() {
    let (broker, publishers, consumers) = memory_fabrics();
    let publisher = publishers.provide_publisher("t").await.unwrap();
    publisher.publish(&Note { text: "poison".into() }).await.unwrap();
    publisher.publish(&Note { text: "fine".into() }).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler: Arc<dyn MessageHandler> = Arc::new(JsonHandler::<Note, _>::new(move |note: Note| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if note.text == "poison" {
                Err(BusError::Rejected("no row ID".to_string()))
            } else {
                Ok(())
            }
        }
    }));
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (err_tx, mut err_rx) = mpsc::channel(4);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), Some(err_tx)).await });

    let err = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, BusError::Rejected(_)));

    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(broker.acked("t").await.len(), 2);
    assert!(broker.nacked("t").await.is_empty());
    assert_eq!(broker.pending_count("t").await, 0);
}

#[test]
fn test_permanent_errors() {
    assert!(BusError::Rejected("x".into()).is_permanent());
    assert!(BusError::Decode(codec::decode::<Note>(b"{").unwrap_err()).is_permanent());
    assert!(!BusError::Handler("x".into()).is_permanent());
    assert!(!BusError::Publish("x".into()).is_permanent());
}

#[tokio::test]
async fn test_consume_returns_promptly_after_stop() {
    let (_, _, consumers) = memory_fabrics();
    let (_, handler) = counting(false);
    let consumer = consumers.provide_consumer("idle", handler).await.unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move { consumer.consume(Some(stop_rx), None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("consume did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_consume_without_stop_signal_ends_with_subscription() {
    let (broker, _, consumers) = memory_fabrics();
    let (_, handler) = counting(false);
    let consumer = consumers.provide_consumer("t", handler).await.unwrap();

    let task = tokio::spawn(async move { consumer.consume(None, None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    ConsumerBackend::close(&broker).await.unwrap();

    tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("consume did not end")
        .unwrap()
        .unwrap();
}
