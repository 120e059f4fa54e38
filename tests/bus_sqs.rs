//! AWS SQS bus integration tests using testcontainers.
//!
//! Run with: cargo test --test bus_sqs --features sqs -- --ignored --nocapture
//!
//! Uses LocalStack. Tests share one container.

#![cfg(feature = "sqs")]

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::{mpsc, watch, OnceCell};

use sous::bus::sqs::SqsBackend;
use sous::bus::{
    BusError, ConsumerBackend, ConsumerProvider, Delivery, JsonHandler, PublisherProvider,
    SqsBusConfig, Subscription,
};
use sous::indexing::{IndexRequest, IndexType};

static LOCALSTACK: OnceCell<(ContainerAsync<GenericImage>, String)> = OnceCell::const_new();

async fn localstack_endpoint() -> String {
    let (_, endpoint) = LOCALSTACK
        .get_or_init(|| async {
            let container = GenericImage::new("localstack/localstack", "latest")
                .with_exposed_port(4566.tcp())
                .with_wait_for(WaitFor::message_on_stdout("Ready."))
                .with_env_var("SERVICES", "sqs")
                .with_env_var("AWS_DEFAULT_REGION", "us-east-1")
                .with_env_var("EAGER_SERVICE_LOADING", "1")
                .with_env_var("LOCALSTACK_HOST", "localhost")
                .with_startup_timeout(Duration::from_secs(180))
                .start()
                .await
                .expect("Failed to start localstack container");

            tokio::time::sleep(Duration::from_secs(2)).await;

            let host = container.get_host().await.expect("Failed to get container host");
            let port = container
                .get_host_port_ipv4(4566)
                .await
                .expect("Failed to get mapped port");

            std::env::set_var("AWS_ACCESS_KEY_ID", "test");
            std::env::set_var("AWS_SECRET_ACCESS_KEY", "test");
            (container, format!("http://{}:{}", host, port))
        })
        .await;
    endpoint.clone()
}

async fn backend() -> Arc<SqsBackend> {
    let config = SqsBusConfig {
        region: Some("us-east-1".to_string()),
        endpoint_url: Some(localstack_endpoint().await),
        wait_time_secs: 1,
        visibility_timeout_secs: 30,
        ..Default::default()
    };
    Arc::new(SqsBackend::connect(&config).await.expect("Failed to build SQS client"))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sqs_publish_and_consume() {
    let backend = backend().await;
    let queue = format!("search_index_requests_{}", uuid::Uuid::new_v4().simple());
    let publishers = PublisherProvider::new(backend.clone());
    let consumers = ConsumerProvider::new(backend.clone());

    // Queues buffer, so publishing first is fine.
    let request = IndexRequest::upsert("r1", IndexType::Recipes);
    publishers
        .provide_publisher(&queue)
        .await
        .unwrap()
        .publish(&request)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let handler = Arc::new(JsonHandler::<IndexRequest, _>::new(move |request: IndexRequest| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(request).await;
            Ok::<_, BusError>(())
        }
    }));
    let consumer = consumers.provide_consumer(&queue, handler).await.unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let running = tokio::spawn(async move { consumer.consume(Some(stop_rx), None).await });

    let received = tokio::time::timeout(Duration::from_secs(15), rx.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Channel closed");
    assert_eq!(received, request);

    stop_tx.send(true).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sqs_ack_deletes_and_nack_redelivers() {
    let backend = backend().await;
    let queue = format!("data_changes_{}", uuid::Uuid::new_v4().simple());
    let publisher = PublisherProvider::new(backend.clone())
        .provide_publisher(&queue)
        .await
        .unwrap();
    publisher
        .publish(&IndexRequest::upsert("r1", IndexType::Recipes))
        .await
        .unwrap();

    let mut subscription = backend.subscribe(&queue).await.unwrap();

    let first = subscription.next().await.unwrap().expect("message");
    let first_id = first.message().id.clone();
    first.nack().await.unwrap();

    let again = subscription.next().await.unwrap().expect("redelivered message");
    assert_eq!(again.message().id, first_id);
    let request: IndexRequest = again.message().decode().unwrap();
    assert_eq!(request.row_id, "r1");
    again.ack().await.unwrap();

    let drained = tokio::time::timeout(Duration::from_secs(3), subscription.next()).await;
    assert!(drained.is_err(), "acked message must not come back");

    subscription.release().await.unwrap();
}
