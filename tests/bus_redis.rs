//! Redis pub/sub bus integration tests using testcontainers.
//!
//! Run with: cargo test --test bus_redis --features redis -- --ignored --nocapture

#![cfg(feature = "redis")]

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage,
};
use tokio::sync::{mpsc, watch};

use sous::bus::redis::RedisBackend;
use sous::bus::{BusError, ConsumerProvider, JsonHandler, PublisherProvider, RedisBusConfig};
use sous::indexing::{IndexRequest, IndexType};

async fn start_redis() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start redis container");

    let host = container.get_host().await.expect("Failed to get container host");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get mapped port");

    (container, format!("redis://{}:{}", host, port))
}

async fn connect(url: &str) -> RedisBackend {
    RedisBackend::connect(&RedisBusConfig {
        url: url.to_string(),
    })
    .await
    .expect("Failed to connect to redis")
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_publish_and_consume() {
    let (_container, url) = start_redis().await;
    let topic = format!("search_index_requests_{}", uuid::Uuid::new_v4().simple());

    let publishers = PublisherProvider::new(Arc::new(connect(&url).await));
    let consumers = ConsumerProvider::new(Arc::new(connect(&url).await));

    let (tx, mut rx) = mpsc::channel(8);
    let handler = Arc::new(JsonHandler::<IndexRequest, _>::new(move |request: IndexRequest| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(request).await;
            Ok::<_, BusError>(())
        }
    }));
    let consumer = consumers.provide_consumer(&topic, handler).await.unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let running = tokio::spawn(async move { consumer.consume(Some(stop_rx), None).await });

    // Pub/sub drops messages published before the subscription is live.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let publisher = publishers.provide_publisher(&topic).await.unwrap();
    let request = IndexRequest::upsert("r1", IndexType::Recipes);
    publisher.publish(&request).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Channel closed");
    assert_eq!(received, request);

    stop_tx.send(true).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), running).await;
    assert!(stopped.unwrap().unwrap().is_ok());

    publishers.close().await;
    consumers.close().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_publish_without_subscribers_succeeds() {
    let (_container, url) = start_redis().await;
    let publishers = PublisherProvider::new(Arc::new(connect(&url).await));

    let publisher = publishers.provide_publisher("data_changes").await.unwrap();
    publisher
        .publish(&IndexRequest::delete("r1", IndexType::Recipes))
        .await
        .unwrap();
}
