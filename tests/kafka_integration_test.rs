//! Integration tests for the Kafka stream client

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use hubcapture::kafka::{KafkaClientConfig, KafkaStreamClient};
use hubcapture::{run_session, SessionConfig, SessionController};

/// Test Kafka broker address
const TEST_KAFKA_BROKER: &str = "localhost:9092";

/// Create a fresh topic so runs do not see each other's events
async fn create_test_topic(partitions: i32) -> Result<String, Box<dyn std::error::Error>> {
    let topic = format!("hubcapture-test-{}", Uuid::new_v4());
    let admin: AdminClient<DefaultClientContext> =
        ClientConfig::new().set("bootstrap.servers", TEST_KAFKA_BROKER).create()?;

    let new_topic = NewTopic::new(&topic, partitions, TopicReplication::Fixed(1));
    let results = admin.create_topics(&[new_topic], &AdminOptions::new()).await?;

    for result in results {
        if let Err((topic, err)) = result {
            return Err(format!("Failed to create topic {}: {}", topic, err).into());
        }
    }

    Ok(topic)
}

/// Send JSON bodies to one partition of a topic
async fn send_events(
    topic: &str,
    partition: i32,
    bodies: &[Value],
) -> Result<(), Box<dyn std::error::Error>> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .set("message.timeout.ms", "5000")
        .create()?;

    for body in bodies {
        let payload = serde_json::to_string(body)?;
        let record = FutureRecord::to(topic)
            .partition(partition)
            .payload(&payload)
            .key("test-key");

        producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(err, _)| err)?;
    }

    Ok(())
}

fn session(topic: &str, duration_secs: u64) -> SessionConfig {
    SessionConfig::new(topic, TEST_KAFKA_BROKER, duration_secs, 5)
        .with_consumer_group(format!("hubcapture-test-{}", Uuid::new_v4()))
        .with_shutdown_timeout_secs(10)
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_session_captures_recent_events() {
    let topic = create_test_topic(2).await.expect("Failed to create topic");

    send_events(&topic, 0, &[json!({"device": "a", "temp": 20}), json!({"device": "a", "temp": 21})])
        .await
        .expect("Failed to send events");
    send_events(&topic, 1, &[json!({"device": "b", "humidity": 40})])
        .await
        .expect("Failed to send events");

    let client = Arc::new(KafkaStreamClient::new(KafkaClientConfig::default()));
    let outcome = SessionController::new(client)
        .run_session_with_report(&session(&topic, 5))
        .await
        .expect("Session failed");

    let table = outcome.table;
    assert_eq!(table.len(), 3);
    assert_eq!(table.columns(), &["device", "temp", "humidity"]);
    assert_eq!(outcome.report.partitions, vec!["0", "1"]);
    assert_eq!(outcome.report.session_errors, 0);
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_session_on_idle_topic_returns_empty_table() {
    let topic = create_test_topic(1).await.expect("Failed to create topic");

    let client = Arc::new(KafkaStreamClient::new(KafkaClientConfig::default()));
    let table = run_session(&session(&topic, 2), client)
        .await
        .expect("Session failed");

    assert!(table.is_empty());
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_unknown_stream_fails_to_connect() {
    let client = Arc::new(KafkaStreamClient::new(KafkaClientConfig {
        request_timeout_ms: 3000,
        ..KafkaClientConfig::default()
    }));

    let result = run_session(&session("hubcapture-missing-stream", 1), client).await;

    let err = result.unwrap_err();
    assert!(err.is_startup_failure());
}
