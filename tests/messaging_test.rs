mod common;

use common::*;
use gamemaster_pipeline::messages::{ConversationMessageCreated, DocumentUploaded};
use gamemaster_pipeline::messaging::{
    broker_factory, routing_key_for, BackfillJob, Broker, DeliveryStream, InMemoryBroker,
    MessageRole, MessagingBackend, MessagingConfig, MessagingError, Publisher, QueueSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn turn(id: &str, role: MessageRole) -> ConversationMessageCreated {
    ConversationMessageCreated {
        message_id: id.to_string(),
        game_id: "game-7".to_string(),
        role,
        content: "Roll for initiative.".to_string(),
        correlation_token: Some("tok-1".to_string()),
        tool_calls: vec![],
    }
}

/// Test messaging config defaults
#[test]
fn test_messaging_config_defaults() {
    let config = MessagingConfig::default();
    assert_eq!(config.backend, MessagingBackend::Nats);
    assert_eq!(config.nats.servers, vec!["nats://localhost:4222".to_string()]);
    assert_eq!(config.nats.connection_name, "gamemaster-pipeline");
    assert_eq!(config.prefetch, 1);
    assert_eq!(config.retry.max_attempts, 5);
}

/// Routing keys carry the role suffix only for role-aware messages
#[test]
fn test_routing_keys() {
    assert_eq!(routing_key_for("DocumentUploaded", None), "DocumentUploaded");
    assert_eq!(
        routing_key_for("ConversationMessageCreated", Some(MessageRole::Tool)),
        "ConversationMessageCreated.tool"
    );
}

#[tokio::test]
async fn test_publish_body_is_camel_case_json() {
    let broker = InMemoryBroker::new();
    let spec = QueueSpec::for_message::<DocumentUploaded>();
    declare(&broker, &spec).await;

    let publisher = Publisher::new(Arc::new(broker.clone()));
    let message_id = publisher
        .publish(
            &DocumentUploaded::new("doc-9", "rs-2", "/docs/monsters.pdf"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!message_id.is_empty());

    let mut stream = broker.consume(&spec, 1).await.unwrap();
    let delivery = stream.next().await.unwrap().unwrap();
    assert_eq!(delivery.properties.message_id, message_id);
    assert_eq!(delivery.properties.message_type, "DocumentUploaded");
    assert_eq!(delivery.properties.content_type, "application/json");
    assert!(delivery.properties.persistent);

    let body: serde_json::Value = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(body["documentId"], "doc-9");
    assert_eq!(body["rulesetId"], "rs-2");
    assert_eq!(body["filePath"], "/docs/monsters.pdf");
    assert!(body.get("gameId").is_none());

    delivery.ack().await.unwrap();
}

/// A wildcard binding sees every role; a role binding sees only its own
#[tokio::test]
async fn test_topic_bindings_fan_out() {
    let broker = InMemoryBroker::new();
    let all_roles = QueueSpec {
        exchange: "ConversationMessageCreated".to_string(),
        queue: "ConversationMessageCreated.audit".to_string(),
        binding_key: "ConversationMessageCreated.*".to_string(),
    };
    let assistant =
        QueueSpec::for_message_role::<ConversationMessageCreated>(MessageRole::Assistant);
    declare(&broker, &all_roles).await;
    declare(&broker, &assistant).await;

    let publisher = Publisher::new(Arc::new(broker.clone()));
    let cancel = CancellationToken::new();
    for (id, role) in [
        ("m1", MessageRole::User),
        ("m2", MessageRole::Assistant),
        ("m3", MessageRole::Tool),
    ] {
        publisher.publish(&turn(id, role), &cancel).await.unwrap();
    }

    assert_eq!(broker.queue_stats(&all_roles.queue).unwrap().ready, 3);
    assert_eq!(broker.queue_stats(&assistant.queue).unwrap().ready, 1);
}

#[tokio::test]
async fn test_unroutable_publish_is_not_an_error() {
    let broker = InMemoryBroker::new();
    let publisher = Publisher::new(Arc::new(broker.clone()));

    publisher
        .publish(&turn("m1", MessageRole::System), &CancellationToken::new())
        .await
        .unwrap();

    assert!(broker.has_exchange("ConversationMessageCreated"));
    assert_eq!(broker.unroutable_count(), 1);
}

#[tokio::test]
async fn test_cancelled_publish_is_rejected() {
    let broker = InMemoryBroker::new();
    let publisher = Publisher::new(Arc::new(broker.clone()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = publisher
        .publish(&DocumentUploaded::new("doc-1", "rs-1", "/a.pdf"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Cancelled));
    assert!(!broker.has_exchange("DocumentUploaded"));
}

#[tokio::test]
async fn test_backfill_publishes_every_message() {
    let broker = InMemoryBroker::new();
    let spec = QueueSpec::for_message::<DocumentUploaded>();
    declare(&broker, &spec).await;

    let messages: Vec<DocumentUploaded> = (0..50)
        .map(|i| DocumentUploaded::new(format!("doc-{}", i), "rs-1", format!("/docs/{}.txt", i)))
        .collect();
    let publisher = Arc::new(Publisher::new(Arc::new(broker.clone())));

    let handle = BackfillJob::spawn(publisher, messages, 4);
    let report = tokio::time::timeout(Duration::from_secs(10), handle.join())
        .await
        .unwrap();

    assert_eq!(report.message_type, "DocumentUploaded");
    assert_eq!(report.submitted, 50);
    assert_eq!(report.published, 50);
    assert_eq!(report.failed, 0);
    assert_eq!(broker.queue_stats(&spec.queue).unwrap().ready, 50);
}

#[tokio::test]
async fn test_in_memory_factory_shares_one_broker() {
    let mut config = MessagingConfig::default();
    config.backend = MessagingBackend::InMemory;
    let factory = broker_factory(&config);

    let first = factory.connect().await.unwrap();
    let second = factory.connect().await.unwrap();
    let spec = QueueSpec::for_message::<DocumentUploaded>();

    first.declare_exchange(&spec.exchange).await.unwrap();
    first.declare_queue(&spec).await.unwrap();
    assert_eq!(second.queue_depth(&spec).await.unwrap(), 0);
    assert_eq!(second.backend_name(), "in_memory");
}

/// With prefetch 1 the stream holds the second delivery until the first settles
#[tokio::test]
async fn test_stream_withholds_until_settled() {
    let broker = InMemoryBroker::new();
    let spec = QueueSpec::for_message::<DocumentUploaded>();
    declare(&broker, &spec).await;

    let publisher = Publisher::new(Arc::new(broker.clone()));
    let cancel = CancellationToken::new();
    for id in ["doc-1", "doc-2"] {
        publisher
            .publish(&DocumentUploaded::new(id, "rs-1", "/a.txt"), &cancel)
            .await
            .unwrap();
    }

    let mut stream = broker.consume(&spec, 1).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();

    let mut second = tokio_test::task::spawn(stream.next());
    tokio_test::assert_pending!(second.poll());

    first.ack().await.unwrap();
    assert!(second.is_woken());
    let delivery = tokio_test::assert_ready!(second.poll()).unwrap().unwrap();
    let body: serde_json::Value = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(body["documentId"], "doc-2");
}
