use gamemaster_pipeline::vector::{
    CollectionStatus, Distance, QdrantGateway, VectorParams, VectorPoint, VectorStore,
    VectorStoreError,
};
use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

fn collection_body(size: u64, distance: &str) -> String {
    json!({
        "result": {
            "status": "green",
            "config": { "params": { "vectors": { "size": size, "distance": distance } } }
        },
        "status": "ok",
        "time": 0.001
    })
    .to_string()
}

fn point(index: u8) -> VectorPoint {
    let mut payload = serde_json::Map::new();
    payload.insert("documentId".into(), json!("doc-1"));
    payload.insert("chunkIndex".into(), json!(index));
    VectorPoint {
        id: Uuid::new_v4(),
        vector: vec![0.1, 0.2, 0.3, f32::from(index)],
        payload,
    }
}

fn gateway(server: &mockito::ServerGuard) -> QdrantGateway {
    QdrantGateway::new(server.url(), None, 5).unwrap()
}

#[tokio::test]
async fn test_missing_collection_is_created() {
    let mut server = mockito::Server::new_async().await;
    let lookup = server
        .mock("GET", "/collections/ruleset_chunks")
        .with_status(404)
        .with_body(r#"{"status":{"error":"Not found"}}"#)
        .create_async()
        .await;
    let create = server
        .mock("PUT", "/collections/ruleset_chunks")
        .match_body(Matcher::Json(json!({ "vectors": { "size": 4, "distance": "Cosine" } })))
        .with_status(200)
        .with_body(r#"{"result":true,"status":"ok"}"#)
        .create_async()
        .await;

    let status = gateway(&server)
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap();

    assert_eq!(status, CollectionStatus::Created);
    lookup.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_matching_collection_is_left_alone() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collections/ruleset_chunks")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(collection_body(4, "Cosine"))
        .create_async()
        .await;
    let create = server
        .mock("PUT", "/collections/ruleset_chunks")
        .expect(0)
        .create_async()
        .await;

    let status = gateway(&server)
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap();

    assert_eq!(status, CollectionStatus::AlreadyExists);
    create.assert_async().await;
}

#[tokio::test]
async fn test_mismatched_collection_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collections/ruleset_chunks")
        .with_status(200)
        .with_body(collection_body(1536, "Dot"))
        .create_async()
        .await;

    let err = gateway(&server)
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap_err();

    match err {
        VectorStoreError::IncompatibleCollection { name, detail } => {
            assert_eq!(name, "ruleset_chunks");
            assert!(detail.contains("1536"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_creation_race_counts_as_existing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collections/ruleset_chunks")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("PUT", "/collections/ruleset_chunks")
        .with_status(409)
        .with_body(r#"{"status":{"error":"already exists"}}"#)
        .create_async()
        .await;

    let status = gateway(&server)
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap();
    assert_eq!(status, CollectionStatus::AlreadyExists);
}

#[tokio::test]
async fn test_upsert_waits_for_the_write() {
    let mut server = mockito::Server::new_async().await;
    let upsert = server
        .mock("PUT", Matcher::Regex(r"^/collections/ruleset_chunks/points".to_string()))
        .match_query(Matcher::UrlEncoded("wait".into(), "true".into()))
        .match_body(Matcher::PartialJson(json!({
            "points": [{ "payload": { "documentId": "doc-1", "chunkIndex": 0 } }]
        })))
        .with_status(200)
        .with_body(r#"{"result":{"operation_id":1,"status":"completed"},"status":"ok"}"#)
        .create_async()
        .await;

    gateway(&server)
        .upsert("ruleset_chunks", vec![point(0)])
        .await
        .unwrap();
    upsert.assert_async().await;
}

#[tokio::test]
async fn test_empty_upsert_skips_the_request() {
    let mut server = mockito::Server::new_async().await;
    let upsert = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    gateway(&server).upsert("ruleset_chunks", vec![]).await.unwrap();
    upsert.assert_async().await;
}

#[tokio::test]
async fn test_overloaded_store_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", Matcher::Regex(r"^/collections/ruleset_chunks/points".to_string()))
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let err = gateway(&server)
        .upsert("ruleset_chunks", vec![point(0), point(1)])
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_bad_request_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", Matcher::Regex(r"^/collections/ruleset_chunks/points".to_string()))
        .with_status(400)
        .with_body(r#"{"status":{"error":"wrong vector size"}}"#)
        .create_async()
        .await;

    let err = gateway(&server)
        .upsert("ruleset_chunks", vec![point(0)])
        .await
        .unwrap_err();
    match err {
        VectorStoreError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("wrong vector size"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!VectorStoreError::Rejected {
        status: 400,
        message: String::new()
    }
    .is_unavailable());
}

#[tokio::test]
async fn test_upsert_into_missing_collection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", Matcher::Regex(r"^/collections/gone/points".to_string()))
        .with_status(404)
        .create_async()
        .await;

    let err = gateway(&server).upsert("gone", vec![point(0)]).await.unwrap_err();
    assert_eq!(err, VectorStoreError::CollectionNotFound("gone".to_string()));
}

#[tokio::test]
async fn test_unreachable_store_is_unavailable() {
    // Nothing listens on port 9 locally
    let gateway = QdrantGateway::new("http://127.0.0.1:9", None, 2).unwrap();
    let err = gateway
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_api_key_header_is_sent() {
    let mut server = mockito::Server::new_async().await;
    let lookup = server
        .mock("GET", "/collections/ruleset_chunks")
        .match_header("api-key", "secret")
        .with_status(200)
        .with_body(collection_body(4, "Cosine"))
        .create_async()
        .await;

    QdrantGateway::new(server.url(), Some("secret".to_string()), 5)
        .unwrap()
        .ensure_collection("ruleset_chunks", VectorParams::new(4, Distance::Cosine))
        .await
        .unwrap();
    lookup.assert_async().await;
}
