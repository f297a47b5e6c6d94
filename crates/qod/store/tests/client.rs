use std::sync::Arc;

use qod_store::{
    Document, FieldPath, Filter, InMemoryDocumentStore, StoreClient, StoreError, StoreSettings,
    Update,
};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qod_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_test_writer())
        .try_init();
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

async fn connected() -> StoreClient<qod_store::Connected> {
    init_tracing();
    StoreClient::new(StoreSettings::new("qod-test", "memory://"))
        .connect()
        .await
        .expect("memory backend should connect")
}

#[tokio::test]
async fn connect_rejects_unsupported_scheme() {
    let err = StoreClient::new(StoreSettings::new("qod-test", "redis://localhost"))
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err.root(), StoreError::Connection(_)));
    assert_eq!(err.operations(), vec!["connect"]);
}

#[cfg(not(feature = "mongodb"))]
#[tokio::test]
async fn mongodb_url_needs_feature() {
    let err = StoreClient::new(StoreSettings::new("qod-test", "mongodb://localhost:27017"))
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err.root(), StoreError::Connection(_)));
}

#[tokio::test]
async fn disconnect_without_connect_is_noop() {
    let client = StoreClient::new(StoreSettings::new("qod-test", "memory://"));
    let client = client.disconnect();
    assert_eq!(client.db_name(), "qod-test");
}

#[tokio::test]
async fn get_one_on_empty_collection_is_not_found() {
    let client = connected().await;
    let err = client
        .get_one("prov", &Filter::all().eq("asIpv4Addr", "10.9.9.9"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_decode());
}

#[tokio::test]
async fn upsert_returns_prior_match_count() {
    let client = connected().await;
    let filter = Filter::all().eq("asIpv4Addr", "10.0.0.1");

    assert_eq!(
        client
            .upsert("prov", &filter, doc(json!({"region": "eu"})))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        client
            .upsert("prov", &filter, doc(json!({"region": "eu"})))
            .await
            .unwrap(),
        1
    );
    assert_eq!(client.count("prov", &Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn conditional_update_reports_zero_for_missing() {
    let client = connected().await;
    let matched = client
        .update("prov", &Filter::all().eq("asIpv4Addr", "nope"), doc(json!({"a": 1})))
        .await
        .unwrap();
    assert_eq!(matched, 0);
    assert_eq!(client.count("prov", &Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn increment_and_fetch_creates_then_advances() {
    let client = connected().await;
    let filter = Filter::all().eq("ueIpv4Addr", "10.0.0.5").eq("scsAsId", "app1");
    let inc = Update::increment(FieldPath::field("FlowCounter"), 1);

    let first = client.increment_and_fetch("flows", &filter, &inc).await.unwrap();
    let second = client.increment_and_fetch("flows", &filter, &inc).await.unwrap();

    assert_eq!(first["FlowCounter"], json!(1));
    assert_eq!(first["scsAsId"], json!("app1"));
    assert_eq!(second["FlowCounter"], json!(2));
}

#[tokio::test]
async fn update_many_stops_at_first_unmatched_filter() {
    let client = connected().await;
    client
        .insert_many(
            "sessions",
            vec![
                doc(json!({"sessionId": "a", "state": "new"})),
                doc(json!({"sessionId": "b", "state": "new"})),
                doc(json!({"sessionId": "c", "state": "new"})),
            ],
        )
        .await
        .unwrap();

    let err = client
        .update_many(
            "sessions",
            vec![
                (Filter::all().eq("sessionId", "a"), doc(json!({"state": "done"}))),
                (Filter::all().eq("sessionId", "zzz"), doc(json!({"state": "done"}))),
                (Filter::all().eq("sessionId", "c"), doc(json!({"state": "done"}))),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), StoreError::UpdateNotMatched { index: 1 }));

    let a = client
        .get_one("sessions", &Filter::all().eq("sessionId", "a"))
        .await
        .unwrap();
    let c = client
        .get_one("sessions", &Filter::all().eq("sessionId", "c"))
        .await
        .unwrap();
    assert_eq!(a["state"], json!("done"));
    assert_eq!(c["state"], json!("new"));
}

#[tokio::test]
async fn update_many_stops_at_first_failing_update() {
    let client = connected().await;
    client
        .insert_many(
            "sessions",
            vec![
                doc(json!({"sessionId": "a", "state": "new"})),
                doc(json!({"sessionId": "b", "sessionReq": "flat"})),
                doc(json!({"sessionId": "c", "state": "new"})),
            ],
        )
        .await
        .unwrap();

    let err = client
        .update_many(
            "sessions",
            vec![
                (Filter::all().eq("sessionId", "a"), doc(json!({"state": "done"}))),
                (Filter::all().eq("sessionId", "b"), doc(json!({"sessionReq.Qos": "QOS_E"}))),
                (Filter::all().eq("sessionId", "c"), doc(json!({"state": "done"}))),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), StoreError::InvalidInput(_)));
    assert_eq!(err.operations(), vec!["update_many", "update"]);

    let a = client
        .get_one("sessions", &Filter::all().eq("sessionId", "a"))
        .await
        .unwrap();
    let b = client
        .get_one("sessions", &Filter::all().eq("sessionId", "b"))
        .await
        .unwrap();
    let c = client
        .get_one("sessions", &Filter::all().eq("sessionId", "c"))
        .await
        .unwrap();
    assert_eq!(a["state"], json!("done"));
    assert_eq!(b["sessionReq"], json!("flat"));
    assert_eq!(c["state"], json!("new"));
}

#[tokio::test]
async fn insert_many_partial_failure_keeps_inserted_documents() {
    let client = connected().await;
    let err = client
        .insert_many(
            "prov",
            vec![
                doc(json!({"_id": "x", "asIpv4Addr": "10.0.0.1"})),
                doc(json!({"_id": "x", "asIpv4Addr": "10.0.0.2"})),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), StoreError::DuplicateKey(_)));
    assert_eq!(client.count("prov", &Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn get_many_on_no_match_is_empty() {
    let client = connected().await;
    client
        .insert_one("flows", doc(json!({"ueIpv4Addr": "10.0.0.5"})))
        .await
        .unwrap();
    let docs = client
        .get_many("flows", &Filter::all().eq("ueIpv4Addr", "10.0.0.6"))
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn shared_backend_rejects_clients_after_shutdown() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let settings = StoreSettings::new("qod-test", "memory://");
    let first = StoreClient::new(settings.clone()).attach(store.clone());
    let second = StoreClient::new(settings).attach(store);

    first
        .insert_one("flows", doc(json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(second.count("flows", &Filter::all()).await.unwrap(), 1);

    first.disconnect().await.unwrap();
    let err = second.count("flows", &Filter::all()).await.unwrap_err();
    assert!(err.is_not_connected());
    assert_eq!(err.operations(), vec!["count"]);
}

#[tokio::test]
async fn drop_database_removes_everything() {
    let client = connected().await;
    client.insert_one("a", doc(json!({"n": 1}))).await.unwrap();
    client.insert_one("b", doc(json!({"n": 2}))).await.unwrap();

    client.drop_collection("a").await.unwrap();
    assert_eq!(client.count("a", &Filter::all()).await.unwrap(), 0);
    assert_eq!(client.count("b", &Filter::all()).await.unwrap(), 1);

    client.drop_database().await.unwrap();
    assert_eq!(client.count("b", &Filter::all()).await.unwrap(), 0);
}
