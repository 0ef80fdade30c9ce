use faas_router::config::{RetryPolicy, StoreSettings};
use faas_router::manifest::{ReconciliationRecord, ResourceKind, ResourceStatus};
use faas_router::store::{HttpStateStore, RemoteStateStore, StoreError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer, max_attempts: u32) -> StoreSettings {
    StoreSettings {
        base_url: format!("{}/", server.uri()),
        bearer_token: Some(String::from("secret")),
        request_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
        },
    }
}

fn store(server: &MockServer, max_attempts: u32) -> HttpStateStore {
    HttpStateStore::new(settings(server, max_attempts)).unwrap()
}

#[tokio::test]
async fn fetches_the_persisted_manifest_with_bearer_auth() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .and(bearer_token("secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0",
            "project_name": "demo",
            "resources": {
                "rA": {
                    "resource_type": "ServerlessEndpoint",
                    "config_hash": "abc",
                    "endpoint_url": "http://ra:8080",
                    "status": "deployed"
                },
                "rB": {"status": "failed", "error": "boom"}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = store(&server, 3).fetch_manifest("demo").await.unwrap().unwrap();

    let record = document.record("rA").unwrap();
    assert_eq!(record.resource_type, Some(ResourceKind::ServerlessEndpoint));
    assert_eq!(record.config_hash.as_deref(), Some("abc"));
    assert_eq!(
        document.directory_entries().into_iter().collect::<Vec<_>>(),
        vec![(String::from("rA"), String::from("http://ra:8080"))]
    );
}

#[tokio::test]
async fn missing_scope_is_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert!(store(&server, 3).fetch_manifest("demo").await.unwrap().is_none());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let document = store(&server, 3).fetch_manifest("demo").await.unwrap();
    assert!(document.unwrap().resources.is_empty());
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let error = store(&server, 3).fetch_manifest("demo").await.unwrap_err();

    assert!(error.is_unavailable());
    assert!(matches!(error, StoreError::Unavailable { attempts: 3, .. }));
}

#[tokio::test]
async fn slow_responses_time_out_and_count_as_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let error = store(&server, 2).fetch_manifest("demo").await.unwrap_err();

    assert!(matches!(error, StoreError::Unavailable { attempts: 2, .. }));
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let error = store(&server, 3).fetch_manifest("demo").await.unwrap_err();
    assert!(matches!(error, StoreError::Unauthorized));
}

#[tokio::test]
async fn malformed_body_is_an_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scopes/demo/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let error = store(&server, 3).fetch_manifest("demo").await.unwrap_err();
    assert!(matches!(error, StoreError::InvalidResponse(_)));
}

#[tokio::test]
async fn upserts_records_as_json() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/scopes/demo/resources/rA"))
        .and(bearer_token("secret"))
        .and(body_json(json!({
            "resource_type": "CpuServerlessEndpoint",
            "config_hash": "abc",
            "endpoint_url": "http://ra:8080",
            "status": "updated"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = ReconciliationRecord {
        resource_type: Some(ResourceKind::CpuServerlessEndpoint),
        config_hash: Some(String::from("abc")),
        endpoint_url: Some(String::from("http://ra:8080")),
        status: ResourceStatus::Updated,
        error: None,
    };

    store(&server, 3)
        .upsert_resource("demo", "rA", &record)
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_upsert_is_reported_with_its_status() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/scopes/demo/resources/rA"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;

    let error = store(&server, 3)
        .upsert_resource("demo", "rA", &ReconciliationRecord::default())
        .await
        .unwrap_err();

    assert!(matches!(error, StoreError::Rejected { status: 422 }));
}

#[tokio::test]
async fn deleting_a_missing_record_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/scopes/demo/resources/rOld"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, 3)
        .delete_resource("demo", "rOld")
        .await
        .unwrap();
}

#[tokio::test]
async fn resource_names_cannot_escape_their_path_segment() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/scopes/demo/resources/..%2Fother%2Fresources%2Fvictim%3Fx"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, 1)
        .delete_resource("demo", "../other/resources/victim?x")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), None);
}
