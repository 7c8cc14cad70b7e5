use std::time::Duration;

use cohort_workbench::config::ApiConfig;
use cohort_workbench::execution::{ExecuteRequest, QueryTime};
use cohort_workbench::gateway::{CohortClient, QUERY_PATH, VERIFY_PATH};
use cohort_workbench::WorkbenchError;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>, timeout_ms: u64) -> CohortClient {
    let api = ApiConfig {
        base_url: format!("{}/", server.uri()),
        timeout_ms,
        token: token.map(str::to_owned),
    };
    CohortClient::new(&api).expect("client builds")
}

fn request(limit: u32) -> ExecuteRequest {
    ExecuteRequest {
        dsl: "select * from lakehouse.patients limit 10".into(),
        description: None,
        limit,
        fields: Some(vec!["patient_id".into(), "age".into()]),
    }
}

#[tokio::test]
async fn verify_accepts_any_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY_PATH))
        .and(body_json(json!({ "dsl": "select 1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None, 2_000);
    client.verify("select 1").await.expect("valid");
}

#[tokio::test]
async fn verify_rejection_carries_plain_text_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("dsl is required\n"))
        .mount(&server)
        .await;

    let err = client_for(&server, None, 2_000).verify("").await.unwrap_err();
    match &err {
        WorkbenchError::Backend { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message.as_deref(), Some("dsl is required"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.reason().as_deref(), Some("dsl is required"));
}

#[tokio::test]
async fn execute_decodes_snake_case_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({ "limit": 50, "fields": ["patient_id", "age"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cohort_id": "c-42",
            "patient_ids": ["p1", "p2", "p3", "p4"],
            "count": 4,
            "query_time": 1_500_000,
            "metadata": {
                "cacheHit": true,
                "tenant": "north",
                "records": [
                    { "patient_id": "p1", "age": 61 },
                    { "patient_id": "p2", "age": null }
                ]
            }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server, None, 2_000).execute(&request(50)).await.expect("ok");
    assert_eq!(result.cohort_id, "c-42");
    assert_eq!(result.count, 4);
    assert_eq!(result.patient_ids.len(), 4);
    assert_eq!(result.query_time, QueryTime::Nanos(1_500_000.0));
    assert!(result.cache_hit);
    assert_eq!(result.tenant.as_deref(), Some("north"));
    assert_eq!(result.slice_count, None);
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0]["age"], json!(61));
}

#[tokio::test]
async fn execute_truncates_records_beyond_the_limit() {
    let server = MockServer::start().await;
    let records: Vec<_> = (0..8).map(|i| json!({ "patient_id": format!("p{i}") })).collect();
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cohortId": "c-1",
            "count": 8,
            "metadata": { "records": records }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server, None, 2_000).execute(&request(5)).await.expect("ok");
    assert_eq!(result.records.len(), 5);
    assert_eq!(result.records[4]["patient_id"], json!("p4"));
    assert_eq!(result.count, 8);
}

#[tokio::test]
async fn execute_treats_missing_records_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cohortId": "c-empty",
            "metadata": { "records": "not-a-list" }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server, None, 2_000).execute(&request(10)).await.expect("ok");
    assert!(result.records.is_empty());
    assert_eq!(result.query_time, QueryTime::Unknown);
}

#[tokio::test]
async fn execute_rejects_non_json_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server, None, 2_000).execute(&request(10)).await.unwrap_err();
    assert!(matches!(err, WorkbenchError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn execute_server_error_surfaces_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("failed to execute cohort query"))
        .mount(&server)
        .await;

    let err = client_for(&server, None, 2_000).execute(&request(10)).await.unwrap_err();
    assert_eq!(err.reason().as_deref(), Some("failed to execute cohort query"));
}

#[tokio::test]
async fn bearer_token_is_sent_on_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY_PATH))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, Some("s3cret"), 2_000)
        .verify("select 1")
        .await
        .expect("authorized");
}

#[tokio::test]
async fn slow_backend_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1_500)))
        .mount(&server)
        .await;

    let err = client_for(&server, None, 100).execute(&request(10)).await.unwrap_err();
    assert!(matches!(err, WorkbenchError::Timeout { timeout_ms: 100 }), "got {err:?}");
}
