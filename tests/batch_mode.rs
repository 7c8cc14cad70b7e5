use std::fs;
use std::path::Path;

use cohort_workbench::batch_mode::{run_batch_mode, run_batch_verify, BatchConfig, BatchOutcome, OutputFormat};
use cohort_workbench::config::{ApiConfig, WorkbenchConfig};
use cohort_workbench::gateway::{CohortClient, QUERY_PATH, VERIFY_PATH};
use cohort_workbench::verification::VerificationOutcome;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CohortClient {
    CohortClient::new(&ApiConfig {
        base_url: server.uri(),
        timeout_ms: 2_000,
        token: None,
    })
    .expect("client builds")
}

fn batch(dir: &TempDir, format: OutputFormat) -> BatchConfig {
    let dsl_file = dir.path().join("cohort.dsl");
    fs::write(&dsl_file, "select patient_id, value from lakehouse.observations").unwrap();
    BatchConfig {
        dsl_file,
        output_dir: dir.path().join("out"),
        output_format: format,
        limit: Some("25".into()),
        fields: vec!["patient_id".into(), "value".into()],
        description: None,
        verify_first: false,
        verbose: false,
    }
}

fn outputs(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn run_writes_csv_in_resolved_column_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({ "limit": 25 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cohortId": "BP High",
            "count": 2,
            "metadata": { "records": [
                { "patient_id": "p1", "value": 140 },
                { "patient_id": "p2", "value": 150, "unit": "mmHg" }
            ]}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = batch(&dir, OutputFormat::Csv);
    let outcome = run_batch_mode(&client(&server), &WorkbenchConfig::default(), &config)
        .await
        .expect("batch run");

    let (path, rows) = match outcome {
        BatchOutcome::Written { path, rows } => (path, rows),
        other => panic!("expected a written file, got {other:?}"),
    };
    assert_eq!(rows, 2);
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("bp-high-") && name.ends_with(".csv"), "{name}");
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "patient_id,value,unit\r\np1,140,\r\np2,150,mmHg\r\n"
    );
}

#[tokio::test]
async fn run_with_zero_records_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "cohortId": "none" })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = batch(&dir, OutputFormat::Json);
    let outcome = run_batch_mode(&client(&server), &WorkbenchConfig::default(), &config)
        .await
        .expect("batch run");

    assert_eq!(outcome, BatchOutcome::NoRecords { cohort_id: "none".into() });
    assert_eq!(outputs(&config.output_dir), 0);
}

#[tokio::test]
async fn rejected_dsl_aborts_before_execute() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown table"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = batch(&dir, OutputFormat::Csv);
    config.verify_first = true;
    let err = run_batch_mode(&client(&server), &WorkbenchConfig::default(), &config)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown table"), "{err}");
    assert_eq!(outputs(&config.output_dir), 0);
}

#[tokio::test]
async fn backend_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = batch(&dir, OutputFormat::Text);
    let err = run_batch_mode(&client(&server), &WorkbenchConfig::default(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Cohort run failed: Cohort run failed");
}

#[tokio::test]
async fn unparsable_limit_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = batch(&dir, OutputFormat::Csv);
    config.limit = Some("lots".into());

    let err = run_batch_mode(&client(&server), &WorkbenchConfig::default(), &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("lots"), "{err}");
}

#[tokio::test]
async fn verify_command_reports_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = batch(&dir, OutputFormat::Csv);
    let verdict = run_batch_verify(&client(&server), &config.dsl_file).await.unwrap();
    assert_eq!(verdict, VerificationOutcome::Valid);
}
