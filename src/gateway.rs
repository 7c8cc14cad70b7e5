//! HTTP gateway to the cohort service plus the background worker the
//! terminal UI talks to.
//!
//! The UI thread never awaits: it sends a [`GatewayRequest`] tagged with the
//! controller's ticket and later picks up the matching [`GatewayResponse`].
//! Requests are spawned independently on the worker's runtime, so responses
//! may come back in any order; the controllers sort that out.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ApiConfig;
use crate::error::{Result, WorkbenchError};
use crate::execution::{ExecuteRequest, ExecutionResult, QueryTime, Record};
use crate::sequencer::Ticket;

pub const VERIFY_PATH: &str = "/api/v1/cohort/verify";
pub const QUERY_PATH: &str = "/api/v1/cohort/query";

/* ── client ─────────────────────────────────────────────────────────────── */

#[derive(Debug, Clone)]
pub struct CohortClient {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl CohortClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = api.token.as_deref().filter(|t| !t.is_empty()) {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("api.token contains characters not allowed in a header; ignored"),
            }
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(api.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_owned(),
            timeout_ms: api.timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Any 2xx means the DSL is valid; the body is not inspected.
    pub async fn verify(&self, dsl: &str) -> Result<()> {
        let url = format!("{}{VERIFY_PATH}", self.base_url);
        debug!("POST {url}");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "dsl": dsl }))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(backend_error(status, &body))
    }

    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult> {
        let url = format!("{}{QUERY_PATH}", self.base_url);
        debug!("POST {url} (limit {})", request.limit);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport(e))?;
        if !status.is_success() {
            return Err(backend_error(status, &String::from_utf8_lossy(&body)));
        }

        let wire: WireCohortResult = serde_json::from_slice(&body)
            .map_err(|e| WorkbenchError::Decode(e.to_string()))?;
        let mut result = wire.into_result();

        let limit = request.limit as usize;
        if result.records.len() > limit {
            warn!(
                "cohort {} returned {} records for limit {limit}; truncating",
                result.cohort_id,
                result.records.len()
            );
            result.records.truncate(limit);
        }
        Ok(result)
    }

    fn transport(&self, err: reqwest::Error) -> WorkbenchError {
        if err.is_timeout() {
            WorkbenchError::Timeout { timeout_ms: self.timeout_ms }
        } else {
            WorkbenchError::Transport(err)
        }
    }
}

/// The gateway answers errors with a plain-text body; JSON `{message}` or
/// `{error}` bodies are read too.
fn backend_error(status: StatusCode, body: &str) -> WorkbenchError {
    let body = body.trim();
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => obj
            .get("message")
            .or_else(|| obj.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| Some(body.to_owned())),
        _ => Some(body.to_owned()),
    }
    .filter(|m| !m.trim().is_empty());
    WorkbenchError::Backend { status: status.as_u16(), message }
}

/* ── wire format ────────────────────────────────────────────────────────── */

#[derive(Debug, Deserialize)]
struct WireCohortResult {
    #[serde(default, rename = "cohortId", alias = "cohort_id")]
    cohort_id: String,
    #[serde(default, rename = "patientIds", alias = "patient_ids")]
    patient_ids: Option<Vec<String>>,
    #[serde(default)]
    count: Option<Value>,
    #[serde(default, rename = "queryTime", alias = "query_time")]
    query_time: Option<Value>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl WireCohortResult {
    fn into_result(self) -> ExecutionResult {
        let metadata = self.metadata.unwrap_or_default();

        let records: Vec<Record> = match metadata.get("records") {
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(|row| match row {
                    Value::Object(obj) => Some(obj.clone()),
                    other => {
                        debug!("skipping non-object record {other}");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let cache_hit = matches!(
            metadata.get("cacheHit").or_else(|| metadata.get("cache_hit")),
            Some(Value::Bool(true))
        );
        let tenant = metadata
            .get("tenant")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        let slice_count = match metadata.get("slices") {
            Some(Value::Array(slices)) => Some(slices.len()),
            _ => None,
        };

        let query_time = match self.query_time {
            Some(Value::Number(n)) => n.as_f64().map_or(QueryTime::Unknown, QueryTime::Nanos),
            Some(Value::String(s)) => QueryTime::Text(s),
            _ => QueryTime::Unknown,
        };

        let count = match self.count {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0),
            _ => 0,
        };

        ExecutionResult {
            cohort_id: self.cohort_id,
            patient_ids: self.patient_ids.unwrap_or_default(),
            count,
            query_time,
            records,
            cache_hit,
            tenant,
            slice_count,
        }
    }
}

/* ── background worker ──────────────────────────────────────────────────── */

#[derive(Debug)]
pub enum GatewayRequest {
    Verify { ticket: Ticket, dsl: String },
    Execute { ticket: Ticket, request: ExecuteRequest },
    Quit,
}

#[derive(Debug)]
pub enum GatewayResponse {
    Verified { ticket: Ticket, elapsed: Duration, result: Result<()> },
    Executed { ticket: Ticket, elapsed: Duration, result: Result<ExecutionResult> },
}

/// Spawn the worker thread. It owns a small tokio runtime and runs every
/// request as its own task, so a slow run does not hold up a verify.
pub fn start_gateway_worker(
    client: CohortClient,
) -> Result<(Sender<GatewayRequest>, Receiver<GatewayResponse>)> {
    let (req_tx, req_rx) = mpsc::channel::<GatewayRequest>();
    let (resp_tx, resp_rx) = mpsc::channel::<GatewayResponse>();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("cohort-gateway")
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("gateway-worker".into())
        .spawn(move || {
            loop {
                match req_rx.recv() {
                    Ok(GatewayRequest::Verify { ticket, dsl }) => {
                        let client = client.clone();
                        let tx = resp_tx.clone();
                        runtime.spawn(async move {
                            let started = Instant::now();
                            let result = client.verify(&dsl).await;
                            let _ = tx.send(GatewayResponse::Verified {
                                ticket,
                                elapsed: started.elapsed(),
                                result,
                            });
                        });
                    }
                    Ok(GatewayRequest::Execute { ticket, request }) => {
                        let client = client.clone();
                        let tx = resp_tx.clone();
                        runtime.spawn(async move {
                            let started = Instant::now();
                            let result = client.execute(&request).await;
                            let _ = tx.send(GatewayResponse::Executed {
                                ticket,
                                elapsed: started.elapsed(),
                                result,
                            });
                        });
                    }
                    Ok(GatewayRequest::Quit) | Err(_) => break,
                }
            }
            runtime.shutdown_background();
        })?;

    Ok((req_tx, resp_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: Value) -> ExecutionResult {
        serde_json::from_value::<WireCohortResult>(body).unwrap().into_result()
    }

    #[test]
    fn decodes_snake_case_gateway_body() {
        let res = decode(json!({
            "cohort_id": "cohort-20240101-120000.000",
            "patient_ids": ["p1", "p2"],
            "count": 2,
            "query_time": 12_345_678,
            "metadata": {
                "records": [{ "patient_id": "p1", "value": 140 }, 7],
                "cacheHit": true,
                "tenant": "acme",
                "slices": [{}, {}, {}]
            }
        }));
        assert_eq!(res.cohort_id, "cohort-20240101-120000.000");
        assert_eq!(res.patient_ids, vec!["p1", "p2"]);
        assert_eq!(res.count, 2);
        assert_eq!(res.query_time, QueryTime::Nanos(12_345_678.0));
        assert_eq!(res.records.len(), 1);
        assert!(res.cache_hit);
        assert_eq!(res.tenant.as_deref(), Some("acme"));
        assert_eq!(res.slice_count, Some(3));
    }

    #[test]
    fn decodes_camel_case_and_missing_metadata() {
        let res = decode(json!({
            "cohortId": "c9",
            "patientIds": [],
            "count": 0,
            "queryTime": "41ms"
        }));
        assert_eq!(res.cohort_id, "c9");
        assert!(res.records.is_empty());
        assert!(!res.cache_hit);
        assert_eq!(res.query_time, QueryTime::Text("41ms".into()));
        assert_eq!(res.slice_count, None);
    }

    #[test]
    fn records_that_are_not_an_array_mean_no_records() {
        let res = decode(json!({ "cohort_id": "c", "metadata": { "records": "oops" } }));
        assert!(res.records.is_empty());
    }

    #[test]
    fn error_bodies() {
        let plain = backend_error(StatusCode::BAD_REQUEST, "dsl is required\n");
        assert_eq!(plain.reason().as_deref(), Some("dsl is required"));

        let structured = backend_error(StatusCode::BAD_REQUEST, r#"{"error":"unknown field foo"}"#);
        assert_eq!(structured.reason().as_deref(), Some("unknown field foo"));

        let empty = backend_error(StatusCode::BAD_GATEWAY, "   ");
        assert!(matches!(empty, WorkbenchError::Backend { status: 502, message: None }));
    }
}
