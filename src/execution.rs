//! Execution controller: issues cohort runs and keeps the last good result.

use log::{debug, info, warn};
use serde::Serialize;

use crate::draft::QueryDraft;
use crate::error::WorkbenchError;
use crate::sequencer::{RequestSequencer, Resolution, Ticket};

pub const RUN_FALLBACK_REASON: &str = "Cohort run failed";

/// One preview row: column name → JSON value, in the backend's key order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Backend-reported duration: nanoseconds, or a string it already formatted.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTime {
    Nanos(f64),
    Text(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub cohort_id: String,
    /// Treated as "unique patients" as-is; uniqueness is the backend's promise.
    pub patient_ids: Vec<String>,
    /// Authoritative cohort size, may exceed `records.len()`.
    pub count: u64,
    pub query_time: QueryTime,
    pub records: Vec<Record>,
    pub cache_hit: bool,
    pub tenant: Option<String>,
    pub slice_count: Option<usize>,
}

/// Body of `POST /cohort/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteRequest {
    pub dsl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub limit: u32,
    /// Omitted entirely when empty: the backend reads that as its default projection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl ExecuteRequest {
    pub fn from_draft(draft: &QueryDraft) -> Self {
        let fields = draft.selected_fields();
        Self {
            dsl: draft.text().to_owned(),
            description: draft.description().map(str::to_owned),
            limit: draft.row_limit(),
            fields: (!fields.is_empty()).then(|| fields.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Idle,
    Running,
    Succeeded,
    Failed { message: String },
}

/// What a resolved run did to controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// New result set installed; pagination must go back to page one.
    Replaced,
    /// Error surfaced, previous result (if any) kept.
    Failed,
    /// Superseded by a newer run; nothing changed.
    Stale,
}

#[derive(Debug, Default)]
pub struct ExecutionController {
    settled: Option<ExecutionStatus>,
    last_result: Option<ExecutionResult>,
    sequencer: RequestSequencer,
}

impl ExecutionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.sequencer.has_pending() {
            return ExecutionStatus::Running;
        }
        self.settled.clone().unwrap_or(ExecutionStatus::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.sequencer.has_pending()
    }

    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }

    /// Message of the most recent applied failure, if the last outcome failed.
    pub fn last_error(&self) -> Option<&str> {
        match &self.settled {
            Some(ExecutionStatus::Failed { message }) => Some(message),
            _ => None,
        }
    }

    pub fn begin(&mut self, draft: &QueryDraft) -> (Ticket, ExecuteRequest) {
        let ticket = self.sequencer.issue();
        let request = ExecuteRequest::from_draft(draft);
        debug!(
            "run #{ticket} issued (limit {}, {} field(s))",
            request.limit,
            request.fields.as_ref().map_or(0, Vec::len)
        );
        (ticket, request)
    }

    pub fn resolve(
        &mut self,
        ticket: Ticket,
        result: Result<ExecutionResult, WorkbenchError>,
    ) -> RunOutcome {
        if self.sequencer.accept(ticket) == Resolution::Stale {
            warn!("run #{ticket} resolved after a newer run; discarded");
            return RunOutcome::Stale;
        }
        match result {
            Ok(res) => {
                info!(
                    "run #{ticket}: cohort {} with {} record(s), count {}{}",
                    res.cohort_id,
                    res.records.len(),
                    res.count,
                    if res.cache_hit { " (cache)" } else { "" }
                );
                self.last_result = Some(res);
                self.settled = Some(ExecutionStatus::Succeeded);
                RunOutcome::Replaced
            }
            Err(err) => {
                let message = err
                    .reason()
                    .unwrap_or_else(|| RUN_FALLBACK_REASON.to_owned());
                warn!("run #{ticket} failed: {err}");
                self.settled = Some(ExecutionStatus::Failed { message });
                RunOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, rows: usize) -> ExecutionResult {
        ExecutionResult {
            cohort_id: id.into(),
            patient_ids: (0..rows).map(|i| format!("p{i}")).collect(),
            count: rows as u64,
            query_time: QueryTime::Nanos(1_500_000.0),
            records: (0..rows)
                .map(|i| {
                    let mut r = Record::new();
                    r.insert("patient_id".into(), json!(format!("p{i}")));
                    r
                })
                .collect(),
            cache_hit: false,
            tenant: None,
            slice_count: None,
        }
    }

    #[test]
    fn request_omits_empty_fields_and_description() {
        let draft = QueryDraft::new("select patient_id", 50, Vec::<String>::new());
        let req = ExecuteRequest::from_draft(&draft);
        assert_eq!(req.fields, None);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body, json!({ "dsl": "select patient_id", "limit": 50 }));
    }

    #[test]
    fn request_carries_fields_in_selection_order() {
        let mut draft = QueryDraft::new("select x", 10, ["value", "patient_id"]);
        draft.set_description("bp cohort");
        let body = serde_json::to_value(ExecuteRequest::from_draft(&draft)).unwrap();
        assert_eq!(
            body,
            json!({
                "dsl": "select x",
                "description": "bp cohort",
                "limit": 10,
                "fields": ["value", "patient_id"]
            })
        );
    }

    #[test]
    fn lifecycle_idle_running_succeeded() {
        let mut ec = ExecutionController::new();
        assert_eq!(ec.status(), ExecutionStatus::Idle);
        let (t, _) = ec.begin(&QueryDraft::default());
        assert_eq!(ec.status(), ExecutionStatus::Running);
        assert_eq!(ec.resolve(t, Ok(result("c1", 3))), RunOutcome::Replaced);
        assert_eq!(ec.status(), ExecutionStatus::Succeeded);
        assert_eq!(ec.last_result().unwrap().cohort_id, "c1");
    }

    #[test]
    fn failure_keeps_previous_result() {
        let mut ec = ExecutionController::new();
        let (t, _) = ec.begin(&QueryDraft::default());
        ec.resolve(t, Ok(result("c1", 2)));

        let (t, _) = ec.begin(&QueryDraft::default());
        let outcome = ec.resolve(
            t,
            Err(WorkbenchError::Backend { status: 400, message: Some("dsl is required".into()) }),
        );
        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(
            ec.status(),
            ExecutionStatus::Failed { message: "dsl is required".into() }
        );
        assert_eq!(ec.last_error(), Some("dsl is required"));
        assert_eq!(ec.last_result().unwrap().cohort_id, "c1");
    }

    #[test]
    fn empty_failure_uses_fallback() {
        let mut ec = ExecutionController::new();
        let (t, _) = ec.begin(&QueryDraft::default());
        ec.resolve(t, Err(WorkbenchError::Backend { status: 503, message: None }));
        assert_eq!(ec.last_error(), Some(RUN_FALLBACK_REASON));
    }

    #[test]
    fn late_older_run_is_discarded() {
        let mut ec = ExecutionController::new();
        let (first, _) = ec.begin(&QueryDraft::default());
        let (second, _) = ec.begin(&QueryDraft::default());

        assert_eq!(ec.resolve(second, Ok(result("second", 1))), RunOutcome::Replaced);
        assert_eq!(ec.resolve(first, Ok(result("first", 4))), RunOutcome::Stale);
        assert_eq!(ec.last_result().unwrap().cohort_id, "second");
        assert_eq!(ec.status(), ExecutionStatus::Succeeded);
    }
}
