use cohort_workbench::config::WorkbenchConfig;
use cohort_workbench::csv_export::escape_csv;
use cohort_workbench::execution::{ExecutionResult, ExecutionStatus, QueryTime, RunOutcome};
use cohort_workbench::verification::VerificationOutcome;
use cohort_workbench::workbench::{EMPTY_AFTER_RUN, EMPTY_BEFORE_RUN};
use cohort_workbench::{Workbench, WorkbenchError};
use serde_json::{json, Value};

fn workbench(fields: &[&str], page_size: usize) -> Workbench {
    Workbench::new(&WorkbenchConfig {
        row_limit: 200,
        page_size,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        export_dir: None,
    })
}

fn result(cohort_id: &str, records: Vec<Value>) -> ExecutionResult {
    ExecutionResult {
        cohort_id: cohort_id.into(),
        patient_ids: vec!["p1".into(), "p2".into()],
        count: records.len() as u64,
        query_time: QueryTime::Nanos(2_500_000.0),
        records: records
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect(),
        cache_hit: false,
        tenant: None,
        slice_count: None,
    }
}

fn run_with(wb: &mut Workbench, cohort_id: &str, records: Vec<Value>) {
    let (ticket, _) = wb.request_run();
    assert_eq!(wb.apply_execution(ticket, Ok(result(cohort_id, records))), RunOutcome::Replaced);
}

#[test]
fn scenario_a_extra_keys_follow_selected_fields() {
    let mut wb = workbench(&["patient_id", "value"], 25);
    run_with(
        &mut wb,
        "bp",
        vec![
            json!({ "patient_id": "p1", "value": 140 }),
            json!({ "patient_id": "p2", "value": 150, "unit": "mmHg" }),
        ],
    );
    assert_eq!(wb.columns(), ["patient_id", "value", "unit"]);
}

#[test]
fn scenario_b_page_index_clamps_to_last_page() {
    let mut wb = workbench(&["n"], 25);
    run_with(&mut wb, "sixty", (0..60).map(|n| json!({ "n": n })).collect());

    assert_eq!(wb.pages().page_count(wb.total_records()), 3);
    wb.go_to_page(5);
    assert_eq!(wb.pages().effective_index(wb.total_records()), 2);
    assert_eq!(wb.visible_records().len(), 10);
    assert_eq!(wb.page_range().to_string(), "51–60 of 60");

    // stepping back starts from the clamped page, not the raw one
    wb.prev_page();
    assert_eq!(wb.pages().effective_index(wb.total_records()), 1);
}

#[test]
fn scenario_c_empty_result_disables_export() {
    let mut wb = workbench(&["patient_id"], 25);
    assert_eq!(wb.empty_state_message(), Some(EMPTY_BEFORE_RUN));

    run_with(&mut wb, "none", vec![]);
    assert_eq!(wb.pages().page_count(wb.total_records()), 1);
    assert!(!wb.can_export());
    assert_eq!(wb.export_csv(), None);
    assert_eq!(wb.copy_visible_tsv(), None);
    assert_eq!(wb.empty_state_message(), Some(EMPTY_AFTER_RUN));
    assert_eq!(wb.page_range().to_string(), "0 of 0");
}

#[test]
fn scenario_d_quotes_and_commas_are_escaped() {
    assert_eq!(escape_csv("a,b"), "\"a,b\"");
    assert_eq!(escape_csv("x\"y"), "\"x\"\"y\"");
    assert_eq!(escape_csv("\"x\"\"y\""), "\"\"\"x\"\"\"\"y\"\"\"");

    let mut wb = workbench(&["note"], 25);
    run_with(&mut wb, "notes", vec![json!({ "note": "a,b" }), json!({ "note": null })]);
    assert_eq!(wb.export_csv().as_deref(), Some("note\r\n\"a,b\"\r\n\r\n"));
}

#[test]
fn scenario_e_latest_issued_run_wins_regardless_of_arrival() {
    let mut wb = workbench(&["patient_id"], 25);
    let (first, _) = wb.request_run();
    let (second, _) = wb.request_run();

    let outcome = wb.apply_execution(second, Ok(result("second", vec![json!({ "patient_id": "b" })])));
    assert_eq!(outcome, RunOutcome::Replaced);

    let late = wb.apply_execution(first, Ok(result("first", vec![json!({ "patient_id": "a" })])));
    assert_eq!(late, RunOutcome::Stale);
    assert_eq!(wb.last_result().map(|r| r.cohort_id.as_str()), Some("second"));
    assert_eq!(wb.execution_status(), ExecutionStatus::Succeeded);
}

#[test]
fn failed_run_keeps_previous_result_exportable() {
    let mut wb = workbench(&["patient_id"], 25);
    run_with(&mut wb, "good", vec![json!({ "patient_id": "p1" })]);

    let (ticket, _) = wb.request_run();
    assert!(wb.is_running());
    let err = WorkbenchError::Backend { status: 500, message: None };
    assert_eq!(wb.apply_execution(ticket, Err(err)), RunOutcome::Failed);

    assert!(matches!(wb.execution_status(), ExecutionStatus::Failed { .. }));
    assert!(wb.last_error().is_some());
    assert!(wb.can_export());
    assert_eq!(wb.last_result().map(|r| r.cohort_id.as_str()), Some("good"));
}

#[test]
fn editing_text_discards_an_inflight_verification() {
    let mut wb = workbench(&["patient_id"], 25);
    let request = wb.request_verify();
    assert_eq!(wb.verification(), VerificationOutcome::Pending);

    assert!(wb.set_text("select patient_id from lakehouse.observations"));
    assert_eq!(wb.verification(), VerificationOutcome::Idle);

    wb.apply_verification(request.ticket, Ok(()));
    assert_eq!(wb.verification(), VerificationOutcome::Idle);
}

#[test]
fn run_does_not_wait_for_verification() {
    let mut wb = workbench(&["patient_id"], 25);
    let verify = wb.request_verify();
    let (ticket, request) = wb.request_run();
    assert_eq!(request.dsl, verify.dsl);
    assert_eq!(request.limit, 200);

    let rejected = WorkbenchError::Backend { status: 400, message: Some("dsl is required".into()) };
    wb.apply_verification(verify.ticket, Err(rejected));
    assert_eq!(
        wb.verification(),
        VerificationOutcome::Invalid { reason: "dsl is required".into() }
    );

    wb.apply_execution(ticket, Ok(result("ran", vec![json!({ "patient_id": "p1" })])));
    assert_eq!(wb.total_records(), 1);
}

#[test]
fn new_result_resets_to_first_page() {
    let mut wb = workbench(&["n"], 10);
    run_with(&mut wb, "a", (0..30).map(|n| json!({ "n": n })).collect());
    wb.next_page();
    wb.next_page();
    assert_eq!(wb.first_visible_row(), 21);

    run_with(&mut wb, "b", (0..30).map(|n| json!({ "n": n })).collect());
    assert_eq!(wb.first_visible_row(), 1);
}

#[test]
fn summary_reflects_result_metadata() {
    let mut wb = workbench(&["patient_id"], 25);
    let (ticket, _) = wb.request_run();
    let mut res = result("Cohort A", vec![json!({ "patient_id": "p1" })]);
    res.count = 12_345;
    res.cache_hit = true;
    res.tenant = Some("north".into());
    res.slice_count = Some(0);
    wb.apply_execution(ticket, Ok(res));

    let summary = wb.summary().expect("summary after a run");
    assert_eq!(summary.cohort_size, "12,345");
    assert_eq!(summary.unique_patients, "2");
    assert_eq!(summary.cache_label, "Served from cache");
    assert_eq!(summary.patient_preview, "p1, p2");
    assert_eq!(summary.caption, "Tenant • north");
    assert_eq!(summary.query_time, "2.5 ms");
}
