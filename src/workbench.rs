//! The cohort workbench: draft, verification, execution, columns and paging
//! wired together the way the console uses them.
//!
//! Everything here is synchronous state. Network calls happen elsewhere;
//! callers take the request out of `request_verify` / `request_run`, send it,
//! and feed the answer back through `apply_verification` / `apply_execution`.

use crate::columns::{resolve_columns, ColumnList};
use crate::config::WorkbenchConfig;
use crate::csv_export::{copy_rows_tsv, export_csv, export_filename};
use crate::draft::{QueryDraft, RowLimitChange, DEFAULT_DSL};
use crate::error::{Result, WorkbenchError};
use crate::execution::{
    ExecuteRequest, ExecutionController, ExecutionResult, ExecutionStatus, Record, RunOutcome,
};
use crate::pagination::{PageRange, PageState};
use crate::sequencer::{Resolution, Ticket};
use crate::value_format::{format_count, format_query_time, MISSING_MARKER};
use crate::verification::{VerificationController, VerificationOutcome, VerifyRequest};

pub const EMPTY_AFTER_RUN: &str =
    "No records returned for this cohort. Adjust filters or expand the limit.";
pub const EMPTY_BEFORE_RUN: &str = "Run the cohort to preview records.";

const PATIENT_PREVIEW_SHOWN: usize = 3;

/// Metric strip shown above the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortSummary {
    pub cohort_id: String,
    pub cohort_size: String,
    pub unique_patients: String,
    pub query_time: String,
    pub cache_label: &'static str,
    /// First few ids, already joined, or the missing marker.
    pub patient_preview: String,
    pub caption: String,
}

impl CohortSummary {
    pub fn from_result(result: &ExecutionResult) -> Self {
        let preview: Vec<&str> = result
            .patient_ids
            .iter()
            .take(PATIENT_PREVIEW_SHOWN)
            .map(String::as_str)
            .collect();

        let caption = match (result.slice_count.filter(|n| *n > 0), result.tenant.as_deref()) {
            (Some(n), _) => format!("{n} slices analysed"),
            (None, Some(tenant)) => format!("Tenant • {tenant}"),
            (None, None) => "Live sample".to_owned(),
        };

        Self {
            cohort_id: result.cohort_id.clone(),
            cohort_size: format_count(result.count),
            unique_patients: format_count(result.patient_ids.len() as u64),
            query_time: format_query_time(&result.query_time),
            cache_label: if result.cache_hit { "Served from cache" } else { "Live execution" },
            patient_preview: if preview.is_empty() {
                MISSING_MARKER.to_owned()
            } else {
                preview.join(", ")
            },
            caption,
        }
    }
}

#[derive(Debug)]
pub struct Workbench {
    draft: QueryDraft,
    verification: VerificationController,
    execution: ExecutionController,
    pages: PageState,
    columns: ColumnList,
}

impl Default for Workbench {
    fn default() -> Self {
        Self::new(&WorkbenchConfig::default())
    }
}

impl Workbench {
    pub fn new(defaults: &WorkbenchConfig) -> Self {
        let draft = QueryDraft::new(DEFAULT_DSL, defaults.row_limit, defaults.fields.iter().cloned());
        let columns = draft.selected_fields().to_vec();
        Self {
            draft,
            verification: VerificationController::new(),
            execution: ExecutionController::new(),
            pages: PageState::new(defaults.page_size),
            columns,
        }
    }

    /* ── draft ──────────────────────────────────────────────────────────── */

    pub fn draft(&self) -> &QueryDraft {
        &self.draft
    }

    /// Any edit to the text invalidates the current verdict and anything in flight.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let changed = self.draft.set_text(text);
        if changed {
            self.verification.rearm();
        }
        changed
    }

    pub fn load_template(&mut self, text: &str) -> bool {
        let changed = self.draft.load_template(text);
        if changed {
            self.verification.rearm();
        }
        changed
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.set_description(description);
    }

    pub fn set_row_limit_input(&mut self, input: &str) -> Result<RowLimitChange> {
        self.draft.set_row_limit_input(input)
    }

    /// Columns follow the selection immediately, even before the next run.
    pub fn toggle_field(&mut self, key: &str) -> bool {
        let selected = self.draft.toggle_field(key);
        self.refresh_columns();
        selected
    }

    /* ── verification ───────────────────────────────────────────────────── */

    pub fn request_verify(&mut self) -> VerifyRequest {
        self.verification.begin(self.draft.text())
    }

    pub fn apply_verification(
        &mut self,
        ticket: Ticket,
        result: std::result::Result<(), WorkbenchError>,
    ) -> Resolution {
        self.verification.resolve(ticket, result)
    }

    pub fn verification(&self) -> VerificationOutcome {
        self.verification.outcome()
    }

    /* ── execution ──────────────────────────────────────────────────────── */

    /// Runs never wait for, or depend on, verification.
    pub fn request_run(&mut self) -> (Ticket, ExecuteRequest) {
        self.execution.begin(&self.draft)
    }

    pub fn apply_execution(
        &mut self,
        ticket: Ticket,
        result: std::result::Result<ExecutionResult, WorkbenchError>,
    ) -> RunOutcome {
        let outcome = self.execution.resolve(ticket, result);
        if outcome == RunOutcome::Replaced {
            self.pages.reset();
            self.refresh_columns();
        }
        outcome
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        self.execution.status()
    }

    pub fn is_running(&self) -> bool {
        self.execution.is_running()
    }

    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.execution.last_result()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.execution.last_error()
    }

    pub fn summary(&self) -> Option<CohortSummary> {
        self.last_result().map(CohortSummary::from_result)
    }

    /* ── result set ─────────────────────────────────────────────────────── */

    pub fn records(&self) -> &[Record] {
        self.last_result().map(|r| r.records.as_slice()).unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.records().len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn refresh_columns(&mut self) {
        let records = self.execution.last_result().map(|r| r.records.as_slice()).unwrap_or(&[]);
        self.columns = resolve_columns(self.draft.selected_fields(), records);
    }

    /// `None` while there are rows to show.
    pub fn empty_state_message(&self) -> Option<&'static str> {
        if self.total_records() > 0 {
            return None;
        }
        Some(match self.execution_status() {
            ExecutionStatus::Succeeded => EMPTY_AFTER_RUN,
            _ => EMPTY_BEFORE_RUN,
        })
    }

    /* ── paging ─────────────────────────────────────────────────────────── */

    pub fn pages(&self) -> &PageState {
        &self.pages
    }

    pub fn visible_records(&self) -> &[Record] {
        self.pages.visible(self.records())
    }

    /// 1-based index of the first visible row, for the grid's `#` column.
    pub fn first_visible_row(&self) -> usize {
        self.page_range().start.max(1)
    }

    pub fn page_range(&self) -> PageRange {
        self.pages.range(self.total_records())
    }

    pub fn prev_page(&mut self) {
        let total = self.total_records();
        self.pages.prev_page(total);
    }

    pub fn next_page(&mut self) {
        let total = self.total_records();
        self.pages.next_page(total);
    }

    pub fn go_to_page(&mut self, page_index: usize) {
        self.pages.go_to(page_index);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.pages.set_page_size(page_size);
    }

    pub fn cycle_page_size(&mut self) -> usize {
        self.pages.cycle_page_size()
    }

    /* ── export ─────────────────────────────────────────────────────────── */

    pub fn can_export(&self) -> bool {
        self.total_records() > 0
    }

    /// The whole result set, not just the visible page.
    pub fn export_csv(&self) -> Option<String> {
        export_csv(&self.columns, self.records())
    }

    pub fn export_filename(&self, millis: i64, extension: &str) -> String {
        let cohort_id = self
            .last_result()
            .map(|r| r.cohort_id.as_str())
            .filter(|id| !id.is_empty());
        export_filename(cohort_id, millis, extension)
    }

    pub fn copy_visible_tsv(&self) -> Option<String> {
        let rows = self.visible_records();
        (!rows.is_empty()).then(|| copy_rows_tsv(&self.columns, rows))
    }
}
