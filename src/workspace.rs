use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::Result;
use copypasta::{ClipboardContext, ClipboardProvider};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::debug;
use tui::layout::{Constraint, Direction, Layout};
use tui::text::{Span, Spans};
use tui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use tui::{backend::Backend, layout::Rect, Frame, Terminal};

use cohort_workbench::config::Config;
use cohort_workbench::downloads_folder::save_export_to_downloads;
use cohort_workbench::draft::RowLimitChange;
use cohort_workbench::error::WorkbenchError;
use cohort_workbench::execution::{ExecutionStatus, RunOutcome};
use cohort_workbench::gateway::{CohortClient, GatewayRequest, GatewayResponse, start_gateway_worker};
use cohort_workbench::sequencer::Resolution;
use cohort_workbench::templates::{field_label, template_catalog, CohortTemplate, AVAILABLE_FIELDS};
use cohort_workbench::verification::VerificationOutcome;
use cohort_workbench::workbench::{CohortSummary, Workbench};

use crate::editor::{Editor, LineInput, GUTTER_WIDTH};
use crate::palette::STYLE;
use crate::results::{GridAction, GridView, Results};

const STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Focus {
    Editor,
    Description,
    RowLimit,
    Fields,
    Results,
}

impl Focus {
    const ORDER: [Focus; 5] = [
        Focus::Editor,
        Focus::Description,
        Focus::RowLimit,
        Focus::Fields,
        Focus::Results,
    ];

    fn step(self, forward: bool) -> Focus {
        let i = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        let n = Self::ORDER.len();
        Self::ORDER[if forward { (i + 1) % n } else { (i + n - 1) % n }]
    }
}

pub struct Workspace {
    pub workbench: Workbench,
    pub editor: Editor,
    pub description: LineInput,
    pub row_limit: LineInput,
    pub results: Results,
    pub focus: Focus,
    field_cursor: usize,
    templates: Vec<CohortTemplate>,
    template_idx: Option<usize>,
    export_dir: Option<PathBuf>,

    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,
    pub show_help: bool,
    last_esc_down: bool,

    gateway_tx: Sender<GatewayRequest>,
    gateway_rx: Receiver<GatewayResponse>,
    gateway_url: String,
    run_started: Option<Instant>,
    last_run_elapsed: Option<Duration>,
    clipboard: Option<ClipboardContext>,
}

impl Workspace {
    pub fn new(config: &Config, client: CohortClient) -> Result<Self> {
        let gateway_url = client.base_url().to_owned();
        let (gateway_tx, gateway_rx) = start_gateway_worker(client)?;
        let workbench = Workbench::new(&config.workbench);

        let mut editor = Editor::new();
        editor.set_text(workbench.draft().text());

        Ok(Self {
            row_limit: LineInput::new(workbench.draft().row_limit().to_string()),
            description: LineInput::default(),
            workbench,
            editor,
            results: Results::new(),
            focus: Focus::Editor,
            field_cursor: 0,
            templates: template_catalog(&config.templates),
            template_idx: None,
            export_dir: config.workbench.export_dir.clone(),
            status_message: None,
            status_message_time: None,
            show_help: false,
            last_esc_down: false,
            gateway_tx,
            gateway_rx,
            gateway_url,
            run_started: None,
            last_run_elapsed: None,
            clipboard: None,
        })
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Replace the draft text wholesale (file preload, template).
    pub fn load_text(&mut self, text: &str) {
        self.editor.set_text(text);
        self.workbench.load_template(&self.editor.buffer);
    }

    pub fn handle_paste(&mut self, pasted: &str) {
        match self.focus {
            Focus::Editor => {
                self.editor.handle_paste(pasted);
                self.workbench.set_text(self.editor.buffer.clone());
            }
            Focus::Description => {
                let flat = pasted.replace(['\r', '\n'], " ");
                self.description.set(format!("{}{}", self.description.text, flat));
                self.workbench.set_description(self.description.text.clone());
            }
            Focus::RowLimit => {
                self.row_limit.set(format!("{}{}", self.row_limit.text, pasted.trim()));
            }
            Focus::Fields | Focus::Results => {}
        }
    }

    /* ── focus ─────────────────────────────────────────────────────────── */

    fn switch_focus(&mut self, forward: bool) {
        if self.focus == Focus::RowLimit {
            self.commit_row_limit();
        }
        self.focus = self.focus.step(forward);
        self.editor.focus = self.focus == Focus::Editor;
        self.description.focus = self.focus == Focus::Description;
        self.row_limit.focus = self.focus == Focus::RowLimit;
        self.results.focus = self.focus == Focus::Results;
    }

    /// Push the typed row limit into the draft, or restore the last good one.
    fn commit_row_limit(&mut self) {
        match self.workbench.set_row_limit_input(&self.row_limit.text) {
            Ok(RowLimitChange::Accepted(_)) => {}
            Ok(RowLimitChange::Clamped { requested, applied }) => {
                self.set_status(format!("Row limit {requested} clamped to {applied}"));
            }
            Err(e) => self.set_status(e.to_string()),
        }
        self.row_limit.set(self.workbench.draft().row_limit().to_string());
    }

    /* ── requests ──────────────────────────────────────────────────────── */

    pub fn start_run(&mut self) {
        if self.focus == Focus::RowLimit {
            self.commit_row_limit();
        }
        let (ticket, request) = self.workbench.request_run();
        if self.gateway_tx.send(GatewayRequest::Execute { ticket, request }).is_err() {
            self.workbench.apply_execution(ticket, Err(worker_gone()));
            self.set_status("Gateway worker stopped; restart the workbench");
            return;
        }
        self.run_started = Some(Instant::now());
    }

    pub fn start_verify(&mut self) {
        let request = self.workbench.request_verify();
        let ticket = request.ticket;
        if self.gateway_tx.send(GatewayRequest::Verify { ticket, dsl: request.dsl }).is_err() {
            self.workbench.apply_verification(ticket, Err(worker_gone()));
        }
    }

    /// Call this from the main loop every frame.
    pub fn poll_gateway(&mut self) -> bool {
        let mut changed = false;
        while let Ok(msg) = self.gateway_rx.try_recv() {
            changed = true;
            match msg {
                GatewayResponse::Verified { ticket, elapsed, result } => {
                    if self.workbench.apply_verification(ticket, result) == Resolution::Stale {
                        debug!("dropped verify #{ticket} after {elapsed:?}");
                    }
                }
                GatewayResponse::Executed { ticket, elapsed, result } => {
                    match self.workbench.apply_execution(ticket, result) {
                        RunOutcome::Replaced => {
                            self.results.reset();
                            self.last_run_elapsed = Some(elapsed);
                            if let Some(res) = self.workbench.last_result() {
                                let msg = format!(
                                    "Cohort {} ready: {} preview record(s) in {:.2}s",
                                    res.cohort_id,
                                    res.records.len(),
                                    elapsed.as_secs_f64()
                                );
                                self.set_status(msg);
                            }
                        }
                        RunOutcome::Failed => {
                            self.last_run_elapsed = Some(elapsed);
                        }
                        RunOutcome::Stale => {
                            debug!("dropped run #{ticket} after {elapsed:?}");
                        }
                    }
                    if !self.workbench.is_running() {
                        self.run_started = None;
                    }
                }
            }
        }
        changed
    }

    pub fn shutdown(&self) {
        let _ = self.gateway_tx.send(GatewayRequest::Quit);
    }

    /* ── actions ───────────────────────────────────────────────────────── */

    fn next_template(&mut self) {
        if self.templates.is_empty() {
            return;
        }
        let idx = self.template_idx.map_or(0, |i| (i + 1) % self.templates.len());
        self.template_idx = Some(idx);
        let CohortTemplate { label, dsl } = self.templates[idx].clone();
        self.load_text(&dsl);
        self.set_status(format!("Loaded template: {label}"));
    }

    fn toggle_field_at_cursor(&mut self) {
        let (key, label) = AVAILABLE_FIELDS[self.field_cursor];
        let selected = self.workbench.toggle_field(key);
        self.set_status(format!("{label} {}", if selected { "added" } else { "removed" }));
    }

    fn cycle_page_size(&mut self) {
        let size = self.workbench.cycle_page_size();
        self.results.reset_cursor();
        self.set_status(format!("Page size: {size}"));
    }

    pub fn export_csv_to_downloads(&mut self) {
        let Some(csv) = self.workbench.export_csv() else {
            self.set_status("Nothing to export: the result set is empty.");
            return;
        };
        let filename = self
            .workbench
            .export_filename(chrono::Utc::now().timestamp_millis(), "csv");
        match save_export_to_downloads(self.export_dir.as_deref(), &filename, &csv) {
            Ok(path) => self.set_status(format!("CSV exported to: {}", path.display())),
            Err(err) => self.set_status(format!("Error saving CSV: {err}")),
        }
    }

    fn copy_page(&mut self) {
        let Some(tsv) = self.workbench.copy_visible_tsv() else {
            self.set_status("Nothing to copy");
            return;
        };
        if self.clipboard.is_none() {
            self.clipboard = ClipboardContext::new().ok();
        }
        let rows = self.workbench.visible_records().len();
        let result = match self.clipboard.as_mut() {
            Some(cb) => cb.set_contents(tsv).map_err(|e| e.to_string()),
            None => Err("clipboard unavailable".to_owned()),
        };
        match result {
            Ok(()) => self.set_status(format!("Copied {rows} row(s) to clipboard")),
            Err(e) => self.set_status(format!("Copy failed: {e}")),
        }
    }

    /* ── keys ──────────────────────────────────────────────────────────── */

    /// Returns `Ok(true)` when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
            return Ok(true);
        }

        if key.kind == KeyEventKind::Press && key.code == KeyCode::F(1) {
            self.show_help = !self.show_help;
            return Ok(false);
        }
        if self.show_help {
            return Ok(false);
        }

        // ── ESC ───────────────────────────────────────────────
        if key.code == KeyCode::Esc {
            match key.kind {
                KeyEventKind::Press if !self.last_esc_down => {
                    self.switch_focus(true);
                    self.last_esc_down = true;
                }
                KeyEventKind::Release => self.last_esc_down = false,
                _ => {}
            }
            return Ok(false);
        }

        if key.kind != KeyEventKind::Press {
            return Ok(false);
        }

        match key.code {
            KeyCode::Enter if ctrl => {
                self.start_run();
                return Ok(false);
            }
            KeyCode::F(5) => {
                self.start_run();
                return Ok(false);
            }
            KeyCode::F(6) => {
                self.start_verify();
                return Ok(false);
            }
            KeyCode::F(7) => {
                self.next_template();
                return Ok(false);
            }
            KeyCode::F(8) => {
                self.cycle_page_size();
                return Ok(false);
            }
            KeyCode::F(9) => {
                self.export_csv_to_downloads();
                return Ok(false);
            }
            KeyCode::Tab => {
                self.switch_focus(true);
                return Ok(false);
            }
            KeyCode::BackTab => {
                self.switch_focus(false);
                return Ok(false);
            }
            KeyCode::PageUp => {
                self.workbench.prev_page();
                self.results.reset_cursor();
                return Ok(false);
            }
            KeyCode::PageDown => {
                self.workbench.next_page();
                self.results.reset_cursor();
                return Ok(false);
            }
            _ => {}
        }

        // Pass key to focused pane
        match self.focus {
            Focus::Editor => {
                if self.editor.handle_key(key) {
                    self.workbench.set_text(self.editor.buffer.clone());
                }
            }
            Focus::Description => {
                if self.description.handle_key(key) {
                    self.workbench.set_description(self.description.text.clone());
                }
            }
            Focus::RowLimit => {
                if key.code == KeyCode::Enter {
                    self.commit_row_limit();
                } else {
                    self.row_limit.handle_key(key);
                }
            }
            Focus::Fields => match key.code {
                KeyCode::Left => {
                    self.field_cursor = self.field_cursor.checked_sub(1).unwrap_or(AVAILABLE_FIELDS.len() - 1);
                }
                KeyCode::Right => {
                    self.field_cursor = (self.field_cursor + 1) % AVAILABLE_FIELDS.len();
                }
                KeyCode::Char(' ') | KeyCode::Enter => self.toggle_field_at_cursor(),
                _ => {}
            },
            Focus::Results => {
                let visible = self.workbench.visible_records().len();
                let columns = self.workbench.columns().len();
                match self.results.handle_key(key, visible, columns) {
                    GridAction::PrevPage => {
                        self.workbench.prev_page();
                        self.results.reset_cursor();
                    }
                    GridAction::NextPage => {
                        self.workbench.next_page();
                        self.results.reset_cursor();
                    }
                    GridAction::CopyPage => self.copy_page(),
                    GridAction::None => {}
                }
            }
        }
        Ok(false)
    }

    pub fn update(&mut self) {
        if let Some(t) = self.status_message_time {
            if t.elapsed() > STATUS_TTL {
                self.status_message = None;
                self.status_message_time = None;
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.workbench.is_running() || self.workbench.verification() == VerificationOutcome::Pending
    }

    /* ── drawing ───────────────────────────────────────────────────────── */

    pub fn render<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        terminal.draw(|f| {
            let size = f.size();
            if size.height < 16 || size.width < 40 {
                let p = Paragraph::new("Window too small for the workbench").style(STYLE::status_fg());
                f.render_widget(p, size);
                return;
            }
            f.render_widget(Block::default().style(STYLE::default_bg()), size);

            if self.show_help {
                render_help(f, size);
                return;
            }

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Percentage(35), // editor
                    Constraint::Length(3),      // description / limit / verification
                    Constraint::Length(3),      // field toggles
                    Constraint::Length(3),      // metrics
                    Constraint::Min(5),         // grid
                    Constraint::Length(1),      // status bar
                ])
                .split(size);

            /* ── editor ───────────────────────────────────────────── */
            self.editor.set_viewport_size(
                chunks[0].height.saturating_sub(2) as usize,
                chunks[0].width.saturating_sub(GUTTER_WIDTH + 2) as usize,
            );
            let template_title = match self.template_idx.and_then(|i| self.templates.get(i)) {
                Some(t) => format!(" Cohort DSL • {} ", t.label),
                None => " Cohort DSL ".to_owned(),
            };
            self.editor.render(f, chunks[0], &template_title);

            /* ── inputs row ───────────────────────────────────────── */
            let inputs = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(55),
                    Constraint::Percentage(15),
                    Constraint::Percentage(30),
                ])
                .split(chunks[1]);
            self.description.render(f, inputs[0], " Description ", "Optional note sent with the run");
            self.row_limit.render(f, inputs[1], " Row limit ", "200");
            render_verification(f, inputs[2], &self.workbench.verification());

            /* ── fields / metrics ─────────────────────────────────── */
            render_fields(
                f,
                chunks[2],
                &self.workbench,
                self.focus == Focus::Fields,
                self.field_cursor,
            );
            render_summary(f, chunks[3], self.workbench.summary().as_ref());

            /* ── grid ─────────────────────────────────────────────── */
            let total = self.workbench.total_records();
            let pages = self.workbench.pages();
            let view = GridView {
                columns: self.workbench.columns(),
                rows: self.workbench.visible_records(),
                first_row: self.workbench.first_visible_row(),
                range: self.workbench.page_range(),
                page: pages.effective_index(total),
                page_count: pages.page_count(total),
                page_size: pages.page_size(),
                empty_message: self.workbench.empty_state_message(),
            };
            self.results.render(f, chunks[4], &view);

            /* ── status bar ───────────────────────────────────────── */
            let run_span = match self.workbench.execution_status() {
                ExecutionStatus::Idle => Span::styled("[Idle]", STYLE::muted()),
                ExecutionStatus::Running => {
                    let secs = self.run_started.map_or(0.0, |t| t.elapsed().as_secs_f64());
                    Span::styled(format!("[Running {secs:.1}s]"), STYLE::info_fg())
                }
                ExecutionStatus::Succeeded => {
                    let secs = self.last_run_elapsed.map_or(0.0, |d| d.as_secs_f64());
                    Span::styled(format!("[Succeeded {secs:.2}s]"), STYLE::ok_fg())
                }
                ExecutionStatus::Failed { message } => {
                    Span::styled(format!("[Failed: {message}]"), STYLE::error_fg())
                }
            };
            let tail = match &self.status_message {
                Some(m) => m.clone(),
                None => format!("{} | Press F1 for help", self.gateway_url),
            };
            let bar = Paragraph::new(Spans::from(vec![run_span, Span::raw(" | "), Span::raw(tail)]))
                .style(STYLE::status_fg());
            f.render_widget(bar, chunks[5]);
        })?;
        Ok(())
    }
}

fn worker_gone() -> WorkbenchError {
    WorkbenchError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gateway worker stopped"))
}

fn render_verification<B: Backend>(f: &mut Frame<B>, area: Rect, outcome: &VerificationOutcome) {
    let span = match outcome {
        VerificationOutcome::Idle => Span::styled("◌ Not verified (F6)", STYLE::muted()),
        VerificationOutcome::Pending => Span::styled("… Verifying", STYLE::info_fg()),
        VerificationOutcome::Valid => Span::styled("✔ DSL is valid", STYLE::ok_fg()),
        VerificationOutcome::Invalid { reason } => Span::styled(format!("✖ {reason}"), STYLE::error_fg()),
    };
    let block = Block::default()
        .title(" Verification ")
        .borders(Borders::ALL)
        .border_style(STYLE::editor_border());
    f.render_widget(Paragraph::new(Spans::from(span)).block(block), area);
}

fn render_fields<B: Backend>(f: &mut Frame<B>, area: Rect, wb: &Workbench, focused: bool, cursor: usize) {
    let mut spans: Vec<Span> = Vec::new();
    for (i, (key, label)) in AVAILABLE_FIELDS.iter().enumerate() {
        let mut style = if wb.draft().is_selected(key) { STYLE::field_on() } else { STYLE::field_off() };
        if focused && i == cursor {
            style = style.patch(STYLE::field_cursor());
        }
        spans.push(Span::styled(format!(" {label} "), style));
        spans.push(Span::raw(" "));
    }
    // selected keys outside the catalog still show, in selection order
    for key in wb.draft().selected_fields() {
        if !AVAILABLE_FIELDS.iter().any(|(k, _)| *k == key.as_str()) {
            spans.push(Span::styled(format!(" {} ", field_label(key)), STYLE::field_on()));
            spans.push(Span::raw(" "));
        }
    }
    let border = if focused { STYLE::editor_border_focus() } else { STYLE::editor_border() };
    let block = Block::default()
        .title(" Fields (←/→ move, Space toggle) ")
        .borders(Borders::ALL)
        .border_style(border);
    f.render_widget(Paragraph::new(Spans::from(spans)).block(block), area);
}

fn render_summary<B: Backend>(f: &mut Frame<B>, area: Rect, summary: Option<&CohortSummary>) {
    let line = match summary {
        Some(s) => Spans::from(vec![
            Span::styled("Cohort size ", STYLE::muted()),
            Span::styled(s.cohort_size.clone(), STYLE::metric_value()),
            Span::styled("  │  Unique patients ", STYLE::muted()),
            Span::styled(s.unique_patients.clone(), STYLE::metric_value()),
            Span::styled("  │  Query time ", STYLE::muted()),
            Span::styled(s.query_time.clone(), STYLE::metric_value()),
            Span::styled(format!(" ({})", s.cache_label), STYLE::info_fg()),
            Span::styled("  │  Patients ", STYLE::muted()),
            Span::styled(s.patient_preview.clone(), STYLE::metric_value()),
            Span::styled(format!(" ({})", s.caption), STYLE::info_fg()),
        ]),
        None => Spans::from(Span::styled("No cohort run yet", STYLE::muted())),
    };
    let title = match summary {
        Some(s) => format!(" Cohort {} ", s.cohort_id),
        None => " Cohort ".to_owned(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(STYLE::editor_border());
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_help<B: Backend>(f: &mut Frame<B>, area: Rect) {
    const HELP: &[&str] = &[
        " Cohort Workbench  –  Key Reference ",
        "",
        "  🔄 Focus",
        "      Esc / Tab            Next pane (editor → description → limit → fields → results)",
        "      Shift + Tab          Previous pane",
        "",
        "  📝 Draft & Run",
        "      Ctrl + Enter / F5    Run the cohort",
        "      F6                   Verify the DSL",
        "      F7                   Load the next template",
        "      Enter (row limit)    Apply the row limit",
        "      Space (fields)       Toggle the highlighted field",
        "      Ctrl + Z / Ctrl + Y  Undo / redo in the editor",
        "",
        "  📄 Results",
        "      PageUp / PageDown    Previous / next page",
        "      ← / →                Previous / next page (results focused)",
        "      Shift + ← / →        Scroll columns",
        "      F8                   Cycle page size (10 / 25 / 50 / 100)",
        "      Ctrl + C             Copy the visible page (results focused)",
        "",
        "  💾 Export",
        "      F9                   Export every previewed record to CSV",
        "",
        "     F1                   Close this help screen",
        "     Ctrl + Q             Quit",
    ];

    let block = Block::default()
        .style(STYLE::help_bg())
        .borders(Borders::ALL)
        .title(" Help (F1 to close) ")
        .border_style(STYLE::help_border());
    let p = Paragraph::new(HELP.join("\n")).block(block).wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
