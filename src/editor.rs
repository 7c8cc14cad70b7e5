use tui::{backend::Backend, layout::Rect, Frame};
use tui::text::{Span, Spans};
use tui::widgets::{Block, Borders, Paragraph};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

use crate::palette::STYLE;
use crate::syntax::{highlight_line, ParseState};

/*────────────── configurable gutter ──────────────*/
/// Characters taken by the line-number gutter, trailing space included.
pub const GUTTER_WIDTH: u16 = 5;

const H_SCROLL_MARGIN: usize = 4;
const UNDO_LIMIT: usize = 200;
const INDENT: &str = "    ";

/// Snapshot of the buffer before an edit group.
#[derive(Clone, Debug)]
struct Snapshot {
    buffer: String,
    caret: usize,
}

/// Multi-line DSL editor. `caret` is a byte offset that always sits on a
/// grapheme boundary.
pub struct Editor {
    pub buffer: String,
    pub caret: usize,
    pub view_row: usize,
    pub view_col: usize,
    preferred_col: Option<usize>,
    pub focus: bool,
    viewport_height: usize,
    viewport_width: usize,
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    last_edit_time: Option<Instant>,
}

impl Editor {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            caret: 0,
            view_row: 0,
            view_col: 0,
            preferred_col: None,
            focus: true,
            viewport_height: 7,
            viewport_width: 80,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            last_edit_time: None,
        }
    }

    /// Replace the whole buffer (template load, file preload). Undoable.
    pub fn set_text(&mut self, text: &str) {
        self.snapshot(true);
        self.buffer = normalize_text_for_terminal(text);
        self.caret = 0;
        self.view_row = 0;
        self.view_col = 0;
        self.preferred_col = None;
    }

    pub fn set_viewport_size(&mut self, h: usize, w: usize) {
        self.viewport_height = h.max(1);
        self.viewport_width = w.max(1);
        self.nudge_view_to_caret();
    }

    /*──────────── undo ────────────*/

    /// Record the pre-edit state. Consecutive typing within a second is one group.
    fn snapshot(&mut self, force: bool) {
        let recent = self
            .last_edit_time
            .map_or(false, |t| t.elapsed() < Duration::from_secs(1));
        if force || !recent || self.undo_stack.is_empty() {
            self.undo_stack.push(Snapshot { buffer: self.buffer.clone(), caret: self.caret });
            if self.undo_stack.len() > UNDO_LIMIT {
                self.undo_stack.remove(0);
            }
            self.redo_stack.clear();
        }
        self.last_edit_time = if force { None } else { Some(Instant::now()) };
    }

    fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(prev) => {
                self.redo_stack.push(Snapshot { buffer: self.buffer.clone(), caret: self.caret });
                self.buffer = prev.buffer;
                self.caret = prev.caret.min(self.buffer.len());
                self.last_edit_time = None;
                true
            }
            None => false,
        }
    }

    fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                self.undo_stack.push(Snapshot { buffer: self.buffer.clone(), caret: self.caret });
                self.buffer = next.buffer;
                self.caret = next.caret.min(self.buffer.len());
                self.last_edit_time = None;
                true
            }
            None => false,
        }
    }

    /*──────────── editing primitives ────────────*/

    pub fn insert(&mut self, s: &str) {
        self.snapshot(s.len() > 1);
        self.buffer.insert_str(self.caret, s);
        self.caret += s.len();
        self.preferred_col = None;
    }

    fn backspace(&mut self) -> bool {
        let Some(g) = self.buffer[..self.caret].graphemes(true).next_back() else {
            return false;
        };
        let start = self.caret - g.len();
        self.snapshot(false);
        self.buffer.replace_range(start..self.caret, "");
        self.caret = start;
        true
    }

    fn delete(&mut self) -> bool {
        let Some(g) = self.buffer[self.caret..].graphemes(true).next() else {
            return false;
        };
        let end = self.caret + g.len();
        self.snapshot(false);
        self.buffer.replace_range(self.caret..end, "");
        true
    }

    pub fn handle_paste(&mut self, pasted: &str) {
        let text = normalize_text_for_terminal(pasted);
        if !text.is_empty() {
            self.insert(&text);
            self.nudge_view_to_caret();
        }
    }

    /*──────────── caret geometry ────────────*/

    fn line_start(&self, caret: usize) -> usize {
        self.buffer[..caret].rfind('\n').map_or(0, |p| p + 1)
    }

    fn line_end(&self, caret: usize) -> usize {
        self.buffer[caret..].find('\n').map_or(self.buffer.len(), |p| caret + p)
    }

    /// (line, grapheme column) of the caret.
    pub fn caret_line_col(&self) -> (usize, usize) {
        let line = self.buffer[..self.caret].matches('\n').count();
        let start = self.line_start(self.caret);
        (line, self.buffer[start..self.caret].graphemes(true).count())
    }

    /// Byte offset of grapheme column `col` on the line starting at `start`.
    fn offset_at_col(&self, start: usize, col: usize) -> usize {
        let end = self.line_end(start);
        self.buffer[start..end]
            .grapheme_indices(true)
            .nth(col)
            .map_or(end, |(i, _)| start + i)
    }

    fn move_vertical(&mut self, down: bool) {
        let (_, col) = self.caret_line_col();
        let goal = *self.preferred_col.get_or_insert(col);
        let start = self.line_start(self.caret);
        let target_start = if down {
            let end = self.line_end(self.caret);
            if end >= self.buffer.len() {
                return;
            }
            end + 1
        } else {
            if start == 0 {
                return;
            }
            self.line_start(start - 1)
        };
        self.caret = self.offset_at_col(target_start, goal);
    }

    fn nudge_view_to_caret(&mut self) {
        let (cy, cx) = self.caret_line_col();

        /* ── vertical ─────────────────────────────────────────────── */
        if cy < self.view_row {
            self.view_row = cy;
        }
        if cy >= self.view_row + self.viewport_height {
            self.view_row = cy + 1 - self.viewport_height;
        }

        /* ── horizontal ───────────────────────────────────────────── */
        if cx < self.view_col + H_SCROLL_MARGIN {
            self.view_col = cx.saturating_sub(H_SCROLL_MARGIN);
        }
        if cx + H_SCROLL_MARGIN >= self.view_col + self.viewport_width {
            self.view_col = cx + H_SCROLL_MARGIN + 1 - self.viewport_width;
        }
    }

    /// Returns `true` when the buffer text changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        let changed = match key.code {
            KeyCode::Char('z') if ctrl => self.undo(),
            KeyCode::Char('y') if ctrl => self.redo(),
            KeyCode::Char(_) if ctrl => false,
            KeyCode::Char(c) => {
                let mut tmp = [0u8; 4];
                self.insert(c.encode_utf8(&mut tmp));
                true
            }
            KeyCode::Enter if !ctrl => {
                // keep the current line's indentation
                let start = self.line_start(self.caret);
                let indent: String = self.buffer[start..self.caret]
                    .chars()
                    .take_while(|c| *c == ' ')
                    .collect();
                self.insert(&format!("\n{indent}"));
                true
            }
            KeyCode::BackTab => false,
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => {
                if let Some(g) = self.buffer[..self.caret].graphemes(true).next_back() {
                    self.caret -= g.len();
                }
                self.preferred_col = None;
                false
            }
            KeyCode::Right => {
                if let Some(g) = self.buffer[self.caret..].graphemes(true).next() {
                    self.caret += g.len();
                }
                self.preferred_col = None;
                false
            }
            KeyCode::Up => {
                self.move_vertical(false);
                false
            }
            KeyCode::Down => {
                self.move_vertical(true);
                false
            }
            KeyCode::Home if ctrl => {
                self.caret = 0;
                false
            }
            KeyCode::End if ctrl => {
                self.caret = self.buffer.len();
                false
            }
            KeyCode::Home => {
                self.caret = self.line_start(self.caret);
                self.preferred_col = None;
                false
            }
            KeyCode::End => {
                self.caret = self.line_end(self.caret);
                self.preferred_col = None;
                false
            }
            _ => false,
        };
        self.nudge_view_to_caret();
        changed
    }

    pub fn render<B: Backend>(&self, f: &mut Frame<B>, area: Rect, title: &str) {
        let lines: Vec<&str> = self.buffer.split('\n').collect();
        let (caret_l, caret_c) = self.caret_line_col();
        let vwidth = self.viewport_width;

        // highlighting state has to run from the top, not from view_row
        let mut parse_state = ParseState::Normal;
        for line in lines.iter().take(self.view_row) {
            highlight_line(line, &mut parse_state);
        }

        let mut rows: Vec<Spans> = Vec::with_capacity(self.viewport_height);
        for scr_i in 0..self.viewport_height {
            let line_idx = self.view_row + scr_i;
            let Some(src_line) = lines.get(line_idx).copied() else {
                break;
            };
            let is_caret = line_idx == caret_l;

            /*──── gutter ────*/
            let digits = (GUTTER_WIDTH as usize).saturating_sub(1);
            let mut spans: Vec<Span> = vec![Span::styled(
                format!("{:>width$} ", line_idx + 1, width = digits),
                STYLE::gutter(),
            )];

            /*──── highlighted text, skipping view_col ────*/
            let mut col = 0usize;
            let mut visible = 0usize;
            for (token, style) in highlight_line(src_line, &mut parse_state) {
                for g in token.graphemes(true) {
                    if col < self.view_col {
                        col += 1;
                        continue;
                    }
                    if visible >= vwidth {
                        break;
                    }
                    let st = if self.focus && is_caret && col == caret_c {
                        STYLE::caret_cell()
                    } else {
                        style
                    };
                    spans.push(Span::styled(g.to_string(), st));
                    col += 1;
                    visible += 1;
                }
            }
            // caret past end-of-line
            if self.focus && is_caret && caret_c >= col && caret_c >= self.view_col && visible < vwidth {
                spans.push(Span::styled(" ", STYLE::caret_cell()));
            }
            rows.push(Spans::from(spans));
        }

        let border_st = if self.focus {
            STYLE::editor_border_focus()
        } else {
            STYLE::editor_border()
        };
        let block = Block::default()
            .title(title.to_owned())
            .borders(Borders::ALL)
            .border_style(border_st);
        f.render_widget(Paragraph::new(rows).block(block), area);
    }
}

/// Tabs become spaces and CRLF / lone CR become LF so every buffer line is
/// one terminal row.
pub fn normalize_text_for_terminal(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', INDENT)
}

/*──────────────────────── single-line input ─────────────────────────*/

/// Description and row-limit boxes.
#[derive(Debug, Default, Clone)]
pub struct LineInput {
    pub text: String,
    caret: usize,
    pub focus: bool,
}

impl LineInput {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let caret = text.len();
        Self { text, caret, focus: false }
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.caret = self.text.len();
    }

    /// Returns `true` when the text changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press || key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match key.code {
            KeyCode::Char(c) => {
                self.text.insert(self.caret, c);
                self.caret += c.len_utf8();
                true
            }
            KeyCode::Backspace => match self.text[..self.caret].graphemes(true).next_back() {
                Some(g) => {
                    let start = self.caret - g.len();
                    self.text.replace_range(start..self.caret, "");
                    self.caret = start;
                    true
                }
                None => false,
            },
            KeyCode::Delete => match self.text[self.caret..].graphemes(true).next() {
                Some(g) => {
                    let end = self.caret + g.len();
                    self.text.replace_range(self.caret..end, "");
                    true
                }
                None => false,
            },
            KeyCode::Left => {
                if let Some(g) = self.text[..self.caret].graphemes(true).next_back() {
                    self.caret -= g.len();
                }
                false
            }
            KeyCode::Right => {
                if let Some(g) = self.text[self.caret..].graphemes(true).next() {
                    self.caret += g.len();
                }
                false
            }
            KeyCode::Home => {
                self.caret = 0;
                false
            }
            KeyCode::End => {
                self.caret = self.text.len();
                false
            }
            _ => false,
        }
    }

    pub fn render<B: Backend>(&self, f: &mut Frame<B>, area: Rect, title: &str, placeholder: &str) {
        let mut spans: Vec<Span> = Vec::new();
        if self.text.is_empty() && !self.focus {
            spans.push(Span::styled(placeholder.to_owned(), STYLE::muted()));
        } else {
            let (before, after) = self.text.split_at(self.caret);
            spans.push(Span::styled(before.to_owned(), STYLE::plain()));
            if self.focus {
                let mut rest = after.graphemes(true);
                let under = rest.next().unwrap_or(" ");
                spans.push(Span::styled(under.to_owned(), STYLE::caret_cell()));
                spans.push(Span::styled(rest.collect::<String>(), STYLE::plain()));
            } else {
                spans.push(Span::styled(after.to_owned(), STYLE::plain()));
            }
        }
        let border_st = if self.focus {
            STYLE::editor_border_focus()
        } else {
            STYLE::editor_border()
        };
        let block = Block::default()
            .title(title.to_owned())
            .borders(Borders::ALL)
            .border_style(border_st);
        f.render_widget(Paragraph::new(Spans::from(spans)).block(block), area);
    }
}
