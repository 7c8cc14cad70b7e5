use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tui::{
    backend::Backend,
    layout::{Constraint, Rect},
    text::{Span, Spans},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};
use unicode_segmentation::UnicodeSegmentation;

use cohort_workbench::execution::Record;
use cohort_workbench::pagination::PageRange;
use cohort_workbench::value_format::format_display;

use crate::palette::STYLE;

const MAX_COL_WIDTH: usize = 32;
const MIN_COL_WIDTH: usize = 4;

/// What a key in the grid asks the workspace to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAction {
    None,
    PrevPage,
    NextPage,
    CopyPage,
}

/// Everything the grid needs for one frame, borrowed from the workbench.
pub struct GridView<'a> {
    pub columns: &'a [String],
    pub rows: &'a [Record],
    /// 1-based number of `rows[0]` within the full result set.
    pub first_row: usize,
    pub range: PageRange,
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub empty_message: Option<&'a str>,
}

pub struct Results {
    pub focus: bool,
    pub cursor_row: usize,
    pub view_col: usize,
}

impl Results {
    pub fn new() -> Self {
        Self { focus: false, cursor_row: 0, view_col: 0 }
    }

    /// New result set or new page: caret back to the top.
    pub fn reset_cursor(&mut self) {
        self.cursor_row = 0;
    }

    pub fn reset(&mut self) {
        self.cursor_row = 0;
        self.view_col = 0;
    }

    pub fn handle_key(&mut self, key: KeyEvent, visible_rows: usize, column_count: usize) -> GridAction {
        if key.kind != KeyEventKind::Press {
            return GridAction::None;
        }
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') if ctrl => GridAction::CopyPage,
            KeyCode::Left if shift => {
                self.view_col = self.view_col.saturating_sub(1);
                GridAction::None
            }
            KeyCode::Right if shift => {
                if self.view_col + 1 < column_count {
                    self.view_col += 1;
                }
                GridAction::None
            }
            KeyCode::Left => GridAction::PrevPage,
            KeyCode::Right => GridAction::NextPage,
            KeyCode::Up => {
                self.cursor_row = self.cursor_row.saturating_sub(1);
                GridAction::None
            }
            KeyCode::Down => {
                if self.cursor_row + 1 < visible_rows {
                    self.cursor_row += 1;
                }
                GridAction::None
            }
            KeyCode::Home => {
                self.cursor_row = 0;
                GridAction::None
            }
            KeyCode::End => {
                self.cursor_row = visible_rows.saturating_sub(1);
                GridAction::None
            }
            _ => GridAction::None,
        }
    }

    pub fn render<B: Backend>(&mut self, f: &mut Frame<B>, area: Rect, view: &GridView<'_>) {
        let border = if self.focus { STYLE::results_border_focus() } else { STYLE::results_border() };
        let title = Spans::from(vec![
            Span::styled(" Results ", STYLE::results_border_focus()),
            Span::styled(
                format!(
                    "• Showing {} • page {}/{} • {} per page ",
                    view.range,
                    view.page + 1,
                    view.page_count,
                    view.page_size
                ),
                STYLE::status_fg(),
            ),
        ]);
        let block = Block::default().title(title).borders(Borders::ALL).border_style(border);

        if let Some(msg) = view.empty_message {
            let p = Paragraph::new(Span::styled(msg.to_owned(), STYLE::muted()))
                .block(block)
                .wrap(Wrap { trim: true });
            f.render_widget(p, area);
            return;
        }

        self.cursor_row = self.cursor_row.min(view.rows.len().saturating_sub(1));
        self.view_col = self.view_col.min(view.columns.len().saturating_sub(1));

        /* ── cell text + column widths ───────────────────────────── */
        let shown_cols = &view.columns[self.view_col..];
        let cells: Vec<Vec<String>> = view
            .rows
            .iter()
            .map(|r| shown_cols.iter().map(|c| clip(&format_display(r.get(c)))).collect())
            .collect();

        let index_width = (view.first_row + view.rows.len()).to_string().len().max(1);
        let mut widths: Vec<usize> = shown_cols
            .iter()
            .map(|h| h.graphemes(true).count().clamp(MIN_COL_WIDTH, MAX_COL_WIDTH))
            .collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.graphemes(true).count());
            }
        }

        let mut constraints = vec![Constraint::Length(index_width as u16)];
        constraints.extend(widths.iter().map(|w| Constraint::Length(*w as u16)));

        /* ── rows ────────────────────────────────────────────────── */
        let mut header_cells = vec![Cell::from("#")];
        header_cells.extend(shown_cols.iter().map(|h| Cell::from(h.clone())));
        let header = Row::new(header_cells).style(STYLE::header_row());

        let rows: Vec<Row> = cells
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let mut out = vec![Cell::from(Span::styled(
                    (view.first_row + i).to_string(),
                    STYLE::muted(),
                ))];
                out.extend(row.into_iter().map(Cell::from));
                let r = Row::new(out);
                if self.focus && i == self.cursor_row {
                    r.style(STYLE::table_caret_bg())
                } else {
                    r.style(STYLE::plain())
                }
            })
            .collect();

        let table = Table::new(rows)
            .header(header)
            .block(block)
            .widths(&constraints)
            .column_spacing(2);
        f.render_widget(table, area);
    }
}

/// Flatten line breaks and cap to the column width with an ellipsis.
fn clip(text: &str) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.graphemes(true).count() <= MAX_COL_WIDTH {
        return flat;
    }
    let mut out: String = flat.graphemes(true).take(MAX_COL_WIDTH - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_page_and_shift_arrows_scroll() {
        let mut grid = Results::new();
        let key = |code, mods| KeyEvent::new(code, mods);
        assert_eq!(grid.handle_key(key(KeyCode::Right, KeyModifiers::NONE), 10, 5), GridAction::NextPage);
        assert_eq!(grid.handle_key(key(KeyCode::Left, KeyModifiers::NONE), 10, 5), GridAction::PrevPage);
        grid.handle_key(key(KeyCode::Right, KeyModifiers::SHIFT), 10, 2);
        grid.handle_key(key(KeyCode::Right, KeyModifiers::SHIFT), 10, 2);
        assert_eq!(grid.view_col, 1);
        assert_eq!(
            grid.handle_key(key(KeyCode::Char('c'), KeyModifiers::CONTROL), 10, 2),
            GridAction::CopyPage
        );
    }

    #[test]
    fn long_cells_are_clipped() {
        let long = "x".repeat(40);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MAX_COL_WIDTH);
        assert!(clipped.ends_with('…'));
        assert_eq!(clip("a\nb"), "a b");
    }
}
