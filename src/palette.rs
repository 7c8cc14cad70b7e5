#![allow(non_snake_case)]

use once_cell::sync::OnceCell;
use tui::style::{Color, Modifier, Style};

use cohort_workbench::config::ColorConfig;

/*──────────────────────── Configured colors ───────────────────────────────*/
static CONFIG_COLORS: OnceCell<ColorConfig> = OnceCell::new();

/// Install the `[colors]` table; call once before the first frame.
/// Later calls are ignored.
pub fn install(colors: ColorConfig) {
    let _ = CONFIG_COLORS.set(colors);
}

fn colors() -> &'static ColorConfig {
    CONFIG_COLORS.get_or_init(ColorConfig::default)
}

// Helper to convert RGB array to Color
#[inline]
pub fn rgb(arr: [u8; 3]) -> Color {
    Color::Rgb(arr[0], arr[1], arr[2])
}

/*──────────────────────── Style shortcuts used throughout the UI ──────────*/
/// Central place to theme every widget.
pub mod STYLE {
    use super::{colors, rgb, Modifier, Style};

    #[inline]
    fn fg(c: [u8; 3]) -> Style {
        Style::default().fg(rgb(c))
    }

    #[inline]
    fn fg_bg(f: [u8; 3], b: [u8; 3]) -> Style {
        Style::default().fg(rgb(f)).bg(rgb(b))
    }

    pub fn default_bg() -> Style { Style::default().bg(rgb(colors().default_bg)) }

    /* ─── syntax highlighter ─── */
    pub fn kw() -> Style    { fg(colors().syntax_keyword).add_modifier(Modifier::BOLD) }
    pub fn num() -> Style   { fg(colors().syntax_number) }
    pub fn str_() -> Style  { fg(colors().syntax_string) }
    pub fn cmt() -> Style   { fg(colors().syntax_comment) }
    pub fn func() -> Style  { fg(colors().syntax_function) }
    pub fn plain() -> Style { fg(colors().syntax_plain) }

    /* ─── editor + inputs ─── */
    pub fn gutter() -> Style { fg(colors().muted_fg) }
    pub fn caret_cell() -> Style { fg_bg(colors().caret_cell_fg, colors().caret_cell_bg) }
    pub fn editor_border() -> Style { fg(colors().editor_border) }
    pub fn editor_border_focus() -> Style { fg(colors().editor_border_focus) }

    /* ─── help / status ─── */
    pub fn help_bg() -> Style { Style::default().bg(rgb(colors().help_bg)) }
    pub fn help_border() -> Style { fg(colors().help_border) }
    pub fn status_fg() -> Style { fg(colors().status_fg) }
    pub fn muted() -> Style { fg(colors().muted_fg) }

    /* ─── field strip / metrics ─── */
    pub fn field_on() -> Style { fg_bg(colors().field_active_fg, colors().field_active_bg) }
    pub fn field_off() -> Style { fg(colors().muted_fg) }
    pub fn field_cursor() -> Style { Style::default().add_modifier(Modifier::UNDERLINED | Modifier::BOLD) }
    pub fn metric_value() -> Style { fg(colors().syntax_plain).add_modifier(Modifier::BOLD) }

    /* ─── results pane ─── */
    pub fn results_border() -> Style { fg(colors().results_border) }
    pub fn results_border_focus() -> Style { fg(colors().results_border_focus) }
    pub fn header_row() -> Style { fg(colors().header_row).add_modifier(Modifier::BOLD) }
    pub fn table_caret_bg() -> Style { fg_bg(colors().table_caret_fg, colors().table_caret_bg) }
    pub fn error_fg() -> Style { fg(colors().error_fg) }
    pub fn ok_fg() -> Style { fg(colors().ok_fg) }
    pub fn info_fg() -> Style { fg(colors().info_fg) }
}
