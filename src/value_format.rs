//! Cell formatting shared by the grid and the exporters, so on-screen and
//! exported values agree except for how missing values are written.

use serde_json::Value;

use crate::execution::QueryTime;

/// Placeholder shown in the grid for null / missing cells.
pub const MISSING_MARKER: &str = "—";

/// Grid text for a cell. `None` is a key the row doesn't have.
pub fn format_display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING_MARKER.to_owned(),
        Some(v) => format_present(v),
    }
}

/// Export text for a cell: same as the grid, but missing → empty field.
pub fn format_export(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => format_present(v),
    }
}

fn format_present(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        Value::Null => String::new(),
    }
}

/// Integers print as-is (also `140.0`), everything else with 3 decimals.
fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => format!("{f:.3}"),
        None => n.to_string(),
    }
}

pub fn format_query_time(t: &QueryTime) -> String {
    match t {
        QueryTime::Nanos(ns) => {
            let ms = ns / 1_000_000.0;
            if ms >= 1000.0 {
                format!("{:.2} s", ms / 1000.0)
            } else {
                format!("{ms:.1} ms")
            }
        }
        QueryTime::Text(s) if !s.trim().is_empty() => s.clone(),
        _ => MISSING_MARKER.to_owned(),
    }
}

/// Thousands-separated count; zero renders as the missing marker.
pub fn format_count(n: u64) -> String {
    if n == 0 {
        return MISSING_MARKER.to_owned();
    }
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
