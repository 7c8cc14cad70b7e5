//! CSV export of the full preview set, plus the tab-separated page copy used
//! for the clipboard.
//!
//! Missing cells are written as empty fields, never as the grid's marker.

use crate::execution::Record;
use crate::value_format::format_export;

pub const CSV_LINE_ENDING: &str = "\r\n";

/// RFC-4180 field escaping: quote when the field holds `"`, `,` or a line
/// break, doubling inner quotes.
pub fn escape_csv(field: &str) -> String {
    let needs_quotes = field.contains(',') || field.contains('"')
        || field.contains('\n') || field.contains('\r');
    if needs_quotes {
        let escaped = field.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        field.to_owned()
    }
}

/// Serialize **every** record (not the current page) in `columns` order.
/// `None` when there is nothing to write.
pub fn export_csv(columns: &[String], records: &[Record]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut csv_lines = Vec::with_capacity(records.len() + 1);

    /* header */
    csv_lines.push(
        columns.iter()
            .map(|h| escape_csv(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    /* rows */
    for row in records {
        csv_lines.push(
            columns.iter()
                .map(|c| escape_csv(&format_export(row.get(c))))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    let mut out = csv_lines.join(CSV_LINE_ENDING);
    out.push_str(CSV_LINE_ENDING);
    Some(out)
}

/// Tab-separated copy of `rows` with a header line. Tabs and line breaks
/// inside a value are flattened to spaces so the grid shape survives a paste.
pub fn copy_rows_tsv(columns: &[String], rows: &[Record]) -> String {
    let flatten = |s: String| s.replace(['\t', '\r', '\n'], " ");

    let mut out = vec![columns.iter().map(|c| flatten(c.clone())).collect::<Vec<_>>().join("\t")];
    for row in rows {
        out.push(
            columns.iter()
                .map(|c| flatten(format_export(row.get(c))))
                .collect::<Vec<_>>()
                .join("\t"),
        );
    }
    out.join("\n")
}

/// `{cohort}-{millis}.{ext}` with the cohort id reduced to a safe file stem.
pub fn export_filename(cohort_id: Option<&str>, millis: i64, extension: &str) -> String {
    format!("{}-{millis}.{extension}", sanitize_stem(cohort_id.unwrap_or("")))
}

fn sanitize_stem(name: &str) -> String {
    let name = name.trim().to_lowercase().replace(' ', "-");
    if name.is_empty() {
        return "cohort".to_owned();
    }
    name.chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn cols(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("x\"\"y"), "\"x\"\"\"\"y\"");
        assert_eq!(escape_csv("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn empty_set_is_noop() {
        assert_eq!(export_csv(&cols(&["patient_id"]), &[]), None);
    }

    #[test]
    fn header_once_and_missing_cells_empty() {
        let records = vec![
            rec(json!({ "patient_id": "p1", "value": 140 })),
            rec(json!({ "patient_id": "p2", "value": 150.5, "unit": "mmHg" })),
            rec(json!({ "patient_id": "p3", "value": null, "unit": "a,b" })),
        ];
        let csv = export_csv(&cols(&["patient_id", "value", "unit"]), &records).unwrap();
        assert_eq!(
            csv,
            "patient_id,value,unit\r\n\
             p1,140,\r\n\
             p2,150.500,mmHg\r\n\
             p3,,\"a,b\"\r\n"
        );
    }

    #[test]
    fn tsv_copy_flattens_breaks() {
        let rows = vec![rec(json!({ "a": "x\ty", "b": null }))];
        assert_eq!(copy_rows_tsv(&cols(&["a", "b"]), &rows), "a\tb\nx y\t");
    }

    #[test]
    fn filenames() {
        assert_eq!(
            export_filename(Some("cohort-20240101-120000.123"), 1700000000000, "csv"),
            "cohort-20240101-120000-123-1700000000000.csv"
        );
        assert_eq!(export_filename(None, 5, "csv"), "cohort-5.csv");
        assert_eq!(export_filename(Some("My Cohort!"), 5, "xlsx"), "my-cohort--5.xlsx");
    }
}
