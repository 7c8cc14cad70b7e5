use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::info;
use serde_json::{Map, Value};

use crate::config::WorkbenchConfig;
use crate::draft::RowLimitChange;
use crate::execution::{ExecutionStatus, Record};
use crate::gateway::CohortClient;
use crate::value_format::{format_display, format_query_time};
use crate::verification::VerificationOutcome;
use crate::workbench::Workbench;

pub struct BatchConfig {
    pub dsl_file: PathBuf,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    /// Row-limit text as typed on the command line.
    pub limit: Option<String>,
    /// Replaces the configured field selection when non-empty.
    pub fields: Vec<String>,
    pub description: Option<String>,
    pub verify_first: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Text,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(&self) -> &str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    Written { path: PathBuf, rows: usize },
    /// The run succeeded with zero records; nothing was written.
    NoRecords { cohort_id: String },
}

fn load_dsl(path: &Path) -> Result<String> {
    let dsl = fs::read_to_string(path)
        .with_context(|| format!("reading DSL file {}", path.display()))?;
    if dsl.trim().is_empty() {
        bail!("DSL file {} is empty", path.display());
    }
    Ok(dsl)
}

/// Verify only. Returns the verdict; the caller decides on the exit code.
pub async fn run_batch_verify(client: &CohortClient, dsl_file: &Path) -> Result<VerificationOutcome> {
    let mut workbench = Workbench::default();
    workbench.load_template(&load_dsl(dsl_file)?);
    let request = workbench.request_verify();
    let result = client.verify(&request.dsl).await;
    workbench.apply_verification(request.ticket, result);
    Ok(workbench.verification())
}

pub async fn run_batch_mode(
    client: &CohortClient,
    defaults: &WorkbenchConfig,
    config: &BatchConfig,
) -> Result<BatchOutcome> {
    if config.verbose {
        println!("Cohort Workbench Batch Mode");
        println!("===========================");
        println!("DSL File: {}", config.dsl_file.display());
        println!("Output Directory: {}", config.output_dir.display());
        println!("Output Format: {}", config.output_format.extension());
        println!("Gateway: {}", client.base_url());
    }

    let dsl = load_dsl(&config.dsl_file)?;

    let mut defaults = defaults.clone();
    if !config.fields.is_empty() {
        defaults.fields = config.fields.clone();
    }
    let mut workbench = Workbench::new(&defaults);
    workbench.load_template(&dsl);
    if let Some(description) = &config.description {
        workbench.set_description(description.as_str());
    }
    if let Some(limit) = &config.limit {
        if let RowLimitChange::Clamped { requested, applied } = workbench.set_row_limit_input(limit)? {
            eprintln!("Row limit {requested} clamped to {applied}");
        }
    }

    // 1️⃣ optional verification, a failure aborts the run
    if config.verify_first {
        let request = workbench.request_verify();
        let result = client.verify(&request.dsl).await;
        workbench.apply_verification(request.ticket, result);
        match workbench.verification() {
            VerificationOutcome::Invalid { reason } => bail!("DSL rejected: {reason}"),
            _ if config.verbose => println!("DSL verified"),
            _ => {}
        }
    }

    // 2️⃣ execute
    let started = Instant::now();
    let (ticket, request) = workbench.request_run();
    let result = client.execute(&request).await;
    workbench.apply_execution(ticket, result);
    if let ExecutionStatus::Failed { message } = workbench.execution_status() {
        bail!("Cohort run failed: {message}");
    }
    let Some(result) = workbench.last_result() else {
        bail!("Cohort run produced no result");
    };
    if config.verbose {
        println!(
            "Cohort {} executed in {:?} (backend {}), {} record(s)",
            result.cohort_id,
            started.elapsed(),
            format_query_time(&result.query_time),
            result.records.len()
        );
    }

    // 3️⃣ write
    if !workbench.can_export() {
        println!("No records returned for cohort {}; nothing written", result.cohort_id);
        return Ok(BatchOutcome::NoRecords { cohort_id: result.cohort_id.clone() });
    }

    let filename = workbench.export_filename(
        chrono::Utc::now().timestamp_millis(),
        config.output_format.extension(),
    );
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let output_path = config.output_dir.join(filename);
    let columns = workbench.columns();
    let records = workbench.records();

    match config.output_format {
        OutputFormat::Csv => {
            let csv = workbench.export_csv().unwrap_or_default();
            fs::write(&output_path, csv)?;
        }
        OutputFormat::Json => {
            let json = records_to_json(columns, records);
            fs::write(&output_path, serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Text => {
            fs::write(&output_path, format_as_table(columns, records))?;
        }
        OutputFormat::Xlsx => {
            write_xlsx(&output_path, columns, records)?;
        }
    }

    info!("batch export: {} rows to {}", records.len(), output_path.display());
    if config.verbose {
        println!("Saved {} rows to {}", records.len(), output_path.display());
    }
    Ok(BatchOutcome::Written { path: output_path, rows: records.len() })
}

fn write_xlsx(path: &Path, columns: &[String], records: &[Record]) -> Result<()> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold_format = Format::new().set_bold();

    for (col, header) in columns.iter().enumerate() {
        worksheet.write_with_format(0, col as u16, header.as_str(), &bold_format)?;
    }

    for (row_idx, record) in records.iter().enumerate() {
        let row = row_idx as u32 + 1;
        for (col_idx, column) in columns.iter().enumerate() {
            let col = col_idx as u16;
            match record.get(column) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write(row, col, f)?;
                    }
                    None => {
                        worksheet.write(row, col, n.to_string())?;
                    }
                },
                Some(Value::Bool(b)) => {
                    worksheet.write(row, col, *b)?;
                }
                Some(Value::String(s)) => {
                    worksheet.write(row, col, s.as_str())?;
                }
                Some(other) => {
                    worksheet.write(row, col, other.to_string())?;
                }
            }
        }
    }

    for col in 0..columns.len() {
        worksheet.set_column_width(col as u16, 15.0)?;
    }

    workbook.save(path)?;
    Ok(())
}

/// Objects keyed in resolved column order; absent cells become `null`.
pub fn records_to_json(columns: &[String], records: &[Record]) -> Value {
    let rows = records
        .iter()
        .map(|record| {
            let obj: Map<String, Value> = columns
                .iter()
                .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(obj)
        })
        .collect();
    Value::Array(rows)
}

pub fn format_as_table(columns: &[String], records: &[Record]) -> String {
    let cells: Vec<Vec<String>> = records
        .iter()
        .map(|r| columns.iter().map(|c| format_display(r.get(c))).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut output = String::new();

    // Header
    for (i, header) in columns.iter().enumerate() {
        if i > 0 { output.push_str(" | "); }
        output.push_str(&format!("{:<width$}", header, width = widths[i]));
    }
    output.push('\n');

    // Separator
    for (i, &width) in widths.iter().enumerate() {
        if i > 0 { output.push_str("-+-"); }
        output.push_str(&"-".repeat(width));
    }
    output.push('\n');

    // Rows
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 { output.push_str(" | "); }
            output.push_str(&format!("{:<width$}", cell, width = widths[i]));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn json_follows_column_order() {
        let cols = vec!["value".to_string(), "patient_id".to_string(), "unit".to_string()];
        let out = records_to_json(&cols, &[rec(json!({ "patient_id": "p1", "value": 140 }))]);
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"[{"value":140,"patient_id":"p1","unit":null}]"#
        );
    }

    #[test]
    fn text_table_aligns_on_characters() {
        let cols = vec!["id".to_string(), "value".to_string()];
        let rows = vec![rec(json!({ "id": "p1" })), rec(json!({ "id": "p22", "value": 98.6 }))];
        assert_eq!(
            format_as_table(&cols, &rows),
            "id  | value \n\
             ----+-------\n\
             p1  | —     \n\
             p22 | 98.600\n"
        );
    }
}
