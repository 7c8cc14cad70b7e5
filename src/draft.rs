//! Query draft store: DSL text, description, row limit and the ordered
//! field selection. Pure state, nothing here talks to the network.

use crate::error::{Result, WorkbenchError};

pub const DEFAULT_ROW_LIMIT: u32 = 200;
/// Smallest row limit the draft will hold; lower requests are clamped.
pub const MIN_ROW_LIMIT: u32 = 1;

pub const DEFAULT_DSL: &str = "select patient_id, resource_type, concept, value, timestamp
from lakehouse
where resource_type = 'observation' and concept = 'blood_pressure_systolic' and value > 140
limit 200";

pub const DEFAULT_FIELDS: [&str; 5] = ["patient_id", "resource_type", "concept", "value", "timestamp"];

/// What happened to a row-limit edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimitChange {
    Accepted(u32),
    Clamped { requested: i64, applied: u32 },
}

impl RowLimitChange {
    pub fn applied(&self) -> u32 {
        match *self {
            RowLimitChange::Accepted(v) => v,
            RowLimitChange::Clamped { applied, .. } => applied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDraft {
    text: String,
    description: Option<String>,
    row_limit: u32,
    selected_fields: Vec<String>,
}

impl Default for QueryDraft {
    fn default() -> Self {
        Self::new(
            DEFAULT_DSL,
            DEFAULT_ROW_LIMIT,
            DEFAULT_FIELDS.iter().map(|f| f.to_string()),
        )
    }
}

impl QueryDraft {
    /// Fresh draft as created when the workbench opens.
    /// Duplicate field names are collapsed, first occurrence wins.
    pub fn new<I, S>(text: &str, row_limit: u32, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected_fields: Vec<String> = Vec::new();
        for f in fields {
            let f = f.into();
            if !selected_fields.contains(&f) {
                selected_fields.push(f);
            }
        }
        Self {
            text: text.to_owned(),
            description: None,
            row_limit: row_limit.max(MIN_ROW_LIMIT),
            selected_fields,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    pub fn selected_fields(&self) -> &[String] {
        &self.selected_fields
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected_fields.iter().any(|f| f == key)
    }

    /// Any string is accepted. Returns `true` when the text actually changed.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }
        self.text = text;
        true
    }

    /// Blank descriptions are stored as "no description".
    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
    }

    pub fn set_row_limit(&mut self, limit: u32) -> RowLimitChange {
        if limit < MIN_ROW_LIMIT {
            self.row_limit = MIN_ROW_LIMIT;
            return RowLimitChange::Clamped { requested: limit as i64, applied: MIN_ROW_LIMIT };
        }
        self.row_limit = limit;
        RowLimitChange::Accepted(limit)
    }

    /// Parse a row limit typed by the user.
    ///
    /// Non-numeric input is rejected and the current limit is kept. Values
    /// below [`MIN_ROW_LIMIT`] (including negatives) and values past `u32::MAX`
    /// are clamped, and the clamp is reported back.
    pub fn set_row_limit_input(&mut self, input: &str) -> Result<RowLimitChange> {
        let trimmed = input.trim();
        let requested: i64 = trimmed
            .parse()
            .map_err(|_| WorkbenchError::InvalidRowLimit(input.to_owned()))?;

        let applied = requested.clamp(MIN_ROW_LIMIT as i64, u32::MAX as i64) as u32;
        self.row_limit = applied;
        if applied as i64 == requested {
            Ok(RowLimitChange::Accepted(applied))
        } else {
            Ok(RowLimitChange::Clamped { requested, applied })
        }
    }

    /// Append `key` if absent, remove it otherwise; the remaining fields keep
    /// their relative order. Returns whether the field is selected afterwards.
    pub fn toggle_field(&mut self, key: &str) -> bool {
        if let Some(pos) = self.selected_fields.iter().position(|f| f == key) {
            self.selected_fields.remove(pos);
            false
        } else {
            self.selected_fields.push(key.to_owned());
            true
        }
    }

    /// Replace the DSL text wholesale with a template body.
    pub fn load_template(&mut self, text: &str) -> bool {
        self.set_text(text)
    }
}
