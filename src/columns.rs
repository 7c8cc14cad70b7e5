//! Display column order: explicit selection first, then whatever else the
//! rows carry, first-seen order.

use std::collections::HashSet;

use crate::execution::Record;

pub type ColumnList = Vec<String>;

pub fn resolve_columns(selected_fields: &[String], records: &[Record]) -> ColumnList {
    let mut ordered: ColumnList = Vec::with_capacity(selected_fields.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(selected_fields.len());

    for field in selected_fields {
        if seen.insert(field.as_str()) {
            ordered.push(field.clone());
        }
    }
    for row in records {
        for key in row.keys() {
            if seen.insert(key.as_str()) {
                ordered.push(key.clone());
            }
        }
    }
    ordered
}
