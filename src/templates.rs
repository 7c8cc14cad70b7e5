//! Starter queries and the field catalog offered by the toggle strip.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CohortTemplate {
    pub label: String,
    pub dsl: String,
}

/// `(key, label)` pairs for the field toggle set.
pub const AVAILABLE_FIELDS: [(&str, &str); 9] = [
    ("patient_id", "Patient ID"),
    ("master_id", "Master ID"),
    ("resource_type", "Resource Type"),
    ("concept", "Concept"),
    ("unit", "Unit"),
    ("value", "Value"),
    ("timestamp", "Timestamp"),
    ("code_loinc", "LOINC"),
    ("code_snomed", "SNOMED"),
];

const BUILTIN: [(&str, &str); 3] = [
    (
        "High BMI (>= 30)",
        "select patient_id, concept, value, timestamp
from lakehouse
where concept = 'body_mass_index' and value >= 30
limit 150",
    ),
    (
        "Recent HbA1c",
        "select patient_id, value, timestamp
from lakehouse
where concept = 'hba1c' and timestamp >= '2024-01-01'
limit 120",
    ),
    (
        "Cardiology Encounters",
        "select patient_id, resource_type, timestamp
from lakehouse
where resource_type = 'encounter' and concept = 'cardiology'
limit 200",
    ),
];

pub fn builtin_templates() -> Vec<CohortTemplate> {
    BUILTIN
        .iter()
        .map(|(label, dsl)| CohortTemplate { label: label.to_string(), dsl: dsl.to_string() })
        .collect()
}

/// Built-ins first, then configured extras. A configured template whose label
/// matches a built-in replaces it in place.
pub fn template_catalog(extra: &[CohortTemplate]) -> Vec<CohortTemplate> {
    let mut all = builtin_templates();
    for t in extra {
        match all.iter_mut().find(|b| b.label == t.label) {
            Some(slot) => *slot = t.clone(),
            None => all.push(t.clone()),
        }
    }
    all
}

pub fn field_label(key: &str) -> &str {
    AVAILABLE_FIELDS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}
