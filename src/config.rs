//! `config.toml` loading. Every key is optional; a missing file means
//! defaults, a malformed one is an error.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8080"
//! timeout_ms = 8000
//!
//! [workbench]
//! row_limit = 200
//! page_size = 25
//! fields = ["patient_id", "value"]
//!
//! [[templates]]
//! label = "Statins"
//! dsl = "select patient_id, concept from lakehouse where concept = 'statin'"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::draft::{DEFAULT_FIELDS, DEFAULT_ROW_LIMIT};
use crate::error::{Result, WorkbenchError};
use crate::pagination::DEFAULT_PAGE_SIZE;
use crate::templates::CohortTemplate;

pub const API_BASE_ENV: &str = "COHORT_WORKBENCH_API";
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub workbench: WorkbenchConfig,
    pub templates: Vec<CohortTemplate>,
    pub colors: ColorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    pub row_limit: u32,
    pub page_size: usize,
    pub fields: Vec<String>,
    pub export_dir: Option<PathBuf>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            export_dir: None,
        }
    }
}

/// RGB triples for the terminal palette.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub default_bg: [u8; 3],
    pub syntax_keyword: [u8; 3],
    pub syntax_number: [u8; 3],
    pub syntax_string: [u8; 3],
    pub syntax_comment: [u8; 3],
    pub syntax_function: [u8; 3],
    pub syntax_plain: [u8; 3],
    pub caret_cell_fg: [u8; 3],
    pub caret_cell_bg: [u8; 3],
    pub editor_border: [u8; 3],
    pub editor_border_focus: [u8; 3],
    pub help_bg: [u8; 3],
    pub help_border: [u8; 3],
    pub status_fg: [u8; 3],
    pub muted_fg: [u8; 3],
    pub results_border: [u8; 3],
    pub results_border_focus: [u8; 3],
    pub header_row: [u8; 3],
    pub table_caret_fg: [u8; 3],
    pub table_caret_bg: [u8; 3],
    pub field_active_fg: [u8; 3],
    pub field_active_bg: [u8; 3],
    pub error_fg: [u8; 3],
    pub ok_fg: [u8; 3],
    pub info_fg: [u8; 3],
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            default_bg: [22, 22, 22],
            syntax_keyword: [149, 127, 184],
            syntax_number: [210, 126, 153],
            syntax_string: [152, 187, 108],
            syntax_comment: [114, 113, 105],
            syntax_function: [126, 156, 216],
            syntax_plain: [200, 200, 200],
            caret_cell_fg: [22, 22, 22],
            caret_cell_bg: [200, 200, 200],
            editor_border: [84, 84, 109],
            editor_border_focus: [126, 156, 216],
            help_bg: [30, 31, 40],
            help_border: [122, 168, 159],
            status_fg: [156, 171, 202],
            muted_fg: [120, 120, 145],
            results_border: [84, 84, 109],
            results_border_focus: [122, 168, 159],
            header_row: [230, 195, 132],
            table_caret_fg: [22, 22, 22],
            table_caret_bg: [127, 180, 202],
            field_active_fg: [22, 22, 22],
            field_active_bg: [122, 168, 159],
            error_fg: [255, 93, 98],
            ok_fg: [152, 187, 108],
            info_fg: [147, 138, 169],
        }
    }
}

impl Config {
    /// `<config dir>/config.toml`, e.g. `~/.config/cohort-workbench/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join("config.toml"))
    }

    /// Where interactive mode writes its log file.
    pub fn log_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.data_dir().join("cohort-workbench.log"))
    }

    /// Load from `path` (or the default location), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = fs::read_to_string(&p)?;
                Self::from_toml_str(&text)
                    .map_err(|e| WorkbenchError::Config(format!("{}: {e}", p.display())))?
            }
            _ => Self::default(),
        };
        config.apply_env(std::env::var(API_BASE_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self, api_base: Option<String>) {
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            self.api.base_url = base.trim().to_owned();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(WorkbenchError::Config("api.base_url must not be empty".into()));
        }
        if self.api.timeout_ms == 0 {
            return Err(WorkbenchError::Config("api.timeout_ms must be positive".into()));
        }
        if self.workbench.page_size == 0 {
            return Err(WorkbenchError::Config("workbench.page_size must be positive".into()));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "cohort-workbench")
}
