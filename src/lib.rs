// src/lib.rs
// Workbench core, gateway and batch runner; the terminal UI lives in the binary.
pub mod batch_mode;
pub mod columns;
pub mod config;
pub mod csv_export;
pub mod downloads_folder;
pub mod draft;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod logging;
pub mod pagination;
pub mod sequencer;
pub mod templates;
pub mod value_format;
pub mod verification;
pub mod workbench;

pub use error::{Result, WorkbenchError};
pub use workbench::{CohortSummary, Workbench};
