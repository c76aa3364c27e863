//! Table publishing: Google Sheets and local CSV.
//!
//! A publisher resolves its destination, replaces whatever was there with the
//! header row followed by the data rows, and reports failure as a value. The
//! run treats a failed publish as non-fatal.

pub mod csv_file;
pub mod sheets;

use serde::Serialize;
use thiserror::Error;
use watchsheet_core::domain::Table;

pub use csv_file::CsvPublisher;
pub use sheets::{spreadsheet_id, GoogleSheetsPublisher, SheetsAuth};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Where a table ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub destination: String,
    /// Data rows written, header excluded.
    pub rows: usize,
    /// The destination did not exist before this publish.
    pub created: bool,
}

/// Persists a finished table.
pub trait SheetPublisher: Send + Sync {
    /// Short name for logs and the run report.
    fn name(&self) -> &str;

    fn publish(&self, table: &Table) -> Result<PublishReceipt, PublishError>;
}
