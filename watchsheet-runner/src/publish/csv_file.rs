//! CSV file publisher.

use std::path::{Path, PathBuf};

use tracing::info;
use watchsheet_core::domain::Table;

use super::{PublishError, PublishReceipt, SheetPublisher};

/// Writes the table to a CSV file, replacing any previous content.
#[derive(Debug, Clone)]
pub struct CsvPublisher {
    path: PathBuf,
}

impl CsvPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SheetPublisher for CsvPublisher {
    fn name(&self) -> &str {
        "csv"
    }

    fn publish(&self, table: &Table) -> Result<PublishReceipt, PublishError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let created = !self.path.exists();

        let mut wtr = csv::Writer::from_path(&self.path)?;
        wtr.write_record(table.columns())?;
        for row in table.rows() {
            wtr.write_record(row.cells())?;
        }
        wtr.flush()?;

        info!("wrote {} rows to {}", table.len(), self.path.display());
        Ok(PublishReceipt {
            destination: self.path.display().to_string(),
            rows: table.len(),
            created,
        })
    }
}
