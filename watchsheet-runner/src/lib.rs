//! watchsheet runner: merge pipeline, run orchestration and publishing.
//!
//! This crate builds on `watchsheet-core` to provide:
//! - Configuration (TOML file plus environment overrides)
//! - The merge pipeline joining watchlist names, prices and fundamentals
//! - Run orchestration with scoped session teardown and a JSON run report
//! - Google Sheets and CSV publishers
//! - Markdown preview of the output table

pub mod config;
pub mod job;
pub mod pipeline;
pub mod preview;
pub mod publish;

pub use config::{Config, ConfigError};
pub use job::{run_job, PublishOutcome, PublishStatus, RunReport};
pub use pipeline::{merge_rows, MergePipeline, PipelineOptions, PipelineOutput, RunError};
pub use preview::render_preview;
pub use publish::{
    CsvPublisher, GoogleSheetsPublisher, PublishError, PublishReceipt, SheetPublisher, SheetsAuth,
};
