//! sheetbatch - Batch conversion of XLS/XLSX workbooks
//!
//! This crate reads legacy binary (XLS) and XML-based (XLSX) spreadsheets through a
//! fallback chain of parsing engines, normalizes each sheet into a table, and renders
//! it as CSV, PDF or XLSX. Batches of uploaded files are converted one job at a time
//! with per-job progress, partial-failure tolerance and a ZIP archive of the results.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sheetbatch::{ConverterBuilder, NoopObserver};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = ConverterBuilder::new().build()?;
//!
//!     // Convert the first sheet of a workbook to CSV
//!     converter.convert_tagged("report.xls", "report.csv", "csv", None, None, &mut NoopObserver)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Batch Conversion
//!
//! ```rust,no_run
//! use sheetbatch::{
//!     BatchConfig, Delimiter, FormatParams, NoopObserver, Session, Settings, SheetPolicy,
//!     TabularTextParams, TextEncoding,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::start(Settings::default())?;
//!     let (upload, _report) = session.upload("sales.xlsx", &std::fs::read("sales.xlsx")?)?;
//!
//!     let params = FormatParams::Csv(TabularTextParams {
//!         encoding: TextEncoding::Utf8Bom,
//!         delimiter: Delimiter::Semicolon,
//!     });
//!     let config = BatchConfig::new(params).with_sheet_policy(SheetPolicy::AllSheets);
//!
//!     let outcome = session.run_batch(&[upload], &config, &mut NoopObserver)?;
//!     println!("{}/{} jobs succeeded", outcome.result.success, outcome.result.total);
//!     if let Some(archive) = outcome.archive {
//!         println!("archive: {}", archive.display());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Progress
//!
//! Progress events can be received through a channel:
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use sheetbatch::{ConverterBuilder, ProgressEvent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = ConverterBuilder::new().build()?;
//! let (mut sender, receiver) = mpsc::channel::<ProgressEvent>();
//! converter.convert_tagged("book.xlsx", "book.pdf", "pdf", None, None, &mut sender)?;
//! drop(sender);
//! for event in receiver {
//!     println!("job {}: {:.0}%", event.job_index, event.fraction * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod artifact;
mod batch;
mod builder;
mod config;
mod error;
mod formatter;
mod grid;
pub mod logging;
mod output;
mod parser;
mod progress;
mod security;
mod session;
mod types;

// 公開API
pub use api::{
    Delimiter, DocumentParams, FormatParams, OutputFormat, Orientation, PageSize, SheetPolicy,
    SheetSelector, SpreadsheetParams, TabularTextParams, TextEncoding,
};
pub use artifact::{format_size, ArtifactManager, CONVERTED_DIR, UPLOADS_DIR};
pub use batch::{BatchConfig, BatchOrchestrator, BatchOutcome};
pub use builder::{Converter, ConverterBuilder};
pub use config::Settings;
pub use error::{
    ArtifactError, BatchError, ConfigError, ConversionError, EngineFailure, ReadError,
    ReadFailureKind, SessionError,
};
pub use parser::{Engine, PLACEHOLDER_SHEET};
pub use progress::{
    format_duration, BatchStats, FileProgress, JobStatus, NoopObserver, ProgressCounts,
    ProgressEvent, ProgressObserver, ProgressTracker,
};
pub use security::{sanitize_filename, sanitize_sheet_name};
pub use session::Session;
pub use types::{
    BatchResult, CellValue, ConversionJob, FileInfo, InputFileInfo, SpreadsheetTable,
    UploadedFile, ValidationReport,
};
