//! Integration Tests for sheetbatch
//!
//! End-to-end tests covering the reader, the three renderers, batch orchestration
//! and the temporary artifact lifecycle. Fixtures are generated with rust_xlsxwriter.

use rust_xlsxwriter::*;
use sheetbatch::{
    ArtifactManager, BatchConfig, ConverterBuilder, Delimiter, FormatParams, JobStatus,
    NoopObserver, OutputFormat, ProgressEvent, Session, Settings, SheetPolicy, SheetSelector,
    SpreadsheetParams, TabularTextParams, TextEncoding, UploadedFile,
};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

// Helper module for generating test fixtures
mod fixtures {
    use super::*;

    /// Generate a table with a header row and `rows` data rows
    pub fn generate_rows(rows: u32) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Data")?;

        worksheet.write_string(0, 0, "id")?;
        worksheet.write_string(0, 1, "label")?;
        for r in 1..=rows {
            worksheet.write_number(r, 0, r as f64)?;
            worksheet.write_string(r, 1, &format!("item {}", r))?;
        }

        Ok(workbook.save_to_buffer()?)
    }

    /// Generate a workbook with 3 fully populated sheets of different shapes
    pub fn generate_multi_sheets() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();

        let sales = workbook.add_worksheet();
        sales.set_name("Sales")?;
        sales.write_string(0, 0, "Region")?;
        sales.write_string(0, 1, "Amount")?;
        sales.write_string(0, 2, "Closed")?;
        for (r, region) in ["North", "South", "East"].iter().enumerate() {
            let row = r as u32 + 1;
            sales.write_string(row, 0, *region)?;
            sales.write_number(row, 1, 1000.5 * row as f64)?;
            sales.write_boolean(row, 2, row % 2 == 0)?;
        }

        let staff = workbook.add_worksheet();
        staff.set_name("Staff")?;
        staff.write_string(0, 0, "Name")?;
        staff.write_string(0, 1, "Age")?;
        staff.write_string(1, 0, "Alice")?;
        staff.write_number(1, 1, 30.0)?;
        staff.write_string(2, 0, "Bob")?;
        staff.write_number(2, 1, 41.0)?;

        let notes = workbook.add_worksheet();
        notes.set_name("Notes")?;
        notes.write_string(0, 0, "single line")?;
        notes.write_string(0, 1, "of notes")?;

        Ok(workbook.save_to_buffer()?)
    }

    /// Write bytes to a file inside `dir`
    pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    /// Describe a file on disk as an upload
    pub fn upload(path: &Path) -> UploadedFile {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        UploadedFile::new(path, name, size)
    }

    /// Names of the entries inside a zip archive
    pub fn archive_entries(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }
}

fn settings_in(dir: &Path) -> Settings {
    Settings {
        temp_root: dir.join("temp"),
        ..Settings::default()
    }
}

// TC-I-001: Batch with one missing input
#[test]
fn test_batch_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let data = fixtures::generate_rows(3).unwrap();
    let first = fixtures::write(dir.path(), "first.xlsx", &data);
    let third = fixtures::write(dir.path(), "third.xlsx", &data);
    let missing = dir.path().join("second.xlsx");

    let files = vec![
        fixtures::upload(&first),
        UploadedFile::new(&missing, "second.xlsx", 2048),
        fixtures::upload(&third),
    ];

    let mut session = Session::start(settings_in(dir.path())).unwrap();
    let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Csv));
    let outcome = session.run_batch(&files, &config, &mut NoopObserver).unwrap();

    assert_eq!(outcome.result.total, 3);
    assert_eq!(outcome.result.success, 2);
    assert_eq!(outcome.result.failed, 1);
    assert_eq!(outcome.result.errors.len(), 1);
    assert!(outcome.result.errors[0].starts_with("second.xlsx: "));

    let archive = outcome.archive.expect("archive of the successful outputs");
    assert_eq!(
        fixtures::archive_entries(&archive),
        vec!["first.csv".to_string(), "third.csv".to_string()]
    );

    let statuses: Vec<JobStatus> = session.tracker().jobs().iter().map(|j| j.status).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Done, JobStatus::Failed, JobStatus::Done]
    );
    assert_eq!(outcome.stats.processed_size, files[0].size + files[2].size);
}

// TC-I-002: Row limit excludes the header row
#[test]
fn test_row_limit_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixtures::write(dir.path(), "big.xlsx", &fixtures::generate_rows(1000).unwrap());
    let converter = ConverterBuilder::new().build().unwrap();

    let table = converter
        .read_table(&path, &SheetSelector::First, Some(5))
        .unwrap();
    assert_eq!(table.height(), 5);
    assert_eq!(table.columns(), &["id".to_string(), "label".to_string()]);

    let full = converter.read_table(&path, &SheetSelector::First, None).unwrap();
    assert_eq!(full.height(), 1000);
}

// TC-I-003: Whole-workbook XLSX round trip
#[test]
fn test_xlsx_round_trip_keeps_sheets_and_cell_counts() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixtures::write(dir.path(), "book.xlsx", &fixtures::generate_multi_sheets().unwrap());
    let output = dir.path().join("upgraded.xlsx");
    let converter = ConverterBuilder::new().build().unwrap();

    let params = FormatParams::Xlsx(SpreadsheetParams::default());
    assert!(converter
        .convert_tagged(&input, &output, "xlsx", Some(params), None, &mut NoopObserver)
        .unwrap());

    let source_sheets = converter.list_sheets(&input);
    let output_sheets = converter.list_sheets(&output);
    assert_eq!(source_sheets, vec!["Sales", "Staff", "Notes"]);
    assert_eq!(source_sheets, output_sheets);

    for sheet in &source_sheets {
        let selector = SheetSelector::Name(sheet.clone());
        let before = converter.read_table(&input, &selector, None).unwrap();
        let after = converter.read_table(&output, &selector, None).unwrap();
        assert_eq!(before.cell_count(), after.cell_count(), "sheet {}", sheet);
        assert_eq!(before.text_rows(), after.text_rows(), "sheet {}", sheet);
    }
}

// TC-I-004: Converting twice gives the same content
#[test]
fn test_conversion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixtures::write(dir.path(), "book.xlsx", &fixtures::generate_multi_sheets().unwrap());
    let converter = ConverterBuilder::new().build().unwrap();

    let first = dir.path().join("a.csv");
    let second = dir.path().join("b.csv");
    for output in [&first, &second] {
        converter
            .convert_tagged(&input, output, "csv", None, Some("Staff"), &mut NoopObserver)
            .unwrap();
    }
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

    let first = dir.path().join("a.xlsx");
    let second = dir.path().join("b.xlsx");
    for output in [&first, &second] {
        converter
            .convert_tagged(&input, output, "xlsx", None, None, &mut NoopObserver)
            .unwrap();
    }
    for sheet in converter.list_sheets(&input) {
        let selector = SheetSelector::Name(sheet);
        let a = converter.read_table(&first, &selector, None).unwrap();
        let b = converter.read_table(&second, &selector, None).unwrap();
        assert_eq!(a.width(), b.width());
        assert_eq!(a.height(), b.height());
        assert_eq!(a.text_rows(), b.text_rows());
    }
}

// TC-I-005: Age-based sweep keeps fresh files
#[test]
fn test_sweep_removes_only_old_files() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ArtifactManager::new(dir.path()).unwrap();
    let old = manager.save_upload("old.xlsx", b"old").unwrap();
    let fresh = manager.save_upload("fresh.xlsx", b"fresh").unwrap();

    let now = SystemTime::now();
    let stale = filetime::FileTime::from_system_time(now - Duration::from_secs(25 * 3600));
    filetime::set_file_mtime(&old.path, stale).unwrap();

    let removed = ArtifactManager::sweep_expired(dir.path(), Duration::from_secs(24 * 3600));
    assert_eq!(removed, 1);
    assert!(!old.path.exists());
    assert!(fresh.path.exists());
    assert!(fresh.path.parent().unwrap().exists());
}

// TC-I-006: An XLSX saved with a legacy extension is still readable
#[test]
fn test_misnamed_xlsx_falls_back_to_auto_detect() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixtures::write(dir.path(), "legacy.xls", &fixtures::generate_rows(4).unwrap());
    let converter = ConverterBuilder::new().build().unwrap();

    let table = converter.read_table(&path, &SheetSelector::First, None).unwrap();
    assert_eq!(table.sheet_name(), "Data");
    assert_eq!(table.height(), 4);
    assert_eq!(converter.list_sheets(&path), vec!["Data"]);
}

// TC-I-007: Every listed sheet name is accepted without fallback
#[test]
fn test_listed_sheets_are_accepted_strictly() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixtures::write(dir.path(), "book.xlsx", &fixtures::generate_multi_sheets().unwrap());
    let converter = ConverterBuilder::new()
        .with_strict_sheet_names(true)
        .build()
        .unwrap();

    let sheets = converter.list_sheets(&path);
    assert!(!sheets.is_empty());
    for sheet in &sheets {
        let table = converter
            .read_table(&path, &SheetSelector::Name(sheet.clone()), None)
            .unwrap();
        assert_eq!(table.sheet_name(), sheet);
    }

    assert!(converter
        .read_table(&path, &SheetSelector::Name("Missing".to_string()), None)
        .is_err());
}

// TC-I-008: Lenient mode falls back to the first sheet
#[test]
fn test_unknown_sheet_falls_back_to_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixtures::write(dir.path(), "book.xlsx", &fixtures::generate_multi_sheets().unwrap());
    let converter = ConverterBuilder::new().build().unwrap();

    let table = converter
        .read_table(&path, &SheetSelector::Name("Missing".to_string()), None)
        .unwrap();
    assert_eq!(table.sheet_name(), "Sales");
}

// TC-I-009: Per-sheet expansion with channel progress
#[test]
fn test_all_sheets_batch_to_pdf_with_progress_channel() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixtures::write(dir.path(), "report.xlsx", &fixtures::generate_multi_sheets().unwrap());

    let mut session = Session::start(settings_in(dir.path())).unwrap();
    let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Pdf))
        .with_sheet_policy(SheetPolicy::AllSheets)
        .with_archive_name("reports");

    let (mut sender, receiver) = mpsc::channel::<ProgressEvent>();
    let outcome = session
        .run_batch(&[fixtures::upload(&input)], &config, &mut sender)
        .unwrap();
    drop(sender);

    assert_eq!(outcome.result.success, 3);
    let archive = outcome.archive.unwrap();
    assert_eq!(archive.file_name().unwrap(), "reports.zip");
    assert_eq!(
        fixtures::archive_entries(&archive),
        vec!["report_Notes.pdf", "report_Sales.pdf", "report_Staff.pdf"]
    );

    let mut pdf = Vec::new();
    fs::File::open(outcome.output_dir.join("report_Sales.pdf"))
        .unwrap()
        .read_to_end(&mut pdf)
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let finished: Vec<usize> = receiver
        .iter()
        .filter(|e| e.fraction == 1.0)
        .map(|e| e.job_index)
        .collect();
    assert_eq!(finished, vec![0, 1, 2]);
    assert_eq!(session.tracker().overall_progress(), 1.0);
}

// TC-I-010: Large tables are truncated in documents without failing
#[test]
fn test_pdf_of_large_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixtures::write(dir.path(), "big.xlsx", &fixtures::generate_rows(150).unwrap());
    let output = dir.path().join("big.pdf");
    let converter = ConverterBuilder::new().build().unwrap();

    assert!(converter
        .convert_tagged(&input, &output, "pdf", None, None, &mut NoopObserver)
        .unwrap());
    assert!(fs::metadata(&output).unwrap().len() > 0);
}

// TC-I-011: CSV options
#[test]
fn test_csv_delimiter_and_bom() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixtures::write(dir.path(), "book.xlsx", &fixtures::generate_rows(2).unwrap());
    let output = dir.path().join("book.csv");
    let converter = ConverterBuilder::new().build().unwrap();

    let params = FormatParams::Csv(TabularTextParams {
        encoding: TextEncoding::Utf8,
        delimiter: Delimiter::Semicolon,
    });
    converter
        .convert_tagged(&input, &output, "csv", Some(params), None, &mut NoopObserver)
        .unwrap();

    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert_eq!(text, "id;label\n1;item 1\n2;item 2\n");
}

// TC-I-012: Specific sheet per file
#[test]
fn test_specific_sheets_policy() {
    let dir = tempfile::tempdir().unwrap();
    let data = fixtures::generate_multi_sheets().unwrap();
    let chosen = fixtures::write(dir.path(), "chosen.xlsx", &data);
    let skipped = fixtures::write(dir.path(), "skipped.xlsx", &data);

    let mut session = Session::start(settings_in(dir.path())).unwrap();
    let selected = [("chosen.xlsx".to_string(), "Staff".to_string())]
        .into_iter()
        .collect();
    let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Csv))
        .with_sheet_policy(SheetPolicy::SpecificSheets(selected));

    let outcome = session
        .run_batch(
            &[fixtures::upload(&chosen), fixtures::upload(&skipped)],
            &config,
            &mut NoopObserver,
        )
        .unwrap();

    assert_eq!(outcome.result.total, 1);
    let csv = fs::read_to_string(outcome.output_dir.join("chosen_Staff.csv")).unwrap();
    assert!(csv.contains("Alice"));
}

// TC-I-013: Batch size limit
#[test]
fn test_batch_rejects_too_many_files() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        max_files_per_batch: 2,
        ..settings_in(dir.path())
    };
    let mut session = Session::start(settings).unwrap();
    let files: Vec<UploadedFile> = (0..3)
        .map(|i| UploadedFile::new(dir.path().join(format!("{}.xlsx", i)), format!("{}.xlsx", i), 1))
        .collect();

    let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Xlsx));
    assert!(session.run_batch(&files, &config, &mut NoopObserver).is_err());
}

// TC-I-014: Session lifecycle with uploads and listing
#[test]
fn test_session_upload_listing_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::start(settings_in(dir.path())).unwrap();

    let (upload, report) = session
        .upload("Quarterly Report.xlsx", &fixtures::generate_multi_sheets().unwrap())
        .unwrap();
    assert!(report.valid);
    assert_eq!(report.sheets, vec!["Sales", "Staff", "Notes"]);

    let (_, bad) = session.upload("notes.txt", b"plain text").unwrap();
    assert!(!bad.valid);

    let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Xlsx));
    let outcome = session.run_batch(&[upload], &config, &mut NoopObserver).unwrap();
    let listed = ArtifactManager::list_files(&outcome.output_dir);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Quarterly Report.xlsx");
    assert_eq!(listed[0].extension, ".xlsx");
    assert!(ArtifactManager::read_file(&listed[0].path).is_some());

    let root = session.artifacts().root().to_path_buf();
    session.end().unwrap();
    assert!(!root.exists());
}
