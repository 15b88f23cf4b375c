//! Builder Module
//!
//! Fluent Builder APIを提供し、`Converter`インスタンスを段階的に構築する。

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::api::{FormatParams, OutputFormat, SheetSelector};
use crate::artifact::format_size;
use crate::config::{
    Settings, DEFAULT_DOCUMENT_ROW_CAP, DEFAULT_MAX_FILE_SIZE, DEFAULT_PREVIEW_ROWS,
};
use crate::error::{ConfigError, ConversionError, ReadError, ReadFailureKind};
use crate::output::OutputRenderer;
use crate::parser::WorkbookReader;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::security::is_supported_input;
use crate::types::{ConversionJob, InputFileInfo, SpreadsheetTable, ValidationReport};

/// 変換受付時に通知する進捗
const ACCEPTED_FRACTION: f64 = 0.1;

/// 形式に関する読み込み失敗に添える助言
const RESAVE_ADVICE: &str =
    "open the file in a spreadsheet application and save it again, then retry";

/// 変換処理の設定を保持する内部構造体
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConversionConfig {
    /// 入力ファイルの最大サイズ（バイト）
    pub max_input_size: u64,

    /// PDFに描画する最大データ行数
    pub document_row_cap: usize,

    /// プレビューで読み込む行数
    pub preview_rows: usize,

    /// 存在しないシート名をエラーにするかどうか
    pub strict_sheet_names: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_FILE_SIZE,
            document_row_cap: DEFAULT_DOCUMENT_ROW_CAP,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            strict_sheet_names: false,
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Converter`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetbatch::ConverterBuilder;
///
/// # fn main() -> Result<(), sheetbatch::ConfigError> {
/// let converter = ConverterBuilder::new()
///     .with_document_row_cap(50)
///     .with_strict_sheet_names(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConverterBuilder {
    /// 内部設定（構築中）
    config: ConversionConfig,
}

impl ConverterBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 入力ファイルの最大サイズ: 50MB
    /// - PDFの最大データ行数: 100
    /// - プレビュー行数: 10
    /// - 存在しないシート名: 先頭シートにフォールバック
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定値から変換に関する項目をまとめて反映する
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.config.max_input_size = settings.max_file_size;
        self.config.document_row_cap = settings.document_row_cap;
        self.config.preview_rows = settings.preview_rows;
        self.config.strict_sheet_names = settings.strict_sheet_names;
        self
    }

    /// PDFに描画する最大データ行数を指定する
    ///
    /// 上限を超える行は省略され、省略記号の行が追加されます。
    pub fn with_document_row_cap(mut self, rows: usize) -> Self {
        self.config.document_row_cap = rows;
        self
    }

    /// 入力ファイルの最大サイズ（バイト）を指定する
    pub fn with_max_input_size(mut self, bytes: u64) -> Self {
        self.config.max_input_size = bytes;
        self
    }

    /// プレビューで読み込む行数を指定する
    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.config.preview_rows = rows;
        self
    }

    /// 存在しないシート名の扱いを指定する
    ///
    /// # 引数
    ///
    /// * `strict`:
    ///   * `true`: `ReadError::SheetNotFound`として失敗させる
    ///   * `false`: 先頭シートにフォールバックする（デフォルト）
    pub fn with_strict_sheet_names(mut self, strict: bool) -> Self {
        self.config.strict_sheet_names = strict;
        self
    }

    /// 設定を検証し、`Converter`インスタンスを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(Converter)`: 設定が有効な場合
    /// * `Err(ConfigError::Invalid)`: 上限値のいずれかが0の場合
    pub fn build(self) -> Result<Converter, ConfigError> {
        if self.config.max_input_size == 0 {
            return Err(ConfigError::Invalid(
                "max input size must be greater than 0".to_string(),
            ));
        }
        if self.config.document_row_cap == 0 {
            return Err(ConfigError::Invalid(
                "document row cap must be greater than 0".to_string(),
            ));
        }
        if self.config.preview_rows == 0 {
            return Err(ConfigError::Invalid(
                "preview rows must be greater than 0".to_string(),
            ));
        }

        Ok(Converter::new(self.config))
    }
}

/// 変換処理のファサード
///
/// 1件の変換ジョブを読み込み・描画し、進捗をオブザーバーに通知します。
/// 入力の検証、シート一覧、プレビューもここから提供されます。
#[derive(Debug, Clone)]
pub struct Converter {
    /// 変換設定
    config: ConversionConfig,

    /// ワークブックリーダー
    reader: WorkbookReader,
}

impl Converter {
    pub(crate) fn new(config: ConversionConfig) -> Self {
        Self {
            reader: WorkbookReader::new(config.max_input_size, config.strict_sheet_names),
            config,
        }
    }

    /// 入力ファイルの最大サイズ（バイト）
    pub fn max_input_size(&self) -> u64 {
        self.config.max_input_size
    }

    /// ジョブを変換する
    ///
    /// # 引数
    ///
    /// * `job_index` - 進捗イベントに載せるジョブのインデックス
    /// * `job` - 変換ジョブ
    /// * `observer` - 進捗の通知先
    ///
    /// # 戻り値
    ///
    /// * `Ok(bool)` - 描画が完了した場合。出力ファイルが存在すれば`true`
    /// * `Err(ConversionError)` - 読み込みまたは描画に失敗した場合
    ///
    /// # 進捗
    ///
    /// 受付直後に0.1、完了時に1.0を通知します。
    /// 失敗時はエラーを返す前に0.0を通知します。
    pub fn convert(
        &self,
        job_index: usize,
        job: &ConversionJob,
        observer: &mut dyn ProgressObserver,
    ) -> Result<bool, ConversionError> {
        observer.on_progress(ProgressEvent {
            job_index,
            fraction: ACCEPTED_FRACTION,
        });

        let renderer = OutputRenderer::from_params(&job.params, self.config.document_row_cap);
        match renderer.render(&self.reader, job) {
            Ok(()) => {
                observer.on_progress(ProgressEvent {
                    job_index,
                    fraction: 1.0,
                });
                debug!("Converted '{}' to {}", job.display_name, job.output.display());
                Ok(job.output.exists())
            }
            Err(e) => {
                observer.on_progress(ProgressEvent {
                    job_index,
                    fraction: 0.0,
                });
                Err(e)
            }
        }
    }

    /// 形式タグを指定して1ファイルを変換する
    ///
    /// # 引数
    ///
    /// * `input` - 入力ファイル
    /// * `output` - 出力ファイル
    /// * `tag` - 出力形式タグ（"csv", "pdf", "xlsx"）
    /// * `params` - 形式パラメータ（`None`の場合は形式の既定値）
    /// * `sheet` - 対象シート
    /// * `observer` - 進捗の通知先
    ///
    /// # 戻り値
    ///
    /// 未知のタグは`ConversionError::UnsupportedFormat`、
    /// タグとパラメータの形式が異なる場合は`ConversionError::ParamsMismatch`になります。
    pub fn convert_tagged(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        tag: &str,
        params: Option<FormatParams>,
        sheet: Option<&str>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<bool, ConversionError> {
        let format: OutputFormat = tag.parse()?;
        let params = params.unwrap_or_else(|| FormatParams::default_for(format));
        if params.format() != format {
            return Err(ConversionError::ParamsMismatch {
                format: format.to_string(),
                params: params.format().to_string(),
            });
        }

        let input = input.as_ref();
        let display_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let job = ConversionJob {
            input: input.to_path_buf(),
            output: output.as_ref().to_path_buf(),
            params,
            sheet: sheet.map(str::to_string),
            display_name,
            size: fs::metadata(input).map(|m| m.len()).unwrap_or(0),
        };

        self.convert(0, &job, observer)
    }

    /// シート名の一覧を取得
    ///
    /// 読み込めない場合も失敗せず、仮のシート名1件を返します。
    pub fn list_sheets(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.reader.list_sheets(path.as_ref())
    }

    /// シートを表として読み込む
    ///
    /// # 引数
    ///
    /// * `path` - 入力ファイル
    /// * `selector` - 読み込むシート
    /// * `row_limit` - 読み込む最大データ行数（ヘッダー行は含まない）
    pub fn read_table(
        &self,
        path: impl AsRef<Path>,
        selector: &SheetSelector,
        row_limit: Option<usize>,
    ) -> Result<SpreadsheetTable, ReadError> {
        self.reader.read(path.as_ref(), selector, row_limit)
    }

    /// プレビュー用に先頭の数行を読み込む
    ///
    /// # 引数
    ///
    /// * `path` - 入力ファイル
    /// * `sheet` - 対象シート（`None`は先頭シート）
    /// * `max_rows` - 最大データ行数（`None`は設定値）
    ///
    /// # 戻り値
    ///
    /// 読み込めない場合は警告ログを出力し、`None`を返します。
    pub fn preview_data(
        &self,
        path: impl AsRef<Path>,
        sheet: Option<&str>,
        max_rows: Option<usize>,
    ) -> Option<SpreadsheetTable> {
        let path = path.as_ref();
        let selector = SheetSelector::from(sheet.map(str::to_string));
        let rows = max_rows.unwrap_or(self.config.preview_rows);

        match self.reader.read(path, &selector, Some(rows)) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Preview of '{}' failed: {}", path.display(), e);
                None
            }
        }
    }

    /// 入力ファイルを検証する
    ///
    /// 検証失敗はエラーとして返さず、`ValidationReport`の`valid: false`として報告します。
    ///
    /// # 検証順序
    ///
    /// 1. 存在するか
    /// 2. 拡張子がxls/xlsxか
    /// 3. サイズが上限以下か
    /// 4. 先頭の1行を読み込めるか
    pub fn validate_input_file(&self, path: impl AsRef<Path>) -> ValidationReport {
        let path = path.as_ref();
        let mut report = ValidationReport::default();

        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => {
                report.error = Some("file does not exist".to_string());
                return report;
            }
        };

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !is_supported_input(&extension) {
            report.error = Some(format!("unsupported file format: .{}", extension));
            return report;
        }

        let size = metadata.len();
        if size > self.config.max_input_size {
            report.error = Some(format!(
                "file too large: {} (max: {})",
                format_size(size),
                format_size(self.config.max_input_size)
            ));
            return report;
        }

        report.file_info = Some(InputFileInfo {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
            extension,
        });

        match self.reader.read(path, &SheetSelector::First, Some(1)) {
            Ok(table) if table.width() == 0 => {
                report.error = Some("file is empty or invalid".to_string());
                return report;
            }
            Ok(_) => {}
            Err(e) => {
                let (message, advise) = describe_read_failure(&e);
                debug!("Validation of '{}' failed: {}", path.display(), e);
                report.error = Some(message);
                if advise {
                    report.warnings.push(RESAVE_ADVICE.to_string());
                }
                return report;
            }
        }

        report.sheets = self.reader.sheet_names(path).unwrap_or_default();
        if report.sheets.is_empty() {
            report.warnings.push("no sheets found in the file".to_string());
        }
        report.valid = true;
        report
    }
}

/// 読み込み失敗をユーザー向けメッセージに変換
///
/// 戻り値の2番目は保存し直しの助言を添えるかどうか。
fn describe_read_failure(error: &ReadError) -> (String, bool) {
    match error.last_kind() {
        Some(ReadFailureKind::CorruptArchive) => (
            "file is not a valid spreadsheet archive; it may be a legacy XLS file with the wrong extension"
                .to_string(),
            true,
        ),
        Some(ReadFailureKind::WrongFormat) => (
            "file format does not match its extension".to_string(),
            true,
        ),
        Some(ReadFailureKind::PermissionDenied) => (
            "file is locked by another program or cannot be read".to_string(),
            false,
        ),
        Some(ReadFailureKind::UnreadableContainer) => {
            ("file is corrupted or unreadable".to_string(), true)
        }
        Some(ReadFailureKind::Generic) | None => (format!("failed to read file: {}", error), false),
    }
}
