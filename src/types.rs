//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::api::{FormatParams, OutputFormat};
use crate::formatter::CellFormatter;

/// セルの値を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 文字列
    Text(String),

    /// 整数
    Int(i64),

    /// 実数
    Real(f64),

    /// 論理値
    Bool(bool),

    /// 日時
    DateTime(NaiveDateTime),

    /// 空セル（欠損値）
    Empty,
}

impl CellValue {
    /// 値が空かどうかを判定
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// 値を文字列として取得
    ///
    /// 欠損値は空文字列になります。
    pub fn to_text(&self) -> String {
        CellFormatter::new().format(self)
    }
}

/// 正規化された表データ
///
/// 列名の並びと行の並びを持ちます。すべての行は列名と同じセル数を持ちます。
/// 生成後は変更されません。
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetTable {
    sheet_name: String,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    named_columns: bool,
}

impl SpreadsheetTable {
    /// 列名と行から表を生成
    ///
    /// 行の長さは列数に揃えられます（不足は空セルで補完、超過は切り捨て）。
    pub fn new(
        sheet_name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    ) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self {
            sheet_name: sheet_name.into(),
            columns,
            rows,
            named_columns: true,
        }
    }

    /// 生の行データから表を生成
    ///
    /// `has_header`が`true`の場合、先頭行を列名として取り出します。
    /// そうでない場合は位置ベースの列名（"0", "1", ...）を付与します。
    pub fn from_rows(
        sheet_name: impl Into<String>,
        mut rows: Vec<Vec<CellValue>>,
        has_header: bool,
    ) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        if has_header && !rows.is_empty() {
            let header = rows.remove(0);
            let mut columns: Vec<String> = header.iter().map(CellValue::to_text).collect();
            columns.resize(width, String::new());
            return Self::new(sheet_name, columns, rows);
        }

        let columns = (0..width).map(|i| i.to_string()).collect();
        let mut table = Self::new(sheet_name, columns, rows);
        table.named_columns = false;
        table
    }

    /// 表の読み込み元シート名
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// 列名
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// データ行（ヘッダーを含まない）
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// 列名が先頭行から取り出されたものかどうか
    pub fn has_named_columns(&self) -> bool {
        self.named_columns
    }

    /// 列数
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// データ行数
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// 列も行もない表かどうか
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// セル数（ヘッダー行を含む）
    ///
    /// シート単位のラウンドトリップ比較に使用します。
    pub fn cell_count(&self) -> usize {
        let header = if self.named_columns { self.width() } else { 0 };
        header + self.width() * self.height()
    }

    /// 各行を文字列化したもの
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        let formatter = CellFormatter::new();
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| formatter.format(cell)).collect())
            .collect()
    }
}

/// アップロードされたファイルの記述子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// 一時保存先のパス
    pub path: PathBuf,
    /// アップロード時のファイル名
    pub name: String,
    /// 申告されたサイズ（バイト）
    pub size: u64,
}

impl UploadedFile {
    /// 新しい記述子を生成
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size,
        }
    }

    /// 拡張子を除いたファイル名
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// 1件の変換ジョブ
///
/// バッチ展開時に生成され、変換器によって一度だけ消費されます。
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    /// 入力ファイル
    pub input: PathBuf,
    /// 出力ファイル
    pub output: PathBuf,
    /// 出力形式ごとのパラメータ（形式を決定する）
    pub params: FormatParams,
    /// 対象シート（`None`は先頭シート、XLSXでは全シート）
    pub sheet: Option<String>,
    /// エラーメッセージや進捗表示に使うファイル名
    pub display_name: String,
    /// 申告された入力サイズ（バイト）
    pub size: u64,
}

impl ConversionJob {
    /// 出力形式
    pub fn format(&self) -> OutputFormat {
        self.params.format()
    }
}

/// バッチ全体の集計結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// ジョブ総数
    pub total: usize,
    /// 成功したジョブ数
    pub success: usize,
    /// 失敗したジョブ数
    pub failed: usize,
    /// `"{ファイル名}: {原因}"`形式のエラー一覧
    pub errors: Vec<String>,
    /// 成功したジョブの出力ファイル
    pub output_files: Vec<PathBuf>,
}

/// 入力ファイルの基本情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFileInfo {
    /// ファイル名
    pub name: String,
    /// サイズ（バイト）
    pub size: u64,
    /// 拡張子（ドットなし、小文字）
    pub extension: String,
}

/// 入力ファイルの検証結果
///
/// 検証失敗はエラーとして返さず、この構造体で報告します。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// 変換対象として受け付けられるかどうか
    pub valid: bool,
    /// 受け付けられない理由
    pub error: Option<String>,
    /// ファイル情報
    pub file_info: Option<InputFileInfo>,
    /// シート名一覧
    pub sheets: Vec<String>,
    /// 助言・警告
    pub warnings: Vec<String>,
}

/// 出力ファイルの情報（一覧・ダウンロード用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// ファイル名
    pub name: String,
    /// サイズ（バイト）
    pub size: u64,
    /// 人間向けのサイズ表記（例: "1.5KB"）
    pub size_formatted: String,
    /// 拡張子（ドット付き、小文字）
    pub extension: String,
    /// MIMEタイプ
    pub mime_type: String,
    /// ファイルが存在するかどうか
    pub exists: bool,
    /// フルパス
    pub path: PathBuf,
}
