//! Public API Types
//!
//! 公開APIで使用する列挙型・パラメータ型を定義するモジュール。
//! 出力形式ごとのパラメータは文字列キーの辞書ではなく、型付きの直和型で表現します。

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// 出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 区切り文字付きテキスト（CSV）
    Csv,

    /// ページ分割された文書（PDF）
    Pdf,

    /// スプレッドシート（XLSX）
    Xlsx,
}

impl OutputFormat {
    /// 出力ファイルの拡張子（ドットなし）
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Xlsx => "xlsx",
        }
    }

    /// シートごとに独立した出力を生成できる形式かどうか
    ///
    /// XLSXは1つのワークブックに全シートを書き込めるため、`false`になります。
    pub fn supports_per_sheet_outputs(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Pdf)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConversionError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "pdf" => Ok(OutputFormat::Pdf),
            "xlsx" => Ok(OutputFormat::Xlsx),
            _ => Err(ConversionError::UnsupportedFormat(tag.to_string())),
        }
    }
}

/// CSV出力の文字エンコーディング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// UTF-8（出力時はBOM付きに昇格）
    #[default]
    Utf8,

    /// BOM付きUTF-8
    Utf8Bom,

    /// GBK（簡体字中国語の8ビット地域エンコーディング）
    Gbk,

    /// Latin-1系（windows-1252）
    Latin1,
}

impl TextEncoding {
    /// 実際に書き出すエンコーディング
    ///
    /// 素のUTF-8はBOM付きUTF-8に昇格します。
    /// 表計算ソフトがエンコーディングを自動判別できるようにするためです。
    pub fn effective(&self) -> TextEncoding {
        match self {
            TextEncoding::Utf8 => TextEncoding::Utf8Bom,
            other => *other,
        }
    }
}

/// CSVのフィールド区切り文字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// カンマ（,）
    #[default]
    Comma,

    /// セミコロン（;）
    Semicolon,

    /// タブ
    Tab,

    /// 縦線（|）
    Pipe,
}

impl Delimiter {
    /// 区切り文字
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
            Delimiter::Tab => '\t',
            Delimiter::Pipe => '|',
        }
    }
}

/// PDFのページサイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// A4（210 × 297 mm）
    #[default]
    A4,

    /// A3（297 × 420 mm）
    A3,

    /// Letter（216 × 279 mm）
    Letter,
}

impl PageSize {
    /// 縦向きの寸法（幅, 高さ）をミリメートルで返す
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::A3 => (297.0, 420.0),
            PageSize::Letter => (216.0, 279.0),
        }
    }
}

/// PDFのページ方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// 縦向き
    #[default]
    Portrait,

    /// 横向き（幅と高さを入れ替える）
    Landscape,
}

/// CSV出力のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabularTextParams {
    /// 文字エンコーディング
    pub encoding: TextEncoding,
    /// フィールド区切り文字
    pub delimiter: Delimiter,
}

/// PDF出力のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentParams {
    /// ページサイズ
    pub page_size: PageSize,
    /// ページ方向
    pub orientation: Orientation,
}

impl DocumentParams {
    /// 方向を適用したページ寸法（幅, 高さ）
    pub fn page_dimensions_mm(&self) -> (f32, f32) {
        let (width, height) = self.page_size.dimensions_mm();
        match self.orientation {
            Orientation::Portrait => (width, height),
            Orientation::Landscape => (height, width),
        }
    }
}

/// XLSX出力のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpreadsheetParams {
    /// シートごとに読み込む最大データ行数（`None`は無制限）
    pub row_limit: Option<usize>,
}

/// 出力形式ごとのパラメータ
///
/// バリアントが出力形式を決定します。ジョブ生成時に一度だけ選択されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum FormatParams {
    /// CSV
    Csv(TabularTextParams),

    /// PDF
    Pdf(DocumentParams),

    /// XLSX
    Xlsx(SpreadsheetParams),
}

impl FormatParams {
    /// 出力形式ごとの既定パラメータ
    pub fn default_for(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => FormatParams::Csv(TabularTextParams::default()),
            OutputFormat::Pdf => FormatParams::Pdf(DocumentParams::default()),
            OutputFormat::Xlsx => FormatParams::Xlsx(SpreadsheetParams::default()),
        }
    }

    /// 形式タグから既定パラメータを生成
    ///
    /// 未知のタグは`ConversionError::UnsupportedFormat`になります。
    pub fn from_tag(tag: &str) -> Result<Self, ConversionError> {
        Ok(Self::default_for(tag.parse()?))
    }

    /// パラメータが表す出力形式
    pub fn format(&self) -> OutputFormat {
        match self {
            FormatParams::Csv(_) => OutputFormat::Csv,
            FormatParams::Pdf(_) => OutputFormat::Pdf,
            FormatParams::Xlsx(_) => OutputFormat::Xlsx,
        }
    }
}

/// 読み込むシートの選択
///
/// 存在しない名前や範囲外のインデックスは、既定では先頭シートにフォールバックします。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SheetSelector {
    /// インデックス指定（0始まり）
    Index(usize),

    /// 名前指定
    Name(String),

    /// 先頭シート
    #[default]
    First,
}

impl From<Option<String>> for SheetSelector {
    fn from(name: Option<String>) -> Self {
        match name {
            Some(name) => SheetSelector::Name(name),
            None => SheetSelector::First,
        }
    }
}

/// バッチ実行時のシート処理方針
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SheetPolicy {
    /// すべてのシート
    ///
    /// CSV/PDFでは複数シートのファイルをシートごとのジョブに展開します。
    #[default]
    AllSheets,

    /// 先頭シートのみ
    FirstSheetOnly,

    /// ファイルごとに指定したシート（キーはアップロード時のファイル名）
    ///
    /// シート名が指定されていないファイルはスキップされます。
    SpecificSheets(HashMap<String, String>),
}
