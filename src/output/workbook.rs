//! Spreadsheet Renderer
//!
//! 表データをXLSXワークブックとして書き出すレンダラー。
//! 単一シートの書き出しと、入力ワークブックの全シートを1つのファイルにまとめる書き出しに対応します。

use std::collections::HashSet;
use std::path::Path;

use log::warn;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::api::SheetSelector;
use crate::error::{ConversionError, ReadError};
use crate::parser::WorkbookReader;
use crate::security::sanitize_sheet_name;
use crate::types::{CellValue, SpreadsheetTable};

/// 日時セルの表示形式
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// XLSX形式のレンダラー
pub(crate) struct XlsxRenderer;

impl XlsxRenderer {
    /// 表をXLSXファイルとして書き出す
    ///
    /// 表ごとに1つのワークシートを作成し、シート名は元のシート名を使用します
    /// （Excelで使えない文字は置換され、重複は連番で区別されます）。
    ///
    /// # 引数
    ///
    /// * `tables` - 表データ（シート順）
    /// * `path` - 出力ファイルのパス
    pub fn render(&self, tables: &[SpreadsheetTable], path: &Path) -> Result<(), ConversionError> {
        let mut workbook = Workbook::new();
        let datetime_format = Format::new().set_num_format(DATETIME_FORMAT);
        let mut used_names = HashSet::new();

        for table in tables {
            let name = unique_sheet_name(table.sheet_name(), &mut used_names);
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&name)?;
            write_table(worksheet, table, &datetime_format)?;
        }

        if tables.is_empty() {
            workbook.add_worksheet();
        }

        workbook.save(path)?;
        Ok(())
    }

    /// 入力ワークブックの全シートを1つのXLSXファイルに書き出す
    ///
    /// 全シートの列挙・読み込みのいずれかに失敗した場合は、
    /// 先頭シートのみの書き出しにフォールバックします。
    ///
    /// # 引数
    ///
    /// * `reader` - ワークブックリーダー
    /// * `input` - 入力ファイルのパス
    /// * `path` - 出力ファイルのパス
    /// * `row_limit` - シートごとの最大データ行数
    pub fn render_workbook(
        &self,
        reader: &WorkbookReader,
        input: &Path,
        path: &Path,
        row_limit: Option<usize>,
    ) -> Result<(), ConversionError> {
        let all_sheets = reader.sheet_names(input).and_then(|names| {
            names
                .into_iter()
                .map(|name| reader.read(input, &SheetSelector::Name(name), row_limit))
                .collect::<Result<Vec<_>, _>>()
        });

        let tables = with_first_sheet_fallback(input, all_sheets, || {
            reader.read(input, &SheetSelector::First, row_limit)
        })?;

        self.render(&tables, path)
    }
}

/// 全シートの読み込み結果を確定する
///
/// 全シートの読み込みが失敗していれば、`first_sheet`で先頭シートのみを読み込みます。
fn with_first_sheet_fallback(
    input: &Path,
    all_sheets: Result<Vec<SpreadsheetTable>, ReadError>,
    first_sheet: impl FnOnce() -> Result<SpreadsheetTable, ReadError>,
) -> Result<Vec<SpreadsheetTable>, ReadError> {
    match all_sheets {
        Ok(tables) => Ok(tables),
        Err(e) => {
            warn!(
                "Could not read every sheet of '{}', converting the first sheet only: {}",
                input.display(),
                e
            );
            Ok(vec![first_sheet()?])
        }
    }
}

/// 表をワークシートに書き込む
///
/// 列名が先頭行から取り出された表のみ、ヘッダー行を書き込みます。
/// 空セルは書き込みません。
fn write_table(
    worksheet: &mut Worksheet,
    table: &SpreadsheetTable,
    datetime_format: &Format,
) -> Result<(), XlsxError> {
    let mut row: u32 = 0;

    if table.has_named_columns() {
        for (col, name) in table.columns().iter().enumerate() {
            if !name.is_empty() {
                worksheet.write_string(row, column(col), name)?;
            }
        }
        row += 1;
    }

    for cells in table.rows() {
        for (col, cell) in cells.iter().enumerate() {
            let col = column(col);
            match cell {
                CellValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                CellValue::Int(i) => {
                    worksheet.write_number(row, col, *i as f64)?;
                }
                CellValue::Real(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                CellValue::DateTime(dt) => {
                    worksheet.write_datetime_with_format(row, col, dt, datetime_format)?;
                }
                CellValue::Empty => {}
            }
        }
        row += 1;
    }

    Ok(())
}

/// 列インデックスをワークシートの列番号に変換
///
/// 範囲外の値は上限に丸められ、書き込み時にエラーとして報告されます。
fn column(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

/// 重複しないシート名を生成
fn unique_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_sheet_name(name);
    let mut candidate = base.clone();
    let mut counter = 2;

    while !used.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({})", counter);
        let keep = 31usize.saturating_sub(suffix.chars().count());
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        counter += 1;
    }

    candidate
}
