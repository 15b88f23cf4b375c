//! Workbook Reader
//!
//! 候補エンジンを順に試行し、最初に成功したエンジンの結果を採用する読み込み処理。
//! 各エンジンの失敗は分類済みの`EngineFailure`として記録され、
//! すべての候補が失敗した場合にのみ`ReadError::Exhausted`として報告されます。

use std::fs;
use std::io::Cursor;
use std::path::Path;

use calamine::{Cell, Data, DataType, Range, Reader, Sheets, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::api::SheetSelector;
use crate::error::{EngineFailure, ReadError};
use crate::formatter::DateFormatter;
use crate::parser::engine::{classify, classify_io, Engine, Workbook};
use crate::parser::text::recover_text;
use crate::types::{CellValue, SpreadsheetTable};

/// シート一覧の取得にすべて失敗した場合に返す仮のシート名
pub const PLACEHOLDER_SHEET: &str = "Sheet1";

/// 1回の試行の失敗
enum AttemptError {
    /// エンジンが失敗した（次の候補へ進む）
    Engine(calamine::Error),

    /// 厳格モードで指定シートが存在しない（候補の試行を打ち切る）
    SheetNotFound {
        requested: String,
        available: Vec<String>,
    },
}

impl From<calamine::Error> for AttemptError {
    fn from(error: calamine::Error) -> Self {
        AttemptError::Engine(error)
    }
}

/// ワークブックリーダー
///
/// 拡張子から決まる候補エンジンを順に試行して、シートを`SpreadsheetTable`に読み込みます。
#[derive(Debug, Clone)]
pub(crate) struct WorkbookReader {
    /// 入力ファイルの最大サイズ（バイト）
    max_input_size: u64,
    /// 存在しないシート名をエラーにするかどうか
    strict_sheet_names: bool,
}

impl WorkbookReader {
    /// 新しいWorkbookReaderインスタンスを生成
    pub fn new(max_input_size: u64, strict_sheet_names: bool) -> Self {
        Self {
            max_input_size,
            strict_sheet_names,
        }
    }

    /// シートを読み込む
    ///
    /// # 引数
    ///
    /// * `path` - 入力ファイルのパス
    /// * `selector` - 読み込むシート
    /// * `row_limit` - 読み込む最大データ行数（ヘッダー行は含まない）
    ///
    /// XLSXで`row_limit`が指定された場合は、制限を超えた時点で解析を打ち切ります。
    /// このとき列の範囲は読み込んだ行に現れる列のみになります。
    ///
    /// # 戻り値
    ///
    /// * `Ok(SpreadsheetTable)` - いずれかのエンジンが成功した場合
    /// * `Err(ReadError)` - すべてのエンジンが失敗した場合
    ///
    /// # シートのフォールバック
    ///
    /// 存在しないシート名・範囲外のインデックスは、既定では先頭シートに置き換えられます
    /// （警告ログを出力）。厳格モードでは`ReadError::SheetNotFound`になります。
    pub fn read(
        &self,
        path: &Path,
        selector: &SheetSelector,
        row_limit: Option<usize>,
    ) -> Result<SpreadsheetTable, ReadError> {
        self.with_workbook(path, |engine, workbook| {
            let names = sheet_names(engine, workbook);
            if names.is_empty() {
                return Err(calamine::Error::Msg("workbook contains no sheets").into());
            }

            let index = self.resolve_sheet(path, &names, selector)?;

            // 行数制限付きのXLSXは先頭行のみをストリーミングで読む
            if let (Some(limit), Sheets::Xlsx(xlsx)) = (row_limit, &mut *workbook) {
                let (range, has_header) = read_leading_rows(xlsx, &names[index], limit)?;
                return Ok(table_from_range(
                    engine,
                    &names[index],
                    &range,
                    row_limit,
                    has_header,
                ));
            }

            let range = workbook.worksheet_range_at(index).ok_or(calamine::Error::Msg(
                "worksheet disappeared while reading",
            ))??;

            Ok(build_table(engine, &names[index], &range, row_limit))
        })
    }

    /// シート名の一覧を取得
    ///
    /// 失敗した場合は`ReadError`を返します。入力検証で使用します。
    pub fn sheet_names(&self, path: &Path) -> Result<Vec<String>, ReadError> {
        self.with_workbook(path, |engine, workbook| Ok(sheet_names(engine, workbook)))
    }

    /// シート名の一覧を取得（助言用）
    ///
    /// すべてのエンジンが失敗した場合は、仮のシート名1件を返します。
    pub fn list_sheets(&self, path: &Path) -> Vec<String> {
        match self.sheet_names(path) {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => vec![PLACEHOLDER_SHEET.to_string()],
            Err(e) => {
                warn!("Failed to list sheets of '{}': {}", path.display(), e);
                vec![PLACEHOLDER_SHEET.to_string()]
            }
        }
    }

    /// 候補エンジンを順に試行する
    ///
    /// 最初に成功したエンジンの結果を返します。
    fn with_workbook<T>(
        &self,
        path: &Path,
        mut attempt: impl FnMut(Engine, &mut Workbook) -> Result<T, AttemptError>,
    ) -> Result<T, ReadError> {
        let candidates = Engine::candidates_for(path);
        let bytes = self.load(path, candidates)?;

        let mut attempts = Vec::with_capacity(candidates.len());
        for &engine in candidates {
            let result = engine
                .open(bytes.clone())
                .map_err(AttemptError::from)
                .and_then(|mut workbook| attempt(engine, &mut workbook));

            match result {
                Ok(value) => {
                    debug!("Read '{}' with engine {}", path.display(), engine);
                    return Ok(value);
                }
                Err(AttemptError::Engine(error)) => {
                    let kind = classify(&error);
                    warn!(
                        "Engine {} could not read '{}': {}",
                        engine,
                        path.display(),
                        kind.advisory()
                    );
                    attempts.push(EngineFailure {
                        engine,
                        kind,
                        message: error.to_string(),
                    });
                }
                Err(AttemptError::SheetNotFound {
                    requested,
                    available,
                }) => {
                    return Err(ReadError::SheetNotFound {
                        path: path.to_path_buf(),
                        sheet: requested,
                        available,
                    });
                }
            }
        }

        Err(ReadError::Exhausted {
            path: path.to_path_buf(),
            attempts,
        })
    }

    /// ファイルをメモリに読み込む
    ///
    /// 読み込みに失敗した場合は、すべての候補エンジンの失敗として報告します。
    fn load(&self, path: &Path, candidates: &[Engine]) -> Result<Vec<u8>, ReadError> {
        let exhausted = |error: std::io::Error| ReadError::Exhausted {
            path: path.to_path_buf(),
            attempts: candidates
                .iter()
                .map(|&engine| EngineFailure {
                    engine,
                    kind: classify_io(&error),
                    message: error.to_string(),
                })
                .collect(),
        };

        // セキュリティチェック: 入力ファイルサイズの上限
        let size = fs::metadata(path).map_err(exhausted)?.len();
        if size > self.max_input_size {
            return Err(ReadError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_input_size,
            });
        }

        fs::read(path).map_err(exhausted)
    }

    /// シート選択をインデックスに解決
    fn resolve_sheet(
        &self,
        path: &Path,
        names: &[String],
        selector: &SheetSelector,
    ) -> Result<usize, AttemptError> {
        let (found, requested) = match selector {
            SheetSelector::First => return Ok(0),
            SheetSelector::Index(i) => ((*i < names.len()).then_some(*i), format!("#{}", i)),
            SheetSelector::Name(name) => (names.iter().position(|n| n == name), name.clone()),
        };

        match found {
            Some(index) => Ok(index),
            None if self.strict_sheet_names => Err(AttemptError::SheetNotFound {
                requested,
                available: names.to_vec(),
            }),
            None => {
                warn!(
                    "Sheet '{}' not found in '{}', falling back to '{}'",
                    requested,
                    path.display(),
                    names[0]
                );
                Ok(0)
            }
        }
    }
}

/// シート名を取得（レガシーエンジンでは文字化けを回復）
fn sheet_names(engine: Engine, workbook: &Workbook) -> Vec<String> {
    let names = workbook.sheet_names();
    if engine.is_legacy() {
        names
            .iter()
            .map(|name| recover_text(name).into_owned())
            .collect()
    } else {
        names.to_vec()
    }
}

/// XLSXシートの先頭行をストリーミングで読み込む
///
/// 先頭行（ヘッダー候補）と`limit`行分のセルだけを集め、それより後ろのセルが
/// 現れた時点で解析を止めます。
///
/// # 戻り値
///
/// 読み込んだ範囲と、シートが2行以上あるか（先頭行を列名とするか）の組
fn read_leading_rows(
    xlsx: &mut Xlsx<Cursor<Vec<u8>>>,
    sheet_name: &str,
    limit: usize,
) -> Result<(Range<Data>, bool), calamine::Error> {
    let mut reader = xlsx.worksheet_cells_reader(sheet_name)?;
    let mut cells: Vec<Cell<Data>> = Vec::new();
    let mut first_row: Option<u32> = None;
    let mut has_more = false;

    while let Some(cell) = reader.next_cell()? {
        let value = Data::from(cell.get_value().clone());
        if value.is_empty() {
            continue;
        }

        let (row, col) = cell.get_position();
        let first = *first_row.get_or_insert(row);
        if u64::from(row) > u64::from(first) + limit as u64 {
            has_more = true;
            break;
        }
        cells.push(Cell::new((row, col), value));
    }

    let Some(first) = first_row else {
        return Ok((Range::empty(), false));
    };

    let last_seen = cells.iter().map(|c| c.get_position().0).max().unwrap_or(first);
    let last_row = if has_more {
        let bound = u64::from(first) + limit as u64;
        u32::try_from(bound).unwrap_or(u32::MAX)
    } else {
        last_seen
    };
    let first_col = cells.iter().map(|c| c.get_position().1).min().unwrap_or(0);
    let last_col = cells.iter().map(|c| c.get_position().1).max().unwrap_or(0);

    let mut range = Range::new((first, first_col), (last_row, last_col));
    for cell in cells {
        let position = cell.get_position();
        range.set_value(position, cell.get_value().clone());
    }

    Ok((range, has_more || last_row > first))
}

/// セル範囲から表を構築
///
/// シート全体が2行以上ある場合、先頭行を列名とします。
/// 行数制限はヘッダー行を除いたデータ行に対して適用されます。
fn build_table(
    engine: Engine,
    sheet_name: &str,
    range: &Range<Data>,
    row_limit: Option<usize>,
) -> SpreadsheetTable {
    table_from_range(engine, sheet_name, range, row_limit, range.height() > 1)
}

fn table_from_range(
    engine: Engine,
    sheet_name: &str,
    range: &Range<Data>,
    row_limit: Option<usize>,
    has_header: bool,
) -> SpreadsheetTable {
    let take = row_limit
        .map(|limit| limit.saturating_add(usize::from(has_header)))
        .unwrap_or(usize::MAX);

    let rows = range
        .rows()
        .take(take)
        .map(|row| row.iter().map(|cell| convert_cell(engine, cell)).collect())
        .collect();

    SpreadsheetTable::from_rows(sheet_name, rows, has_header)
}

/// calamineのセルを`CellValue`に変換
fn convert_cell(engine: Engine, cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) if engine.is_legacy() && is_integral(*f) => CellValue::Int(*f as i64),
        Data::Float(f) => CellValue::Real(*f),
        Data::String(s) if engine.is_legacy() => CellValue::Text(recover_text(s).into_owned()),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => {
            CellValue::Text(DateFormatter.format_duration(dt.as_f64()))
        }
        // エポック（1900/1904）はcalamineが保持している
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Real(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        Data::Empty => CellValue::Empty,
        #[allow(unreachable_patterns)]
        _ => match cell.as_string() {
            Some(s) => CellValue::Text(s),
            None => CellValue::Empty,
        },
    }
}

/// 整数として表現できる値かどうか
fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    s.parse::<NaiveDateTime>().ok().or_else(|| {
        s.parse::<NaiveDate>()
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}
