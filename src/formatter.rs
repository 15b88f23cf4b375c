//! Formatter Module
//!
//! セル値の文字列化と、経過時間の書式化を提供するモジュール。

use chrono::{NaiveDateTime, Timelike};

use crate::types::CellValue;

/// セルフォーマッター
///
/// すべてのレンダラーが同じ規則でセルを文字列化するためのファサードです。
#[derive(Debug, Default)]
pub(crate) struct CellFormatter;

impl CellFormatter {
    /// 新しいCellFormatterインスタンスを生成
    pub fn new() -> Self {
        Self
    }

    /// セル値をフォーマット
    ///
    /// # 引数
    ///
    /// * `value` - セル値
    ///
    /// # 戻り値
    ///
    /// フォーマット済み文字列（欠損値は空文字列）
    pub fn format(&self, value: &CellValue) -> String {
        match value {
            CellValue::Text(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Real(n) => n.to_string(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => format_datetime(dt),
            CellValue::Empty => String::new(),
        }
    }
}

/// 日時をISO 8601形式で出力
///
/// 時刻が0時ちょうどの場合は日付のみを出力します。
fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// 日付フォーマッター
///
/// 日時への変換はcalamineがワークブックのエポック設定に従って行うため、
/// ここでは経過時間の書式化のみを扱います。
#[derive(Debug)]
pub(crate) struct DateFormatter;

impl DateFormatter {
    /// 時間（経過時間）を`HH:MM:SS`形式で出力
    ///
    /// 24時間を超える場合も時の桁はそのまま増えます。
    pub fn format_duration(&self, serial_value: f64) -> String {
        let total = (serial_value.abs() * 86_400.0).round() as i64;
        let sign = if serial_value < 0.0 { "-" } else { "" };
        format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}
