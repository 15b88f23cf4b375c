//! Tabular Text Renderer
//!
//! 表データを区切り文字付きテキスト（CSV）として書き出すレンダラー。

use std::fs;
use std::path::Path;

use encoding_rs::{EncoderResult, Encoding, GBK, WINDOWS_1252};

use crate::api::{TabularTextParams, TextEncoding};
use crate::error::ConversionError;
use crate::types::SpreadsheetTable;

/// UTF-8のバイトオーダーマーク
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// エンコードできない文字の代替
const PLACEHOLDER: u8 = b'?';

/// CSV形式のレンダラー
pub(crate) struct CsvRenderer;

impl CsvRenderer {
    /// 表をCSVファイルとして書き出す
    ///
    /// # 引数
    ///
    /// * `table` - 表データ
    /// * `path` - 出力ファイルのパス
    /// * `params` - エンコーディングと区切り文字
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - 書き出しに成功した場合
    /// * `Err(ConversionError::Io)` - ファイルの書き込みに失敗した場合
    ///
    /// エンコードできない文字は`?`に置き換えられ、エラーにはなりません。
    pub fn render(
        &self,
        table: &SpreadsheetTable,
        path: &Path,
        params: &TabularTextParams,
    ) -> Result<(), ConversionError> {
        let text = self.to_text(table, params.delimiter.as_char());
        let bytes = encode(&text, params.encoding.effective());
        fs::write(path, bytes)?;
        Ok(())
    }

    /// 表をCSV文字列に変換
    ///
    /// 列名が先頭行から取り出された表のみ、ヘッダー行を出力します。
    pub fn to_text(&self, table: &SpreadsheetTable, delimiter: char) -> String {
        let mut out = String::new();

        if table.has_named_columns() {
            push_record(&mut out, table.columns().iter().map(String::as_str), delimiter);
        }

        for row in table.text_rows() {
            push_record(&mut out, row.iter().map(String::as_str), delimiter);
        }

        out
    }
}

/// 1レコードを追記
fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>, delimiter: char) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(&escape_field(field, delimiter));
    }
    out.push('\n');
}

/// CSVフィールドをエスケープ
///
/// ダブルクォート、改行、区切り文字を含む場合はダブルクォートで囲み、
/// 内部のダブルクォートは2つにエスケープします。
fn escape_field(s: &str, delimiter: char) -> String {
    if s.contains(delimiter) || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// 文字列を指定エンコーディングのバイト列に変換
fn encode(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Utf8Bom => {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
            out.extend_from_slice(&UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            out
        }
        TextEncoding::Gbk => encode_lossy(GBK, text),
        TextEncoding::Latin1 => encode_lossy(WINDOWS_1252, text),
    }
}

/// エンコードできない文字を`?`に置き換えながら変換
fn encode_lossy(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len() + 16);
    let mut remaining = text;

    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(remaining, &mut out, true);
        remaining = &remaining[read..];

        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => out.reserve(remaining.len() * 2 + 16),
            EncoderResult::Unmappable(_) => {
                if out.len() == out.capacity() {
                    out.reserve(remaining.len() + 16);
                }
                out.push(PLACEHOLDER);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Delimiter;
    use crate::types::CellValue;

    fn sample() -> SpreadsheetTable {
        SpreadsheetTable::from_rows(
            "S",
            vec![
                vec![CellValue::Text("name".into()), CellValue::Text("note".into())],
                vec![CellValue::Text("a,b".into()), CellValue::Text("say \"hi\"".into())],
                vec![CellValue::Int(7), CellValue::Empty],
            ],
            true,
        )
    }

    #[test]
    fn test_to_text_escapes_fields() {
        let text = CsvRenderer.to_text(&sample(), ',');
        assert_eq!(text, "name,note\n\"a,b\",\"say \"\"hi\"\"\"\n7,\n");
    }

    #[test]
    fn test_to_text_with_semicolon() {
        let text = CsvRenderer.to_text(&sample(), ';');
        assert!(text.starts_with("name;note\n"));
        assert!(text.contains("a,b;"));
    }

    #[test]
    fn test_positional_columns_have_no_header() {
        let table = SpreadsheetTable::from_rows(
            "S",
            vec![vec![CellValue::Text("x".into()), CellValue::Int(1)]],
            false,
        );
        assert_eq!(CsvRenderer.to_text(&table, '|'), "x|1\n");
    }

    #[test]
    fn test_utf8_is_written_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let params = TabularTextParams {
            encoding: TextEncoding::Utf8,
            delimiter: Delimiter::Comma,
        };
        CsvRenderer.render(&sample(), &path, &params).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &UTF8_BOM);
        assert_eq!(&bytes[3..8], b"name,");
    }

    #[test]
    fn test_gbk_encoding() {
        let bytes = encode("中文", TextEncoding::Gbk);
        assert_eq!(bytes, vec![0xD6, 0xD0, 0xCE, 0xC4]);
    }

    #[test]
    fn test_unmappable_characters_degrade() {
        assert_eq!(encode("a😀b", TextEncoding::Gbk), b"a?b".to_vec());
        assert_eq!(encode("é日", TextEncoding::Latin1), vec![0xE9, b'?']);
    }
}
