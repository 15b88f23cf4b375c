//! Security Module
//!
//! ファイル名・シート名の無害化とアーカイブエントリ名の検証を行うモジュール。
//! アップロードされたファイル名によるパストラバーサルを防ぎます。

/// 変換対象として受け付ける入力ファイルの拡張子
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];

/// ファイル名に使用できない文字
const INVALID_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// シート名に使用できない文字
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// シート名の最大文字数
const MAX_SHEET_NAME_CHARS: usize = 31;

/// ファイル名を無害化
///
/// # 引数
///
/// * `name` - アップロード時のファイル名など
///
/// # 戻り値
///
/// 使用できない文字と制御文字を`_`に置き換え、前後の空白とドットを取り除いた名前。
/// 結果が空になる場合は`"file"`を返します。
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// ワークシート名を無害化
///
/// Excelで使用できない文字を`_`に置き換え、31文字に切り詰めます。
/// 前後のアポストロフィは取り除かれ、空になる場合は`"Sheet"`を返します。
pub fn sanitize_sheet_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed: String = replaced
        .trim_matches('\'')
        .chars()
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    let trimmed = trimmed.trim_end_matches('\'');

    if trimmed.is_empty() {
        "Sheet".to_string()
    } else if trimmed.eq_ignore_ascii_case("history") {
        // Excelの予約名
        format!("{}_", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// 入力ファイルの拡張子が変換対象かどうか
pub fn is_supported_input(extension: &str) -> bool {
    SUPPORTED_INPUT_EXTENSIONS
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension))
}

/// アーカイブエントリ名の検証
///
/// アーカイブは階層を持たないため、ディレクトリ区切りを含む名前は拒否します。
///
/// # 引数
///
/// * `name` - エントリ名
///
/// # 戻り値
///
/// * `Ok(())` - 名前が安全な場合
/// * `Err(String)` - 名前が危険な場合（空、`..`、区切り文字を含む）
pub(crate) fn validate_archive_entry(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Empty entry name is not allowed".to_string());
    }

    if name == "." || name == ".." {
        return Err(format!("Path traversal detected: {}", name));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(format!("Directory separator in entry name: {}", name));
    }

    Ok(())
}
