//! Reading Engines
//!
//! 読み込みエンジン（解析戦略）の定義と、calamineエラーの分類。

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader, Sheets, Xls, XlsError, Xlsx, XlsxError};

use crate::error::ReadFailureKind;

/// calamineで開いたワークブック（メモリ上のバイト列から読み込む）
pub(crate) type Workbook = Sheets<Cursor<Vec<u8>>>;

/// 読み込みエンジン
///
/// 拡張子ごとに試行順の候補リストが決まります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// XLSX（Office Open XML）専用エンジン
    Xlsx,

    /// レガシーXLS（BIFF）専用エンジン
    ///
    /// 文字列の文字化け回復と整数化を行います。
    LegacyXls,

    /// 内容からコンテナ形式を判別する汎用エンジン
    AutoDetect,
}

impl Engine {
    /// ファイル拡張子から候補エンジンを試行順に返す
    ///
    /// # 引数
    ///
    /// * `path` - 入力ファイルのパス
    ///
    /// # 戻り値
    ///
    /// 試行順のエンジン列（空になることはありません）
    pub fn candidates_for(path: &Path) -> &'static [Engine] {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" | "xlsm" => &[Engine::Xlsx],
            "xls" => &[Engine::LegacyXls, Engine::AutoDetect],
            _ => &[Engine::AutoDetect],
        }
    }

    /// レガシーXLS固有のセル変換（文字化け回復・整数化）を行うかどうか
    pub fn is_legacy(&self) -> bool {
        matches!(self, Engine::LegacyXls)
    }

    /// バイト列をこのエンジンで開く
    pub(crate) fn open(&self, bytes: Vec<u8>) -> Result<Workbook, calamine::Error> {
        let cursor = Cursor::new(bytes);
        match self {
            Engine::Xlsx => Ok(Sheets::Xlsx(Xlsx::new(cursor)?)),
            Engine::LegacyXls => Ok(Sheets::Xls(Xls::new(cursor)?)),
            Engine::AutoDetect => open_workbook_auto_from_rs(cursor),
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Engine::Xlsx => "xlsx",
            Engine::LegacyXls => "legacy-xls",
            Engine::AutoDetect => "auto-detect",
        };
        f.write_str(label)
    }
}

/// calamineのエラーを失敗分類に変換
///
/// エラーメッセージの文字列ではなく、エラーのバリアントで判定します。
pub(crate) fn classify(error: &calamine::Error) -> ReadFailureKind {
    match error {
        calamine::Error::Io(e) => classify_io(e),
        calamine::Error::Xlsx(XlsxError::Io(e)) => classify_io(e),
        calamine::Error::Xlsx(XlsxError::Zip(_)) => ReadFailureKind::CorruptArchive,
        calamine::Error::Xlsx(XlsxError::Xml(_)) => ReadFailureKind::CorruptArchive,
        calamine::Error::Xls(XlsError::Io(e)) => classify_io(e),
        calamine::Error::Xls(XlsError::Cfb(_)) => ReadFailureKind::WrongFormat,
        _ => ReadFailureKind::Generic,
    }
}

/// I/Oエラーを失敗分類に変換
pub(crate) fn classify_io(error: &std::io::Error) -> ReadFailureKind {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => ReadFailureKind::PermissionDenied,
        _ => ReadFailureKind::UnreadableContainer,
    }
}
