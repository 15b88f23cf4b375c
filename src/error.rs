//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use std::path::PathBuf;

use thiserror::Error;

use crate::parser::Engine;

/// 読み込みエンジンの失敗分類
///
/// calamineが返す構造化エラーから分類されます。
/// メッセージ文字列のマッチングには依存しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailureKind {
    /// ファイルを開けない（存在しない、I/Oエラーなど）
    UnreadableContainer,

    /// エンジンが対応していない形式（例: XLSXをXLSエンジンで開いた）
    WrongFormat,

    /// ZIPコンテナの構造が壊れている、またはZIPではない
    CorruptArchive,

    /// 読み取り権限がない、または他のプログラムが使用中
    PermissionDenied,

    /// その他のエラー
    Generic,
}

impl ReadFailureKind {
    /// ユーザー向けの助言メッセージ
    pub fn advisory(&self) -> &'static str {
        match self {
            ReadFailureKind::UnreadableContainer => {
                "the file could not be opened; check that it still exists"
            }
            ReadFailureKind::WrongFormat => {
                "the engine does not support this format, trying the next engine"
            }
            ReadFailureKind::CorruptArchive => {
                "the file is not a valid zip container; it may be a legacy XLS file"
            }
            ReadFailureKind::PermissionDenied => {
                "the file is locked by another program or cannot be read"
            }
            ReadFailureKind::Generic => "the engine failed to read the file",
        }
    }
}

impl std::fmt::Display for ReadFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReadFailureKind::UnreadableContainer => "unreadable container",
            ReadFailureKind::WrongFormat => "wrong format for engine",
            ReadFailureKind::CorruptArchive => "corrupt archive",
            ReadFailureKind::PermissionDenied => "permission denied",
            ReadFailureKind::Generic => "read failure",
        };
        f.write_str(label)
    }
}

/// 1つのエンジンによる読み込み試行の失敗
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// 失敗したエンジン
    pub engine: Engine,
    /// 失敗の分類
    pub kind: ReadFailureKind,
    /// 下位エラーのメッセージ
    pub message: String,
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.engine, self.kind, self.message)
    }
}

/// スプレッドシートの読み込みエラー
///
/// 候補エンジンがすべて失敗した場合にのみ発生します。
#[derive(Error, Debug)]
pub enum ReadError {
    /// すべてのエンジンが失敗した
    ///
    /// `attempts`には試行順に分類済みの失敗が格納されます。
    #[error("no engine could read '{}': {}", path.display(), summarize(attempts))]
    Exhausted {
        /// 入力ファイルのパス
        path: PathBuf,
        /// 各エンジンの失敗
        attempts: Vec<EngineFailure>,
    },

    /// 入力ファイルがサイズ上限を超えている
    #[error("input file '{}' is {size} bytes (max: {limit} bytes)", path.display())]
    TooLarge {
        /// 入力ファイルのパス
        path: PathBuf,
        /// 実際のサイズ
        size: u64,
        /// 上限
        limit: u64,
    },

    /// 指定されたシートが存在しない（厳格モードのみ）
    #[error("sheet '{sheet}' not found in '{}' (available: {})", path.display(), available.join(", "))]
    SheetNotFound {
        /// 入力ファイルのパス
        path: PathBuf,
        /// 要求されたシート
        sheet: String,
        /// 実在するシート名
        available: Vec<String>,
    },
}

impl ReadError {
    /// 最後に試行したエンジンの失敗分類を取得
    ///
    /// ユーザー向けメッセージの選択に使用します。
    pub fn last_kind(&self) -> Option<ReadFailureKind> {
        match self {
            ReadError::Exhausted { attempts, .. } => attempts.last().map(|a| a.kind),
            ReadError::TooLarge { .. } | ReadError::SheetNotFound { .. } => None,
        }
    }
}

fn summarize(attempts: &[EngineFailure]) -> String {
    if attempts.is_empty() {
        return "no engine available".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 単一ファイル変換のエラー
///
/// 読み込み・描画中のあらゆる失敗をラップし、常に原因を含むメッセージを持ちます。
#[derive(Error, Debug)]
pub enum ConversionError {
    /// 入力の読み込みに失敗した
    #[error("read failed: {0}")]
    Read(#[from] ReadError),

    /// 出力ファイルの書き込みなどI/O操作に失敗した
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XLSXの書き出しに失敗した
    #[error("XLSX rendering failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// PDFの書き出しに失敗した
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    /// 未対応の出力形式タグ
    #[error("unsupported output format: '{0}'")]
    UnsupportedFormat(String),

    /// 出力形式とパラメータの種類が一致しない
    #[error("parameters for {params} cannot be used to produce {format}")]
    ParamsMismatch {
        /// 要求された出力形式
        format: String,
        /// 渡されたパラメータの種類
        params: String,
    },
}

/// 一時ファイル管理のエラー
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// I/O操作中に発生したエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIPアーカイブの作成エラー
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// 使用できないファイル名・ディレクトリ名
    #[error("invalid name: {0}")]
    InvalidName(String),
}

/// 設定の検証・読み込みエラー
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 設定値が不正
    #[error("Configuration error: {0}")]
    Invalid(String),

    /// JSONの解析に失敗した
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    /// 設定ファイルの読み込みに失敗した
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// バッチ実行のエラー
///
/// 個々のジョブの失敗はここには現れません（`BatchResult`に集計されます）。
#[derive(Error, Debug)]
pub enum BatchError {
    /// 1バッチあたりのファイル数上限を超えた
    #[error("too many files in one batch: {count} (max: {limit})")]
    TooManyFiles {
        /// 渡されたファイル数
        count: usize,
        /// 上限
        limit: usize,
    },

    /// 出力ディレクトリの作成などに失敗した
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// セッション開始時のエラー
#[derive(Error, Debug)]
pub enum SessionError {
    /// 設定値が不正
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 一時ディレクトリを作成できない
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
