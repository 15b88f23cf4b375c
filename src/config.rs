//! Configuration Module
//!
//! 入力サイズ・バッチ件数・一時ファイルの保持期間などの設定値を定義するモジュール。
//! 設定はJSONから読み込むことができ、欠けている項目には既定値が使われます。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 1ファイルあたりの最大サイズの既定値（50MB）
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 1バッチあたりの最大ファイル数の既定値
pub const DEFAULT_MAX_FILES_PER_BATCH: usize = 10;

/// 一時ファイルの保持期間の既定値（時間）
pub const DEFAULT_CLEANUP_AFTER_HOURS: u64 = 24;

/// PDFに描画する最大データ行数の既定値
pub const DEFAULT_DOCUMENT_ROW_CAP: usize = 100;

/// プレビューで読み込む行数の既定値
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// 設定値
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 1ファイルあたりの最大サイズ（バイト）
    pub max_file_size: u64,

    /// 1バッチあたりの最大ファイル数
    pub max_files_per_batch: usize,

    /// 一時ファイルの保持期間（時間）
    pub cleanup_after_hours: u64,

    /// 一時ファイルのルートディレクトリ
    pub temp_root: PathBuf,

    /// PDFに描画する最大データ行数
    pub document_row_cap: usize,

    /// プレビューで読み込む行数
    pub preview_rows: usize,

    /// 存在しないシート名をエラーにするかどうか
    pub strict_sheet_names: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files_per_batch: DEFAULT_MAX_FILES_PER_BATCH,
            cleanup_after_hours: DEFAULT_CLEANUP_AFTER_HOURS,
            temp_root: PathBuf::from("temp"),
            document_row_cap: DEFAULT_DOCUMENT_ROW_CAP,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            strict_sheet_names: false,
        }
    }
}

impl Settings {
    /// JSON文字列から設定を読み込む
    ///
    /// # 引数
    ///
    /// * `json` - JSON文字列（欠けている項目は既定値）
    ///
    /// # 戻り値
    ///
    /// * `Ok(Settings)` - 読み込みと検証に成功した場合
    /// * `Err(ConfigError)` - JSONが不正、または値が不正な場合
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// JSONファイルから設定を読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 設定値を検証
    ///
    /// すべての上限値は0より大きくなければなりません。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.max_files_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "max_files_per_batch must be greater than 0".to_string(),
            ));
        }
        if self.document_row_cap == 0 {
            return Err(ConfigError::Invalid(
                "document_row_cap must be greater than 0".to_string(),
            ));
        }
        if self.preview_rows == 0 {
            return Err(ConfigError::Invalid(
                "preview_rows must be greater than 0".to_string(),
            ));
        }
        if self.temp_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("temp_root must not be empty".to_string()));
        }
        Ok(())
    }

    /// 一時ファイルの保持期間
    pub fn cleanup_age(&self) -> Duration {
        Duration::from_secs(self.cleanup_after_hours * 3600)
    }
}
