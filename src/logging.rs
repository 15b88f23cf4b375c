//! Logging Module
//!
//! `simplelog`によるロガーの初期化を提供するモジュール。
//! クレート内部は`log`ファサードのみを使用するため、ロガーの選択は呼び出し側に委ねられます。

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// ログの出力先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// 指定したファイルに書き出す
    File(PathBuf),

    /// 端末（標準出力・標準エラー出力）に書き出す
    Terminal,

    /// ファイルと端末の両方に書き出す
    Both(PathBuf),
}

/// ロガーを初期化
///
/// # 引数
///
/// * `destination` - 出力先
/// * `level` - 出力するログレベルの下限
///
/// # 戻り値
///
/// ロガーが登録された場合は`true`。
/// すでに別のロガーが登録されている場合や、ログファイルを作成できない場合（`File`指定時）は`false`。
pub fn initialize(destination: LogDestination, level: LevelFilter) -> bool {
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::File(path) => match create_file_logger(level, config, path) {
            Some(file_logger) => vec![file_logger],
            None => return false,
        },
        LogDestination::Terminal => vec![terminal_logger(level, config)],
        LogDestination::Both(path) => {
            let mut loggers = vec![terminal_logger(level, config.clone())];
            if let Some(file_logger) = create_file_logger(level, config, path) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    CombinedLogger::init(loggers).is_ok()
}

/// テスト用の端末ロガーを初期化
///
/// すでにロガーが登録されている場合は何もしません。
pub fn initialize_for_tests() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<dyn SharedLogger> {
    TermLogger::new(level, config, TerminalMode::Mixed, ColorChoice::Auto)
}

fn create_file_logger(
    level: LevelFilter,
    config: Config,
    path: PathBuf,
) -> Option<Box<dyn SharedLogger>> {
    match File::create(&path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            None
        }
    }
}
