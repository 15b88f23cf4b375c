//! Parser Module
//!
//! calamineを使用したスプレッドシート読み込みの実装。
//! 拡張子ごとの候補エンジンを順に試行し、最初に成功した結果を正規化された表に変換します。

mod engine;
mod text;
mod workbook;

pub use engine::Engine;
pub use workbook::PLACEHOLDER_SHEET;
pub(crate) use workbook::WorkbookReader;
