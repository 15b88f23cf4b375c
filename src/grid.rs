//! Grid Module
//!
//! 表データから文書（PDF）用の表グリッドを構築するモジュール。
//! 行数の上限による切り詰めと、表示幅に基づく列幅の計算を行います。

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::types::SpreadsheetTable;

/// 省略を示すマーカー
pub(crate) const ELLIPSIS: &str = "...";

/// 列幅の最小値（表示幅）
const MIN_COLUMN_WIDTH: usize = 3;

/// 列幅の最大値（表示幅）
///
/// 長い文字列を含む列が他の列を押し潰さないように上限を設けます。
const MAX_COLUMN_WIDTH: usize = 40;

/// 文書に描画する表グリッド
///
/// ヘッダー行、データ行（上限まで）、切り詰められた場合は省略行で構成されます。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableGrid {
    /// ヘッダー行
    header: Vec<String>,

    /// データ行（省略行を含む）
    body: Vec<Vec<String>>,

    /// 上限を超えて切り詰められたかどうか
    truncated: bool,
}

impl TableGrid {
    /// 表からグリッドを構築
    ///
    /// # 引数
    ///
    /// * `table` - 表データ
    /// * `row_cap` - 描画する最大データ行数
    ///
    /// # 戻り値
    ///
    /// 構築されたグリッド。データ行が`row_cap`を超える場合は、
    /// 先頭`row_cap`行の後に省略行（すべてのセルが`...`）が追加されます。
    pub fn build(table: &SpreadsheetTable, row_cap: usize) -> Self {
        let header = table.columns().to_vec();
        let truncated = table.height() > row_cap;

        let mut body: Vec<Vec<String>> = table
            .text_rows()
            .into_iter()
            .take(row_cap)
            .collect();

        if truncated {
            body.push(vec![ELLIPSIS.to_string(); header.len()]);
        }

        Self {
            header,
            body,
            truncated,
        }
    }

    /// ヘッダー行
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// データ行（省略行を含む）
    pub fn body(&self) -> &[Vec<String>] {
        &self.body
    }

    /// 切り詰められたかどうか
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// 列数
    pub fn cols(&self) -> usize {
        self.header.len()
    }

    /// 描画される行数（ヘッダー行と省略行を含む）
    pub fn rendered_rows(&self) -> usize {
        1 + self.body.len()
    }

    /// 列幅を計算（表示幅）
    ///
    /// 全角文字は表示幅2として計算します。
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![MIN_COLUMN_WIDTH; self.cols()];

        for row in std::iter::once(&self.header).chain(self.body.iter()) {
            for (col_idx, cell) in row.iter().enumerate() {
                let width = cell.trim().width().min(MAX_COLUMN_WIDTH);
                widths[col_idx] = widths[col_idx].max(width);
            }
        }

        widths
    }

    /// 列幅を利用可能な幅に比例配分
    ///
    /// # 引数
    ///
    /// * `available` - 表に使える幅（任意の単位）
    ///
    /// # 戻り値
    ///
    /// 各列の幅（合計は`available`に一致）
    pub fn layout(&self, available: f32) -> Vec<f32> {
        let widths = self.column_widths();
        let total: usize = widths.iter().sum();
        if total == 0 {
            return Vec::new();
        }

        widths
            .iter()
            .map(|&w| available * w as f32 / total as f32)
            .collect()
    }
}

/// 表示幅の上限に収まるように文字列を切り詰める
///
/// 切り詰めた場合は末尾に`..`を付けます。
pub(crate) fn clip_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(2);
    let mut clipped = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        clipped.push(c);
        used += w;
    }
    clipped.push_str("..");
    clipped
}
