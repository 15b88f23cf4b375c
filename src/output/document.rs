//! Paginated Document Renderer
//!
//! 表データをPDF文書として書き出すレンダラー。
//! タイトルの後に1つの表を描画し、ページに収まらない行は次ページに送ります。

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::debug;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Rect, Rgb,
};

use crate::api::DocumentParams;
use crate::error::ConversionError;
use crate::grid::{clip_to_width, TableGrid};
use crate::types::SpreadsheetTable;

/// ページ余白（mm）
const MARGIN: f32 = 15.0;

/// タイトルのフォントサイズ（pt）
const TITLE_FONT_SIZE: f32 = 14.0;

/// 表のフォントサイズ（pt）
const CELL_FONT_SIZE: f32 = 8.0;

/// 表の行の高さ（mm）
const ROW_HEIGHT: f32 = 6.0;

/// セル内の左右パディング（mm）
const CELL_PADDING: f32 = 1.5;

/// 1ptあたりのmm
const PT_TO_MM: f32 = 0.3528;

/// 半角1文字あたりの平均幅（フォントサイズに対する比率）
const AVG_GLYPH_RATIO: f32 = 0.5;

/// PDF形式のレンダラー
pub(crate) struct PdfRenderer {
    /// 描画する最大データ行数
    row_cap: usize,
}

/// 描画中の状態
struct PageCursor {
    layer: PdfLayerReference,
    y: f32,
}

impl PdfRenderer {
    /// 新しいPdfRendererインスタンスを生成
    pub fn new(row_cap: usize) -> Self {
        Self { row_cap }
    }

    /// 表をPDFファイルとして書き出す
    ///
    /// # 引数
    ///
    /// * `table` - 表データ
    /// * `path` - 出力ファイルのパス
    /// * `params` - ページサイズと方向
    /// * `title` - タイトル（入力ファイル名）
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - 書き出しに成功した場合
    /// * `Err(ConversionError)` - フォントの登録や保存に失敗した場合
    ///
    /// データ行は`row_cap`行までに制限され、超過した場合は省略行が追加されます。
    pub fn render(
        &self,
        table: &SpreadsheetTable,
        path: &Path,
        params: &DocumentParams,
        title: &str,
    ) -> Result<(), ConversionError> {
        let grid = TableGrid::build(table, self.row_cap);
        if grid.is_truncated() {
            debug!(
                "Sheet '{}' truncated to {} rendered rows of {}",
                table.sheet_name(),
                grid.rendered_rows(),
                table.height()
            );
        }
        let (width, height) = params.page_dimensions_mm();

        let (doc, page, layer) = PdfDocument::new(title, Mm(width), Mm(height), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;

        let mut cursor = PageCursor {
            layer: doc.get_page(page).get_layer(layer),
            y: height - MARGIN,
        };

        // タイトル
        cursor.y -= TITLE_FONT_SIZE * PT_TO_MM;
        cursor.layer.set_fill_color(black());
        cursor.layer.use_text(
            to_builtin_charset(title),
            TITLE_FONT_SIZE,
            Mm(MARGIN),
            Mm(cursor.y),
            &bold,
        );
        cursor.y -= ROW_HEIGHT;

        let columns = grid.layout(width - 2.0 * MARGIN);
        if columns.is_empty() {
            cursor.layer.use_text(
                "(empty sheet)",
                CELL_FONT_SIZE,
                Mm(MARGIN),
                Mm(cursor.y),
                &regular,
            );
        } else {
            draw_row(&cursor, grid.header(), &columns, &bold, RowStyle::Header);
            cursor.y -= ROW_HEIGHT;

            for row in grid.body() {
                if cursor.y - ROW_HEIGHT < MARGIN {
                    new_page(&doc, &mut cursor, width, height);
                    draw_row(&cursor, grid.header(), &columns, &bold, RowStyle::Header);
                    cursor.y -= ROW_HEIGHT;
                }
                draw_row(&cursor, row, &columns, &regular, RowStyle::Body);
                cursor.y -= ROW_HEIGHT;
            }
        }

        let file = File::create(path)?;
        doc.save(&mut BufWriter::new(file)).map_err(pdf_error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum RowStyle {
    Header,
    Body,
}

impl RowStyle {
    fn background(&self) -> Color {
        match self {
            RowStyle::Header => rgb(0.35, 0.4, 0.5),
            RowStyle::Body => rgb(0.96, 0.96, 0.9),
        }
    }

    fn foreground(&self) -> Color {
        match self {
            RowStyle::Header => rgb(1.0, 1.0, 1.0),
            RowStyle::Body => black(),
        }
    }
}

/// 1行分のセル（背景・罫線・文字）を描画
///
/// `cursor.y`は行の上端を指します。
fn draw_row(
    cursor: &PageCursor,
    cells: &[String],
    columns: &[f32],
    font: &IndirectFontRef,
    style: RowStyle,
) {
    let layer = &cursor.layer;
    let top = cursor.y;
    let bottom = top - ROW_HEIGHT;
    let mut x = MARGIN;

    layer.set_outline_color(black());
    layer.set_outline_thickness(0.5);

    for (cell, &width) in cells.iter().zip(columns) {
        layer.set_fill_color(style.background());
        layer.add_rect(
            Rect::new(Mm(x), Mm(bottom), Mm(x + width), Mm(top)).with_mode(PaintMode::FillStroke),
        );

        let max_chars = ((width - 2.0 * CELL_PADDING) / (CELL_FONT_SIZE * PT_TO_MM * AVG_GLYPH_RATIO))
            .floor()
            .max(1.0) as usize;
        let text = to_builtin_charset(&clip_to_width(cell.trim(), max_chars));

        layer.set_fill_color(style.foreground());
        layer.use_text(
            text,
            CELL_FONT_SIZE,
            Mm(x + CELL_PADDING),
            Mm(bottom + (ROW_HEIGHT - CELL_FONT_SIZE * PT_TO_MM) / 2.0 + 0.5),
            font,
        );

        x += width;
    }
}

/// 改ページ
fn new_page(doc: &PdfDocumentReference, cursor: &mut PageCursor, width: f32, height: f32) {
    let (page, layer) = doc.add_page(Mm(width), Mm(height), "Layer 1");
    cursor.layer = doc.get_page(page).get_layer(layer);
    cursor.y = height - MARGIN;
}

/// 組み込みフォントで描画できない文字を`?`に置き換える
///
/// 組み込みフォント（Helvetica）はLatin-1の範囲の文字のみを持ちます。
fn to_builtin_charset(text: &str) -> String {
    text.chars()
        .map(|c| {
            if (c as u32) < 0x20 {
                ' '
            } else if (c as u32) <= 0xFF {
                c
            } else {
                '?'
            }
        })
        .collect()
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn black() -> Color {
    rgb(0.0, 0.0, 0.0)
}

fn pdf_error(error: printpdf::Error) -> ConversionError {
    ConversionError::Pdf(error.to_string())
}
