//! Output Format Module
//!
//! Strategy Patternによる出力形式の抽象化を提供するモジュール。

mod document;
mod text;
mod workbook;

use crate::api::{DocumentParams, FormatParams, SheetSelector, SpreadsheetParams, TabularTextParams};
use crate::error::ConversionError;
use crate::parser::WorkbookReader;
use crate::types::ConversionJob;

pub(crate) use document::PdfRenderer;
pub(crate) use text::CsvRenderer;
pub(crate) use workbook::XlsxRenderer;

/// 出力レンダラー（Strategy Pattern）
///
/// 各出力形式（CSV, PDF, XLSX）をenumとして表現します。
/// バリアントは形式ごとのパラメータを保持します。
#[derive(Debug, Clone, Copy)]
pub(crate) enum OutputRenderer {
    Csv(TabularTextParams),
    Pdf {
        params: DocumentParams,
        row_cap: usize,
    },
    Xlsx(SpreadsheetParams),
}

impl OutputRenderer {
    /// 形式パラメータからレンダラーを生成
    ///
    /// # 引数
    ///
    /// * `params` - 形式パラメータ
    /// * `document_row_cap` - PDFに描画する最大データ行数
    pub fn from_params(params: &FormatParams, document_row_cap: usize) -> Self {
        match params {
            FormatParams::Csv(p) => OutputRenderer::Csv(*p),
            FormatParams::Pdf(p) => OutputRenderer::Pdf {
                params: *p,
                row_cap: document_row_cap,
            },
            FormatParams::Xlsx(p) => OutputRenderer::Xlsx(*p),
        }
    }

    /// ジョブの入力を読み込み、出力ファイルを書き出す
    ///
    /// # 引数
    ///
    /// * `reader` - ワークブックリーダー
    /// * `job` - 変換ジョブ
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - 書き出しに成功した場合
    /// * `Err(ConversionError)` - 読み込みまたは書き出しに失敗した場合
    ///
    /// XLSXでシートが指定されていない場合は、全シートを1つのワークブックに書き出します。
    pub fn render(&self, reader: &WorkbookReader, job: &ConversionJob) -> Result<(), ConversionError> {
        let selector = SheetSelector::from(job.sheet.clone());

        match self {
            OutputRenderer::Csv(params) => {
                let table = reader.read(&job.input, &selector, None)?;
                CsvRenderer.render(&table, &job.output, params)
            }
            OutputRenderer::Pdf { params, row_cap } => {
                let table = reader.read(&job.input, &selector, None)?;
                let title = document_title(job, table.sheet_name());
                PdfRenderer::new(*row_cap).render(&table, &job.output, params, &title)
            }
            OutputRenderer::Xlsx(params) => match job.sheet {
                Some(_) => {
                    let table = reader.read(&job.input, &selector, params.row_limit)?;
                    XlsxRenderer.render(std::slice::from_ref(&table), &job.output)
                }
                None => XlsxRenderer.render_workbook(
                    reader,
                    &job.input,
                    &job.output,
                    params.row_limit,
                ),
            },
        }
    }
}

/// 文書のタイトル（入力ファイル名とシート名）
fn document_title(job: &ConversionJob, sheet_name: &str) -> String {
    let name = if job.display_name.is_empty() {
        job.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        job.display_name.clone()
    };

    if sheet_name.is_empty() {
        name
    } else {
        format!("{} - {}", name, sheet_name)
    }
}
