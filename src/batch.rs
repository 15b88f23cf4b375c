//! Batch Module
//!
//! アップロードされたファイルとシート処理方針から変換ジョブを展開し、
//! 1件ずつ順番に変換して結果を集計するモジュール。
//!
//! 1件のジョブの失敗が残りのジョブを中断することはありません。
//! 成功したジョブが1件以上あれば、出力ファイルを1つのZIPアーカイブにまとめます。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::api::{FormatParams, OutputFormat, SheetPolicy};
use crate::artifact::{ArtifactManager, CONVERTED_DIR};
use crate::builder::Converter;
use crate::error::BatchError;
use crate::progress::{BatchStats, ProgressEvent, ProgressObserver, ProgressTracker};
use crate::security::sanitize_filename;
use crate::types::{BatchResult, ConversionJob, UploadedFile};

/// バッチ全体の変換設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 出力形式ごとのパラメータ（出力形式を決定する）
    pub params: FormatParams,

    /// シート処理方針
    #[serde(default)]
    pub sheet_policy: SheetPolicy,

    /// アーカイブ名（`None`の場合はタイムスタンプから生成）
    #[serde(default)]
    pub archive_name: Option<String>,
}

impl BatchConfig {
    /// 形式パラメータから設定を生成（全シート、アーカイブ名は自動）
    pub fn new(params: FormatParams) -> Self {
        Self {
            params,
            sheet_policy: SheetPolicy::default(),
            archive_name: None,
        }
    }

    /// シート処理方針を指定する
    pub fn with_sheet_policy(mut self, policy: SheetPolicy) -> Self {
        self.sheet_policy = policy;
        self
    }

    /// アーカイブ名を指定する
    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = Some(name.into());
        self
    }

    /// 出力形式
    pub fn format(&self) -> OutputFormat {
        self.params.format()
    }
}

/// バッチ実行の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// ジョブの集計結果
    pub result: BatchResult,

    /// 成功した出力をまとめたアーカイブ（成功0件、または作成失敗時は`None`）
    pub archive: Option<PathBuf>,

    /// 出力ディレクトリ
    pub output_dir: PathBuf,

    /// 処理統計
    pub stats: BatchStats,
}

/// 進捗イベントをトラッカーと外部のオブザーバーの両方に転送する
struct Tee<'a, O: ProgressObserver + ?Sized> {
    tracker: &'a mut ProgressTracker,
    external: &'a mut O,
}

impl<O: ProgressObserver + ?Sized> ProgressObserver for Tee<'_, O> {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.tracker.on_progress(event);
        self.external.on_progress(event);
    }
}

/// バッチオーケストレーター
///
/// セッションの`Converter`と`ArtifactManager`を受け取り、ジョブを逐次実行します。
#[derive(Debug)]
pub struct BatchOrchestrator<'a> {
    converter: &'a Converter,
    artifacts: &'a ArtifactManager,
    max_files: usize,
}

impl<'a> BatchOrchestrator<'a> {
    /// 新しいオーケストレーターを生成
    ///
    /// # 引数
    ///
    /// * `converter` - 単一ファイルの変換器
    /// * `artifacts` - 出力先とアーカイブを管理する一時ファイルマネージャー
    /// * `max_files` - 1バッチあたりの最大ファイル数
    pub fn new(converter: &'a Converter, artifacts: &'a ArtifactManager, max_files: usize) -> Self {
        Self {
            converter,
            artifacts,
            max_files,
        }
    }

    /// ファイルとシート処理方針からジョブを展開する
    ///
    /// # 展開規則
    ///
    /// * `AllSheets` - CSV/PDFで複数シートを持つファイルはシートごとに
    ///   `{stem}_{sheet}.{ext}`、それ以外は`{stem}.{ext}`の1件
    /// * `FirstSheetOnly` - 先頭シートに固定した`{stem}.{ext}`の1件
    /// * `SpecificSheets` - 指定シートの`{stem}_{sheet}.{ext}`の1件。
    ///   指定がないファイルはジョブを生成しません
    ///
    /// ジョブの順序はファイル順、同じファイル内ではシート順です。
    /// 出力名が重複する場合は連番で区別します。
    pub fn expand_jobs(
        &self,
        files: &[UploadedFile],
        config: &BatchConfig,
        output_dir: &Path,
    ) -> Vec<ConversionJob> {
        let format = config.format();
        let mut planned: Vec<(&UploadedFile, String, Option<String>)> = Vec::new();

        for file in files {
            let stem = file.stem();
            match &config.sheet_policy {
                SheetPolicy::AllSheets => {
                    let sheets = if format.supports_per_sheet_outputs() {
                        self.converter.list_sheets(&file.path)
                    } else {
                        Vec::new()
                    };

                    if sheets.len() > 1 {
                        for sheet in sheets {
                            planned.push((file, format!("{}_{}", stem, sheet), Some(sheet)));
                        }
                    } else {
                        planned.push((file, stem, None));
                    }
                }
                SheetPolicy::FirstSheetOnly => {
                    let first = self.converter.list_sheets(&file.path).into_iter().next();
                    planned.push((file, stem, first));
                }
                SheetPolicy::SpecificSheets(selected) => match selected.get(&file.name) {
                    Some(sheet) => {
                        planned.push((file, format!("{}_{}", stem, sheet), Some(sheet.clone())));
                    }
                    None => debug!("No sheet selected for '{}', skipping", file.name),
                },
            }
        }

        let mut taken = HashSet::new();
        planned
            .into_iter()
            .map(|(file, base, sheet)| {
                let output = output_dir.join(unique_name(&mut taken, &base, format.extension()));
                ConversionJob {
                    input: file.path.clone(),
                    output,
                    params: config.params,
                    sheet,
                    display_name: file.name.clone(),
                    size: file.size,
                }
            })
            .collect()
    }

    /// バッチを実行する
    ///
    /// # 引数
    ///
    /// * `files` - アップロードされたファイル
    /// * `config` - 変換設定
    /// * `tracker` - ジョブごとの進捗を記録するトラッカー（実行前に初期化されます）
    /// * `observer` - 進捗イベントの外部の通知先
    ///
    /// # 戻り値
    ///
    /// * `Ok(BatchOutcome)` - 全ジョブを実行した場合（個々のジョブの失敗を含む）
    /// * `Err(BatchError::TooManyFiles)` - ファイル数が上限を超えている場合
    /// * `Err(BatchError::Artifact)` - 出力ディレクトリを作成できない場合
    pub fn run_batch(
        &self,
        files: &[UploadedFile],
        config: &BatchConfig,
        tracker: &mut ProgressTracker,
        observer: &mut dyn ProgressObserver,
    ) -> Result<BatchOutcome, BatchError> {
        if files.len() > self.max_files {
            return Err(BatchError::TooManyFiles {
                count: files.len(),
                limit: self.max_files,
            });
        }

        let output_dir = self.artifacts.create_subdir(CONVERTED_DIR)?;
        let jobs = self.expand_jobs(files, config, &output_dir);

        tracker.initialize_jobs(jobs.iter().map(|job| (job.display_name.clone(), job.size)));
        tracker.start_processing();
        info!(
            "Starting batch: {} file(s), {} job(s), format {}",
            files.len(),
            jobs.len(),
            config.format()
        );

        let mut result = BatchResult {
            total: jobs.len(),
            ..BatchResult::default()
        };

        for (index, job) in jobs.iter().enumerate() {
            tracker.start_job(index);

            let outcome = {
                let mut tee = Tee {
                    tracker: &mut *tracker,
                    external: &mut *observer,
                };
                self.converter.convert(index, job, &mut tee)
            };

            match outcome {
                Ok(true) => {
                    tracker.complete_job(index);
                    result.success += 1;
                    result.output_files.push(job.output.clone());
                }
                Ok(false) => {
                    let message = "output file was not created".to_string();
                    tracker.fail_job(index, message.clone());
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", job.display_name, message));
                }
                Err(e) => {
                    debug!("Job {} ({}) failed: {}", index, job.display_name, e);
                    tracker.fail_job(index, e.to_string());
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", job.display_name, e));
                }
            }
        }

        let archive = if result.success > 0 {
            match self
                .artifacts
                .archive(&result.output_files, config.archive_name.as_deref())
            {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to create archive: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let stats = tracker.finish();
        info!(
            "Batch finished: {} succeeded, {} failed in {}",
            result.success,
            result.failed,
            tracker.format_elapsed()
        );

        Ok(BatchOutcome {
            result,
            archive,
            output_dir,
            stats,
        })
    }
}

/// 重複しない出力ファイル名を決定
fn unique_name(taken: &mut HashSet<String>, base: &str, extension: &str) -> String {
    let base = sanitize_filename(base);
    let mut name = format!("{}.{}", base, extension);
    let mut counter = 2;
    while !taken.insert(name.clone()) {
        name = format!("{}_{}.{}", base, counter, extension);
        counter += 1;
    }
    name
}
