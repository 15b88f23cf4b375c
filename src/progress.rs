//! Progress Module
//!
//! バッチ変換の進捗管理を提供するモジュール。
//!
//! ジョブごとの状態は`pending → active → {done | failed}`の順にのみ遷移します。
//! 進捗の通知は`ProgressEvent`と`ProgressObserver`トレイトで表現され、
//! 変換処理は特定の表示技術に依存しません。

use std::sync::mpsc::Sender;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

/// ジョブの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 待機中
    Pending,

    /// 処理中
    Active,

    /// 完了（終端）
    Done,

    /// 失敗（終端）
    Failed,
}

impl JobStatus {
    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// 1ジョブの進捗
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProgress {
    /// ファイル名
    pub file_name: String,
    /// 状態
    pub status: JobStatus,
    /// 進捗（0.0〜1.0）
    pub progress: f64,
    /// 開始時刻
    pub started_at: Option<DateTime<Utc>>,
    /// 終了時刻
    pub finished_at: Option<DateTime<Utc>>,
    /// 申告されたサイズ（バイト）
    pub size: u64,
    /// エラーメッセージ
    pub error: Option<String>,
}

impl FileProgress {
    fn new(file_name: String, size: u64) -> Self {
        Self {
            file_name,
            status: JobStatus::Pending,
            progress: 0.0,
            started_at: None,
            finished_at: None,
            size,
            error: None,
        }
    }
}

/// 進捗イベント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// ジョブのインデックス（展開順）
    pub job_index: usize,
    /// 進捗（0.0〜1.0）
    pub fraction: f64,
}

/// 進捗イベントの受け手
pub trait ProgressObserver {
    /// 進捗イベントを受け取る
    fn on_progress(&mut self, event: ProgressEvent);
}

/// 進捗イベントを破棄するオブザーバー
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&mut self, _event: ProgressEvent) {}
}

/// チャネルへの転送
///
/// 受信側が閉じられている場合、イベントは破棄されます。
impl ProgressObserver for Sender<ProgressEvent> {
    fn on_progress(&mut self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// 状態ごとのジョブ数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressCounts {
    /// ジョブ総数
    pub total: usize,
    /// 完了したジョブ数
    pub completed: usize,
    /// 失敗したジョブ数
    pub failed: usize,
    /// 未完了のジョブ数（処理中を含む）
    pub pending: usize,
}

/// バッチ完了時の統計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    /// ジョブ総数
    pub total_jobs: usize,
    /// 完了したジョブ数
    pub completed: usize,
    /// 失敗したジョブ数
    pub failed: usize,
    /// 経過時間
    pub elapsed: Duration,
    /// 申告サイズの合計（バイト）
    pub total_size: u64,
    /// 完了したジョブのサイズの合計（バイト）
    pub processed_size: u64,
    /// 平均スループット（バイト/秒）
    pub average_throughput: Option<f64>,
}

/// 進捗トラッカー
///
/// ジョブごとの状態・時刻・サイズを保持し、全体の進捗率と残り時間を計算します。
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    jobs: Vec<FileProgress>,
    started_at: Option<DateTime<Utc>>,
    completed: usize,
    failed: usize,
    total_size: u64,
    processed_size: u64,
    /// 完了したジョブごとのスループット（バイト/秒）
    throughput_samples: Vec<f64>,
}

impl ProgressTracker {
    /// 新しいProgressTrackerインスタンスを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// ジョブ一覧を初期化
    ///
    /// # 引数
    ///
    /// * `jobs` - （ファイル名, 申告サイズ）の並び
    ///
    /// 以前の状態はすべて破棄されます。
    pub fn initialize_jobs<I, S>(&mut self, jobs: I)
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        *self = Self::default();
        for (name, size) in jobs {
            self.total_size += size;
            self.jobs.push(FileProgress::new(name.into(), size));
        }
    }

    /// バッチの開始時刻を記録
    pub fn start_processing(&mut self) {
        self.start_processing_at(Utc::now());
    }

    /// バッチの開始時刻を記録（時刻指定）
    pub fn start_processing_at(&mut self, now: DateTime<Utc>) {
        self.started_at = Some(now);
    }

    /// ジョブを処理中にする
    ///
    /// 待機中のジョブのみ遷移します。遷移した場合は`true`を返します。
    pub fn start_job(&mut self, index: usize) -> bool {
        self.start_job_at(index, Utc::now())
    }

    /// ジョブを処理中にする（時刻指定）
    pub fn start_job_at(&mut self, index: usize, now: DateTime<Utc>) -> bool {
        match self.jobs.get_mut(index) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Active;
                job.started_at = Some(now);
                job.progress = 0.0;
                debug!("Job {} ({}) started", index, job.file_name);
                true
            }
            _ => false,
        }
    }

    /// 処理中のジョブの進捗を更新
    ///
    /// 値は0.0〜1.0に丸められます。処理中でないジョブは更新されません。
    pub fn update_job(&mut self, index: usize, fraction: f64) -> bool {
        match self.jobs.get_mut(index) {
            Some(job) if job.status == JobStatus::Active => {
                job.progress = if fraction.is_nan() {
                    0.0
                } else {
                    fraction.clamp(0.0, 1.0)
                };
                true
            }
            _ => false,
        }
    }

    /// ジョブを完了にする
    ///
    /// 処理中のジョブのみ遷移します。開始時刻と正のサイズがある場合、
    /// スループットのサンプルを記録します。
    pub fn complete_job(&mut self, index: usize) -> bool {
        self.complete_job_at(index, Utc::now())
    }

    /// ジョブを完了にする（時刻指定）
    pub fn complete_job_at(&mut self, index: usize, now: DateTime<Utc>) -> bool {
        let job = match self.jobs.get_mut(index) {
            Some(job) if job.status == JobStatus::Active => job,
            _ => return false,
        };

        job.status = JobStatus::Done;
        job.finished_at = Some(now);
        job.progress = 1.0;
        self.completed += 1;
        self.processed_size += job.size;

        if let Some(started) = job.started_at {
            let seconds = (now - started).num_milliseconds() as f64 / 1000.0;
            if job.size > 0 && seconds > 0.0 {
                self.throughput_samples.push(job.size as f64 / seconds);
            }
        }

        true
    }

    /// ジョブを失敗にする
    ///
    /// 終端状態でないジョブのみ遷移します。スループットのサンプルは記録しません。
    pub fn fail_job(&mut self, index: usize, error: impl Into<String>) -> bool {
        self.fail_job_at(index, error, Utc::now())
    }

    /// ジョブを失敗にする（時刻指定）
    pub fn fail_job_at(
        &mut self,
        index: usize,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.jobs.get_mut(index) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Failed;
                job.finished_at = Some(now);
                job.progress = 1.0;
                job.error = Some(error.into());
                self.failed += 1;
                true
            }
            _ => false,
        }
    }

    /// ジョブごとの進捗
    pub fn jobs(&self) -> &[FileProgress] {
        &self.jobs
    }

    /// 全体の進捗率（各ジョブの進捗の算術平均）
    pub fn overall_progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        self.jobs.iter().map(|j| j.progress).sum::<f64>() / self.jobs.len() as f64
    }

    /// 残り時間の見積もり
    ///
    /// 完了したジョブのスループットの平均から計算します。
    /// サンプルがない場合や残りサイズがない場合は`None`です。
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.throughput_samples.is_empty() {
            return None;
        }

        let mean =
            self.throughput_samples.iter().sum::<f64>() / self.throughput_samples.len() as f64;
        let remaining = self.total_size.saturating_sub(self.processed_size);
        if mean <= 0.0 || remaining == 0 {
            return None;
        }

        Some(Duration::from_secs_f64(remaining as f64 / mean))
    }

    /// 残り時間の表示用文字列
    pub fn format_remaining(&self) -> Option<String> {
        self.estimated_remaining()
            .map(|d| format_duration(d.as_secs()))
    }

    /// バッチ開始からの経過時間
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Utc::now())
    }

    /// バッチ開始からの経過時間（時刻指定）
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        self.started_at
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or_default()
    }

    /// 経過時間の表示用文字列
    pub fn format_elapsed(&self) -> String {
        format_duration(self.elapsed().as_secs())
    }

    /// 状態ごとのジョブ数
    pub fn counts(&self) -> ProgressCounts {
        let total = self.jobs.len();
        ProgressCounts {
            total,
            completed: self.completed,
            failed: self.failed,
            pending: total.saturating_sub(self.completed + self.failed),
        }
    }

    /// バッチ完了時の統計を取得
    pub fn finish(&self) -> BatchStats {
        let average_throughput = if self.throughput_samples.is_empty() {
            None
        } else {
            Some(self.throughput_samples.iter().sum::<f64>() / self.throughput_samples.len() as f64)
        };

        BatchStats {
            total_jobs: self.jobs.len(),
            completed: self.completed,
            failed: self.failed,
            elapsed: self.elapsed(),
            total_size: self.total_size,
            processed_size: self.processed_size,
            average_throughput,
        }
    }
}

impl ProgressObserver for ProgressTracker {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.update_job(event.job_index, event.fraction);
    }
}

/// 秒数を表示用文字列に変換
///
/// 1分未満は`"42s"`、1時間未満は`"3m 5s"`、それ以上は`"2h 10m"`の形式です。
pub fn format_duration(total_seconds: u64) -> String {
    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        format!("{}m {}s", total_seconds / 60, total_seconds % 60)
    } else {
        format!("{}h {}m", total_seconds / 3600, (total_seconds % 3600) / 60)
    }
}
