//! Session Module
//!
//! 1回の利用に対応する`ArtifactManager`と`Converter`の組を構築し、
//! バッチ実行まで明示的に受け渡すモジュール。グローバルなセッション表は持ちません。

use log::info;

use crate::artifact::ArtifactManager;
use crate::batch::{BatchConfig, BatchOrchestrator, BatchOutcome};
use crate::builder::{Converter, ConverterBuilder};
use crate::config::Settings;
use crate::error::{ArtifactError, BatchError, SessionError};
use crate::progress::{ProgressObserver, ProgressTracker};
use crate::types::{UploadedFile, ValidationReport};

/// 変換セッション
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetbatch::{BatchConfig, FormatParams, NoopObserver, OutputFormat, Session, Settings};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::start(Settings::default())?;
/// let (upload, report) = session.upload("book.xlsx", &std::fs::read("book.xlsx")?)?;
/// if report.valid {
///     let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Csv));
///     let outcome = session.run_batch(&[upload], &config, &mut NoopObserver)?;
///     println!("{} converted, archive: {:?}", outcome.result.success, outcome.archive);
/// }
/// session.end()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    artifacts: ArtifactManager,
    converter: Converter,
    tracker: ProgressTracker,
}

impl Session {
    /// セッションを開始する
    ///
    /// 設定を検証し、一時ルート以下の期限切れファイルを削除してから
    /// 新しいセッションディレクトリを作成します。
    pub fn start(settings: Settings) -> Result<Self, SessionError> {
        settings.validate()?;

        let swept = ArtifactManager::sweep_expired(&settings.temp_root, settings.cleanup_age());
        if swept > 0 {
            info!("Removed {} expired temporary file(s)", swept);
        }

        let converter = ConverterBuilder::new().with_settings(&settings).build()?;
        let artifacts = ArtifactManager::new(&settings.temp_root)?;
        info!("Session {} started", artifacts.session_id());

        Ok(Self {
            settings,
            artifacts,
            converter,
            tracker: ProgressTracker::new(),
        })
    }

    /// セッションID
    pub fn id(&self) -> &str {
        self.artifacts.session_id()
    }

    /// 設定値
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 一時ファイルマネージャー
    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    /// 変換器
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// 直近のバッチの進捗
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// アップロードされたデータを保存して検証する
    ///
    /// 検証に失敗したファイルも保存されます。バッチに含めるかどうかは呼び出し側が
    /// `ValidationReport::valid`で判断します。
    pub fn upload(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<(UploadedFile, ValidationReport), ArtifactError> {
        let file = self.artifacts.save_upload(name, bytes)?;
        let report = self.converter.validate_input_file(&file.path);
        Ok((file, report))
    }

    /// バッチを実行する
    pub fn run_batch(
        &mut self,
        files: &[UploadedFile],
        config: &BatchConfig,
        observer: &mut dyn ProgressObserver,
    ) -> Result<BatchOutcome, BatchError> {
        let orchestrator = BatchOrchestrator::new(
            &self.converter,
            &self.artifacts,
            self.settings.max_files_per_batch,
        );
        orchestrator.run_batch(files, config, &mut self.tracker, observer)
    }

    /// セッションを終了し、一時ディレクトリを削除する
    pub fn end(self) -> Result<(), ArtifactError> {
        self.artifacts.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FormatParams, OutputFormat};
    use crate::progress::NoopObserver;
    use rust_xlsxwriter::Workbook;

    fn settings_in(dir: &std::path::Path) -> Settings {
        Settings {
            temp_root: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    fn fixture_bytes() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(1, 0, "value").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_start_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            max_files_per_batch: 0,
            ..settings_in(dir.path())
        };
        assert!(matches!(
            Session::start(settings),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let first = Session::start(settings_in(dir.path())).unwrap();
        let second = Session::start(settings_in(dir.path())).unwrap();

        assert_ne!(first.id(), second.id());
        assert_ne!(first.artifacts().root(), second.artifacts().root());
    }

    #[test]
    fn test_upload_run_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::start(settings_in(dir.path())).unwrap();

        let (upload, report) = session.upload("book.xlsx", &fixture_bytes()).unwrap();
        assert!(report.valid, "{:?}", report.error);

        let config = BatchConfig::new(FormatParams::default_for(OutputFormat::Pdf));
        let outcome = session.run_batch(&[upload], &config, &mut NoopObserver).unwrap();
        assert_eq!(outcome.result.success, 1);
        assert!(outcome.output_dir.join("book.pdf").exists());
        assert_eq!(session.tracker().jobs().len(), 1);

        let root = session.artifacts().root().to_path_buf();
        session.end().unwrap();
        assert!(!root.exists());
    }
}
