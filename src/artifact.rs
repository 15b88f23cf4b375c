//! Artifact Module
//!
//! セッション単位の一時ファイル管理を提供するモジュール。
//!
//! 各セッションは`{一時ルート}/{セッションID}/`以下のディレクトリを専有し、
//! `uploads/`にアップロードファイル、`converted/`に変換結果を保存します。
//! 期限切れファイルの削除（スイープ）はセッションをまたいでルート全体に対して行います。

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use filetime::FileTime;
use log::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArtifactError;
use crate::security::{sanitize_filename, validate_archive_entry};
use crate::types::{FileInfo, UploadedFile};

/// アップロードファイルの保存先サブディレクトリ
pub const UPLOADS_DIR: &str = "uploads";

/// 変換結果の保存先サブディレクトリ
pub const CONVERTED_DIR: &str = "converted";

/// MIMEタイプが判定できない場合の既定値
const FALLBACK_MIME: &str = "application/octet-stream";

/// 一時ファイルマネージャー
///
/// 1つのセッションが専有する一時ディレクトリを管理します。
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    session_id: String,
    root: PathBuf,
}

impl ArtifactManager {
    /// ランダムなセッションIDで一時ディレクトリを作成
    ///
    /// # 引数
    ///
    /// * `base` - 一時ファイルのルートディレクトリ
    ///
    /// # 戻り値
    ///
    /// * `Ok(ArtifactManager)` - ディレクトリの作成に成功した場合
    /// * `Err(ArtifactError::Io)` - ディレクトリを作成できない場合
    pub fn new(base: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        Self::with_session_id(base, &Uuid::new_v4().to_string())
    }

    /// 指定したセッションIDで一時ディレクトリを作成
    ///
    /// セッションIDにディレクトリ区切りなどが含まれる場合は`ArtifactError::InvalidName`になります。
    pub fn with_session_id(base: impl AsRef<Path>, session_id: &str) -> Result<Self, ArtifactError> {
        validate_archive_entry(session_id).map_err(ArtifactError::InvalidName)?;

        let root = base.as_ref().join(session_id);
        fs::create_dir_all(&root)?;
        debug!("Session workspace at {}", root.display());

        Ok(Self {
            session_id: session_id.to_string(),
            root,
        })
    }

    /// セッションID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// セッションのルートディレクトリ
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// アップロードされたデータを保存
    ///
    /// # 引数
    ///
    /// * `name` - アップロード時のファイル名
    /// * `bytes` - ファイルの内容
    ///
    /// # 戻り値
    ///
    /// 保存先を指す`UploadedFile`。保存名は無害化されたファイル名に
    /// タイムスタンプ（`_YYYYmmdd_HHMMSS`）を付けたものです。
    pub fn save_upload(&self, name: &str, bytes: &[u8]) -> Result<UploadedFile, ArtifactError> {
        let path = self.upload_path(name)?;
        fs::write(&path, bytes)?;
        Ok(UploadedFile::new(path, name, bytes.len() as u64))
    }

    /// 既存のファイルをアップロードとして取り込む
    pub fn save_upload_from(
        &self,
        name: &str,
        source: impl AsRef<Path>,
    ) -> Result<UploadedFile, ArtifactError> {
        let path = self.upload_path(name)?;
        let size = fs::copy(source, &path)?;
        Ok(UploadedFile::new(path, name, size))
    }

    /// サブディレクトリを作成
    ///
    /// # 引数
    ///
    /// * `name` - セッションルートからの相対パス（空の場合はルート自身）
    ///
    /// 絶対パスや`..`を含むパスは`ArtifactError::InvalidName`になります。
    pub fn create_subdir(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ArtifactError::InvalidName(name.to_string()));
        }

        let dir = self.root.join(relative);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// ファイルを1つのZIPアーカイブにまとめる
    ///
    /// # 引数
    ///
    /// * `files` - まとめるファイル（存在しないものは黙ってスキップ）
    /// * `name` - アーカイブ名（`None`の場合は`converted_files_{タイムスタンプ}.zip`）
    ///
    /// # 戻り値
    ///
    /// セッションルート直下に作成されたアーカイブのパス。
    /// エントリは階層を持たず、ファイル名のみで格納されます（Deflate圧縮）。
    pub fn archive<P: AsRef<Path>>(
        &self,
        files: &[P],
        name: Option<&str>,
    ) -> Result<PathBuf, ArtifactError> {
        let archive_name = match name {
            Some(name) => {
                let safe = sanitize_filename(name);
                if safe.to_ascii_lowercase().ends_with(".zip") {
                    safe
                } else {
                    format!("{}.zip", safe)
                }
            }
            None => format!("converted_files_{}.zip", timestamp()),
        };

        let archive_path = self.root.join(&archive_name);
        let written = write_archive(&archive_path, files, |file| fs::read(file));
        if written.is_err() {
            // 書きかけのアーカイブは残さない
            if let Err(e) = fs::remove_file(&archive_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial archive {}: {}", archive_path.display(), e);
                }
            }
        }

        let count = written?;
        info!("Archived {} file(s) into {}", count, archive_path.display());
        Ok(archive_path)
    }

    /// ファイル情報を取得
    ///
    /// 存在しないファイルは`exists: false`、サイズ0として報告します。
    pub fn file_info(path: impl AsRef<Path>) -> FileInfo {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(FALLBACK_MIME)
            .to_string();

        let metadata = fs::metadata(path).ok().filter(|m| m.is_file());
        let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

        FileInfo {
            name,
            size,
            size_formatted: format_size(size),
            extension,
            mime_type,
            exists: metadata.is_some(),
            path: path.to_path_buf(),
        }
    }

    /// ディレクトリ直下のファイル一覧を取得
    ///
    /// 読み込みに失敗した場合は警告ログを出力し、空の一覧を返します。
    /// 結果はファイル名順です。
    pub fn list_files(dir: impl AsRef<Path>) -> Vec<FileInfo> {
        let dir = dir.as_ref();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list files in {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<FileInfo> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .map(Self::file_info)
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// ダウンロード用にファイルの内容を読み込む
    ///
    /// 読み込みに失敗した場合は警告ログを出力し、`None`を返します。
    pub fn read_file(path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// セッションの一時ディレクトリを削除
    ///
    /// すでに存在しない場合も成功として扱います。
    pub fn cleanup(&self) -> Result<(), ArtifactError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!("Removed session workspace {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 期限切れの一時ファイルを削除
    ///
    /// # 引数
    ///
    /// * `base` - 一時ファイルのルートディレクトリ（全セッションが対象）
    /// * `max_age` - 保持期間（最終更新時刻からの経過時間で判定）
    ///
    /// # 戻り値
    ///
    /// 削除したファイル数。
    /// 削除によって空になったディレクトリも削除します（元から空のディレクトリは残します）。
    pub fn sweep_expired(base: impl AsRef<Path>, max_age: Duration) -> usize {
        Self::sweep_expired_at(base, max_age, SystemTime::now())
    }

    /// 期限切れの一時ファイルを削除（基準時刻指定）
    pub fn sweep_expired_at(base: impl AsRef<Path>, max_age: Duration, now: SystemTime) -> usize {
        let base = base.as_ref();
        if !base.exists() {
            return 0;
        }

        let now = FileTime::from_system_time(now);
        let max_age_secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let mut removed = 0;
        let mut emptied: HashSet<PathBuf> = HashSet::new();

        for entry in WalkDir::new(base).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Sweep skipped an entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                if emptied.contains(path) && is_empty_dir(path) {
                    match fs::remove_dir(path) {
                        Ok(()) => {
                            if let Some(parent) = path.parent() {
                                emptied.insert(parent.to_path_buf());
                            }
                        }
                        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                    }
                }
                continue;
            }

            let expired = entry
                .metadata()
                .map(|m| {
                    let modified = FileTime::from_last_modification_time(&m);
                    now.unix_seconds() - modified.unix_seconds() > max_age_secs
                })
                .unwrap_or(false);

            if expired {
                match fs::remove_file(path) {
                    Ok(()) => {
                        removed += 1;
                        if let Some(parent) = path.parent() {
                            emptied.insert(parent.to_path_buf());
                        }
                    }
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }

        if removed > 0 {
            info!("Swept {} expired file(s) under {}", removed, base.display());
        }
        removed
    }

    /// アップロードファイルの保存先を決定
    fn upload_path(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        let dir = self.create_subdir(UPLOADS_DIR)?;
        let safe = sanitize_filename(name);
        let (stem, extension) = split_extension(&safe);
        let stamp = timestamp();

        let mut path = dir.join(format!("{}_{}{}", stem, stamp, extension));
        let mut counter = 1;
        while path.exists() {
            path = dir.join(format!("{}_{}_{}{}", stem, stamp, counter, extension));
            counter += 1;
        }
        Ok(path)
    }
}

/// アーカイブを書き出し、格納したエントリ数を返す
///
/// 存在しないファイルや、読み込み時点で削除されていたファイルはスキップします。
fn write_archive<P: AsRef<Path>>(
    archive_path: &Path,
    files: &[P],
    read: impl Fn(&Path) -> io::Result<Vec<u8>>,
) -> Result<usize, ArtifactError> {
    let mut writer = ZipWriter::new(File::create(archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = HashSet::new();

    for file in files {
        let file = file.as_ref();
        if !file.is_file() {
            debug!("Skipping missing file {}", file.display());
            continue;
        }

        let entry = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        validate_archive_entry(&entry).map_err(ArtifactError::InvalidName)?;
        if entries.contains(&entry) {
            warn!("Duplicate archive entry '{}' skipped", entry);
            continue;
        }

        let data = match read(file) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Skipping file removed before archiving {}", file.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        writer.start_file(entry.as_str(), options)?;
        writer.write_all(&data)?;
        entries.insert(entry);
    }

    writer.finish()?;
    Ok(entries.len())
}

/// ファイル名を（拡張子を除いた部分, ドット付き拡張子）に分割
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// バイト数を表示用文字列に変換
///
/// 0は`"0B"`、それ以外は小数点以下1桁で単位（B, KB, MB, GB）を付けます。
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_session_layout() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(base.path()).unwrap();

        assert!(Uuid::parse_str(manager.session_id()).is_ok());
        assert!(manager.root().is_dir());
        assert_eq!(manager.root().parent(), Some(base.path()));
    }

    #[test]
    fn test_invalid_session_id() {
        let base = tempfile::tempdir().unwrap();
        assert!(matches!(
            ArtifactManager::with_session_id(base.path(), "../escape"),
            Err(ArtifactError::InvalidName(_))
        ));
    }

    #[test]
    fn test_save_upload_sanitizes_and_stamps() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();

        let first = manager.save_upload("re:port.xlsx", b"abc").unwrap();
        let second = manager.save_upload("re:port.xlsx", b"abcd").unwrap();

        let first_name = first.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(first_name.starts_with("re_port_"));
        assert!(first_name.ends_with(".xlsx"));
        assert_ne!(first.path, second.path);
        assert_eq!(first.path.parent(), Some(manager.root().join(UPLOADS_DIR).as_path()));
        assert_eq!(first.name, "re:port.xlsx");
        assert_eq!(second.size, 4);
    }

    #[test]
    fn test_create_subdir_rejects_traversal() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();

        assert!(manager.create_subdir("converted/csv").unwrap().is_dir());
        assert!(manager.create_subdir("../outside").is_err());
        assert!(manager.create_subdir("/abs").is_err());
    }

    #[test]
    fn test_archive_is_flat_and_skips_missing() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let out = manager.create_subdir(CONVERTED_DIR).unwrap();
        std::fs::write(out.join("a.csv"), "1,2\n").unwrap();
        std::fs::write(out.join("b.csv"), "3,4\n").unwrap();

        let files = vec![out.join("a.csv"), out.join("gone.csv"), out.join("b.csv")];
        let archive = manager.archive(&files, Some("results")).unwrap();
        assert_eq!(archive.file_name().unwrap(), "results.zip");

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = String::new();
        zip.by_name("a.csv").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "1,2\n");
    }

    #[test]
    fn test_file_removed_while_archiving_is_skipped() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let out = manager.create_subdir(CONVERTED_DIR).unwrap();
        std::fs::write(out.join("a.csv"), "1\n").unwrap();
        std::fs::write(out.join("b.csv"), "2\n").unwrap();

        // b.csvは存在確認の後、読み込みの前に削除された
        let files = vec![out.join("a.csv"), out.join("b.csv")];
        let archive_path = manager.root().join("race.zip");
        let count = write_archive(&archive_path, &files, |file| {
            if file.ends_with("b.csv") {
                Err(io::Error::from(io::ErrorKind::NotFound))
            } else {
                std::fs::read(file)
            }
        })
        .unwrap();
        assert_eq!(count, 1);

        let mut zip = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        assert!(zip.by_name("a.csv").is_ok());
    }

    #[test]
    fn test_read_failure_while_archiving_is_reported() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let out = manager.create_subdir(CONVERTED_DIR).unwrap();
        std::fs::write(out.join("a.csv"), "1\n").unwrap();

        let archive_path = manager.root().join("broken.zip");
        let result = write_archive(&archive_path, &[out.join("a.csv")], |_| {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });
        assert!(matches!(result, Err(ArtifactError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_archive_is_removed() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let out = manager.create_subdir(CONVERTED_DIR).unwrap();
        std::fs::write(out.join("a.csv"), "1\n").unwrap();
        // 区切り文字を含むエントリ名は拒否される
        std::fs::write(out.join("b\\c.csv"), "2\n").unwrap();

        let files = vec![out.join("a.csv"), out.join("b\\c.csv")];
        let result = manager.archive(&files, Some("partial"));
        assert!(matches!(result, Err(ArtifactError::InvalidName(_))));
        assert!(!manager.root().join("partial.zip").exists());
    }

    #[test]
    fn test_default_archive_name() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let archive = manager.archive::<PathBuf>(&[], None).unwrap();
        let name = archive.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("converted_files_"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn test_file_info() {
        let base = tempfile::tempdir().unwrap();
        let path = base.path().join("Report.PDF");
        std::fs::write(&path, vec![0u8; 1536]).unwrap();

        let info = ArtifactManager::file_info(&path);
        assert!(info.exists);
        assert_eq!(info.size, 1536);
        assert_eq!(info.size_formatted, "1.5KB");
        assert_eq!(info.extension, ".pdf");
        assert_eq!(info.mime_type, "application/pdf");

        let missing = ArtifactManager::file_info(base.path().join("none.bin"));
        assert!(!missing.exists);
        assert_eq!(missing.size_formatted, "0B");
        assert_eq!(missing.mime_type, FALLBACK_MIME);
    }

    #[test]
    fn test_list_and_read_files() {
        let base = tempfile::tempdir().unwrap();
        std::fs::write(base.path().join("b.csv"), "x").unwrap();
        std::fs::write(base.path().join("a.csv"), "y").unwrap();
        std::fs::create_dir(base.path().join("sub")).unwrap();

        let names: Vec<String> = ArtifactManager::list_files(base.path())
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);

        assert!(ArtifactManager::list_files(base.path().join("missing")).is_empty());
        assert_eq!(
            ArtifactManager::read_file(base.path().join("a.csv")),
            Some(b"y".to_vec())
        );
        assert_eq!(ArtifactManager::read_file(base.path().join("nope")), None);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(base.path()).unwrap();
        manager.save_upload("x.xls", b"data").unwrap();

        manager.cleanup().unwrap();
        assert!(!manager.root().exists());
        manager.cleanup().unwrap();
    }

    #[test]
    fn test_sweep_removes_only_expired_files() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let dir = manager.create_subdir(CONVERTED_DIR).unwrap();
        let old = dir.join("old.csv");
        let fresh = dir.join("fresh.csv");
        std::fs::write(&old, "a").unwrap();
        std::fs::write(&fresh, "b").unwrap();

        let now = SystemTime::now();
        let two_days_ago = FileTime::from_system_time(now - Duration::from_secs(48 * 3600));
        filetime::set_file_mtime(&old, two_days_ago).unwrap();

        let removed =
            ArtifactManager::sweep_expired_at(base.path(), Duration::from_secs(24 * 3600), now);
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.exists());
    }

    #[test]
    fn test_sweep_prunes_only_emptied_directories() {
        let base = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::with_session_id(base.path(), "s1").unwrap();
        let upload = manager.save_upload("book.xlsx", b"x").unwrap();
        let untouched = manager.create_subdir("keep").unwrap();

        let now = SystemTime::now();
        let old = FileTime::from_system_time(now - Duration::from_secs(3600));
        filetime::set_file_mtime(&upload.path, old).unwrap();

        let removed = ArtifactManager::sweep_expired_at(base.path(), Duration::from_secs(60), now);
        assert_eq!(removed, 1);
        assert!(!manager.root().join(UPLOADS_DIR).exists());
        assert!(untouched.exists());
        assert!(manager.root().exists());
        assert!(base.path().exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        let base = tempfile::tempdir().unwrap();
        assert_eq!(
            ArtifactManager::sweep_expired(base.path().join("absent"), Duration::from_secs(1)),
            0
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(512), "512.0B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.b.xlsx"), ("a.b", ".xlsx"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }
}
