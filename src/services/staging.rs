use crate::api::error::AppError;
use crate::utils::validation::validate_image;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use utoipa::ToSchema;

/// Prefix of every file this store writes; anything else in the directory is left alone.
pub const STAGED_FILE_PREFIX: &str = "food-image-";

const PARTIAL_SUFFIX: &str = ".part";

/// An uploaded image waiting for the next batch run
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub id: String,
    #[serde(rename = "fileName")]
    pub stored_name: String,
    pub original_name: String,
    #[serde(rename = "filePath")]
    #[schema(value_type = String)]
    pub path: PathBuf,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub mime_type: String,
}

#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Outcome of a best-effort removal sweep
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub failures: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log(&self, context: &str) {
        for failure in &self.failures {
            tracing::error!("{}: {}", context, failure);
        }
        if self.removed > 0 || !self.failures.is_empty() {
            tracing::info!(
                "🧹 {}: removed {} staged file(s), {} failure(s)",
                context,
                self.removed,
                self.failures.len()
            );
        }
    }

    fn record(&mut self, path: &Path, result: io::Result<()>) {
        match result {
            Ok(()) => self.removed += 1,
            Err(source) => self.failures.push(CleanupError {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Hands out `(millis, sequence)` pairs. The sequence alone is unique for the
/// process lifetime; the timestamp never goes backwards even if the wall clock does.
#[derive(Debug, Default)]
struct StampSource {
    last_millis: AtomicI64,
    sequence: AtomicU64,
}

impl StampSource {
    fn next(&self) -> (i64, u64) {
        let now = Utc::now().timestamp_millis();
        let previous = self.last_millis.fetch_max(now, Ordering::SeqCst);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        (previous.max(now), sequence)
    }
}

/// Disk directory of staged images plus the in-memory registry describing them.
///
/// Every registry mutation goes through the single `registry` lock. Disk writes for
/// new uploads happen outside it; deletions happen inside it, file first, so no
/// registered entry ever points at a missing file.
pub struct StagingStore {
    dir: PathBuf,
    max_file_size: usize,
    registry: Mutex<Vec<StagedFile>>,
    stamps: StampSource,
}

impl StagingStore {
    /// Creates the directory if needed; paths handed out are absolute.
    pub async fn open(dir: impl AsRef<Path>, max_file_size: usize) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir.as_ref()).await?;
        let dir = tokio::fs::canonicalize(dir.as_ref()).await?;

        Ok(Self {
            dir,
            max_file_size,
            registry: Mutex::new(Vec::new()),
            stamps: StampSource::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validates, writes and registers one upload
    pub async fn put(
        &self,
        data: &[u8],
        original_name: &str,
        declared_type: Option<&str>,
    ) -> Result<StagedFile, AppError> {
        let validated = validate_image(original_name, declared_type, data, self.max_file_size)?;

        let (millis, sequence) = self.stamps.next();
        let stored_name = format!(
            "{}{}-{}.{}",
            STAGED_FILE_PREFIX, millis, sequence, validated.extension
        );
        let path = self.dir.join(&stored_name);
        let partial = self.dir.join(format!("{}{}", stored_name, PARTIAL_SUFFIX));

        if let Err(e) = write_then_rename(&partial, &path, data).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(AppError::Io(e));
        }

        let staged = StagedFile {
            id: format!("{}-{}", millis, sequence),
            stored_name,
            original_name: validated.display_name,
            path,
            size_bytes: data.len() as u64,
            uploaded_at: Utc::now(),
            mime_type: validated.mime_type,
        };

        self.registry.lock().await.push(staged.clone());

        tracing::info!(
            "📥 Staged {} -> {} ({} bytes)",
            staged.original_name,
            staged.stored_name,
            staged.size_bytes
        );
        Ok(staged)
    }

    /// Registered files in upload order
    pub async fn list(&self) -> Vec<StagedFile> {
        self.registry.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn get(&self, id: &str) -> Result<StagedFile, AppError> {
        self.registry
            .lock()
            .await
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Removes one file and its entry. A file already missing from disk still counts
    /// as deleted; any other unlink failure puts the entry back where it was.
    ///
    /// The entry leaves the registry before the unlink is awaited, so a cancelled call
    /// never leaves an entry pointing at a removed file.
    pub async fn delete(&self, id: &str) -> Result<StagedFile, AppError> {
        let mut registry = self.registry.lock().await;
        let index = registry
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| not_found(id))?;

        let removed = registry.remove(index);
        if let Err(e) = remove_staged_file(&removed.path).await {
            registry.insert(index, removed);
            return Err(AppError::Io(e));
        }

        tracing::info!("🗑️  Deleted staged file {} ({})", removed.id, removed.stored_name);
        Ok(removed)
    }

    /// Removes every staged file and empties the registry, continuing past failures.
    pub async fn delete_all(&self) -> CleanupReport {
        let mut registry = self.registry.lock().await;
        let mut report = CleanupReport::default();

        while let Some(file) = registry.pop() {
            report.record(&file.path, remove_staged_file(&file.path).await);
        }

        report
    }

    /// Moves every registered file into a batch in one critical section.
    /// Uploads that land afterwards belong to the next batch.
    pub async fn take_batch(&self) -> Result<StagedBatch, AppError> {
        let mut registry = self.registry.lock().await;
        if registry.is_empty() {
            return Err(AppError::NoFilesStaged);
        }

        Ok(StagedBatch {
            files: std::mem::take(&mut *registry),
        })
    }

    /// Drops files registered longer ago than `age`. Entries whose file could not be
    /// removed stay registered and are retried on the next sweep.
    pub async fn evict_older_than(&self, age: chrono::Duration) -> CleanupReport {
        let cutoff = Utc::now() - age;
        let mut registry = self.registry.lock().await;
        let mut report = CleanupReport::default();
        let mut index = 0;

        while index < registry.len() {
            if registry[index].uploaded_at >= cutoff {
                index += 1;
                continue;
            }

            let file = registry.remove(index);
            match remove_staged_file(&file.path).await {
                Ok(()) => {
                    tracing::info!("⏰ Evicted abandoned upload {} ({})", file.id, file.stored_name);
                    report.removed += 1;
                }
                Err(source) => {
                    report.failures.push(CleanupError {
                        path: file.path.clone(),
                        source,
                    });
                    registry.insert(index, file);
                    index += 1;
                }
            }
        }

        report
    }

    /// Deletes staged files on disk that no registry entry refers to, such as those
    /// left behind by a previous process.
    pub async fn purge_orphans(&self) -> io::Result<CleanupReport> {
        let registry = self.registry.lock().await;
        let mut report = CleanupReport::default();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(STAGED_FILE_PREFIX) {
                continue;
            }

            let path = entry.path();
            if registry.iter().any(|f| f.path == path) {
                continue;
            }
            report.record(&path, remove_staged_file(&path).await);
        }

        Ok(report)
    }
}

/// Files checked out of the registry for one batch run.
///
/// `release` removes them; if the batch is dropped without being released (a panic
/// or a cancelled request) the files are removed synchronously on drop.
#[derive(Debug)]
pub struct StagedBatch {
    files: Vec<StagedFile>,
}

impl StagedBatch {
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Unlinks the batch's files one at a time. A file stays owned by the batch until
    /// its unlink has finished, so if this future is dropped midway the finalizer
    /// still sees whatever is left.
    pub async fn release(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        while let Some(path) = self.files.last().map(|f| f.path.clone()) {
            let result = remove_staged_file(&path).await;
            self.files.pop();
            report.record(&path, result);
        }

        report
    }
}

impl Drop for StagedBatch {
    fn drop(&mut self) {
        if self.files.is_empty() {
            return;
        }

        tracing::warn!(
            "Batch of {} file(s) dropped before release, removing synchronously",
            self.files.len()
        );
        // Only reached on panic or cancellation; a released batch is already empty.
        let mut report = CleanupReport::default();
        for file in &self.files {
            let result = match std::fs::remove_file(&file.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            };
            report.record(&file.path, result);
        }
        report.log("Batch finalizer");
    }
}

async fn write_then_rename(partial: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    tokio::fs::write(partial, data).await?;
    tokio::fs::rename(partial, path).await
}

/// Unlinks a staged file; one that is already gone counts as removed.
async fn remove_staged_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("Staged file already gone: {}", path.display());
            Ok(())
        }
        other => other,
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("File not found: {}", id))
}
