use crate::config::IntakeConfig;
use crate::services::staging::StagingStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Opens the upload directory and clears files left behind by a previous process.
pub async fn setup_staging(config: &IntakeConfig) -> anyhow::Result<Arc<StagingStore>> {
    let store = StagingStore::open(&config.upload_dir, config.max_file_size)
        .await
        .with_context(|| {
            format!(
                "failed to open upload directory {}",
                config.upload_dir.display()
            )
        })?;

    info!("📁 Staging directory: {}", store.dir().display());

    let report = store
        .purge_orphans()
        .await
        .context("failed to scan upload directory for leftovers")?;
    report.log("Startup purge");

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::staging::STAGED_FILE_PREFIX;

    #[tokio::test]
    async fn test_setup_purges_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join(format!("{}1-0.jpg", STAGED_FILE_PREFIX));
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&leftover, b"stale").unwrap();
        std::fs::write(&unrelated, b"keep").unwrap();

        let config = IntakeConfig {
            upload_dir: dir.path().to_path_buf(),
            ..IntakeConfig::default()
        };
        let store = setup_staging(&config).await.unwrap();

        assert_eq!(store.count().await, 0);
        assert!(!leftover.exists());
        assert!(unrelated.exists());
    }
}
