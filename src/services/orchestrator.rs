use crate::api::error::AppError;
use crate::services::detector::{DetectionBackend, Detection, DetectorError, ImageDetections};
use crate::services::staging::{StagedFile, StagingStore};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;

/// Thresholds forwarded to the detector with every batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub conf: f32,
    pub iou: f32,
}

/// One staged file together with what the detector found in it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DetectionResult {
    #[serde(flatten)]
    pub file: StagedFile,
    pub detections: Vec<Detection>,
    pub detected_classes: Vec<String>,
    pub detection_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchSummary {
    pub total_images: usize,
    pub total_detections: usize,
    pub all_detected_classes: Vec<String>,
}

impl BatchSummary {
    pub fn from_results(results: &[DetectionResult]) -> Self {
        let classes: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.detected_classes.iter().map(String::as_str))
            .collect();

        Self {
            total_images: results.len(),
            total_detections: results.iter().map(|r| r.detection_count).sum(),
            all_detected_classes: classes.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub results: Vec<DetectionResult>,
    pub summary: BatchSummary,
}

/// Runs every staged file through the detector in one call and always clears
/// the files it took, whatever the detector does.
pub struct BatchOrchestrator {
    store: Arc<StagingStore>,
    detector: Arc<dyn DetectionBackend>,
    defaults: Thresholds,
    run_lock: Mutex<()>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<StagingStore>,
        detector: Arc<dyn DetectionBackend>,
        defaults: Thresholds,
    ) -> Self {
        Self {
            store,
            detector,
            defaults,
            run_lock: Mutex::new(()),
        }
    }

    pub fn default_thresholds(&self) -> Thresholds {
        self.defaults
    }

    pub async fn run_batch(&self, thresholds: Thresholds) -> Result<BatchOutcome, AppError> {
        let _running = self.run_lock.lock().await;

        let batch = self.store.take_batch().await?;
        tracing::info!(
            "🔍 Processing {} images with YOLO model (conf={}, iou={})",
            batch.len(),
            thresholds.conf,
            thresholds.iou
        );

        let detection = self
            .detector
            .predict_batch(&batch.paths(), thresholds.conf, thresholds.iou)
            .await
            .and_then(|results| merge_results(batch.files(), results));

        batch.release().await.log("Batch cleanup");

        let results = detection?;
        let summary = BatchSummary::from_results(&results);
        tracing::info!(
            "✅ Batch done: {} images, {} detections, classes={:?}",
            summary.total_images,
            summary.total_detections,
            summary.all_detected_classes
        );

        Ok(BatchOutcome { results, summary })
    }
}

/// Pairs detector results with staged files.
///
/// When every result echoes its `image_path` the pairing is by path, so a backend
/// that reorders its output is still merged correctly. Otherwise result `i` belongs
/// to file `i`. Either way the counts must match.
pub fn merge_results(
    files: &[StagedFile],
    results: Vec<ImageDetections>,
) -> Result<Vec<DetectionResult>, DetectorError> {
    if results.len() != files.len() {
        return Err(DetectorError::Backend(format!(
            "Detection backend returned {} results for {} images",
            results.len(),
            files.len()
        )));
    }

    if results.iter().all(|r| r.image_path.is_some()) {
        merge_by_path(files, results)
    } else {
        Ok(files
            .iter()
            .zip(results)
            .map(|(file, result)| attach(file, result))
            .collect())
    }
}

fn merge_by_path(
    files: &[StagedFile],
    results: Vec<ImageDetections>,
) -> Result<Vec<DetectionResult>, DetectorError> {
    let mut by_path: HashMap<PathBuf, ImageDetections> = HashMap::with_capacity(results.len());
    for result in results {
        let Some(path) = result.image_path.clone() else {
            continue;
        };
        if by_path.insert(path.clone(), result).is_some() {
            return Err(DetectorError::Backend(format!(
                "Detection backend returned {} more than once",
                path.display()
            )));
        }
    }

    files
        .iter()
        .map(|file| {
            by_path
                .remove(&file.path)
                .map(|result| attach(file, result))
                .ok_or_else(|| {
                    DetectorError::Backend(format!(
                        "Detection backend returned no result for {}",
                        file.path.display()
                    ))
                })
        })
        .collect()
}

fn attach(file: &StagedFile, result: ImageDetections) -> DetectionResult {
    let detection_count = result.count();
    let detected_classes: BTreeSet<String> = result
        .detected_classes
        .into_iter()
        .chain(result.detections.iter().map(|d| d.class_name.clone()))
        .collect();

    DetectionResult {
        file: file.clone(),
        detections: result.detections,
        detected_classes: detected_classes.into_iter().collect(),
        detection_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::detector::BoundingBox;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

    fn detection(class_name: &str) -> Detection {
        Detection {
            class_id: None,
            class_name: class_name.to_string(),
            confidence: 0.9,
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0,
            },
        }
    }

    fn result(path: Option<PathBuf>, classes: &[&str]) -> ImageDetections {
        ImageDetections {
            image_path: path,
            detections: classes.iter().map(|c| detection(c)).collect(),
            detected_classes: Vec::new(),
            detection_count: Some(classes.len()),
        }
    }

    enum Script {
        Counts(Vec<Vec<&'static str>>),
        Fail(DetectorError),
    }

    struct ScriptedDetector {
        script: Script,
        calls: AtomicUsize,
        seen_paths: StdMutex<Vec<PathBuf>>,
    }

    impl ScriptedDetector {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                seen_paths: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DetectionBackend for ScriptedDetector {
        async fn predict_batch(
            &self,
            image_paths: &[PathBuf],
            _conf_threshold: f32,
            _iou_threshold: f32,
        ) -> Result<Vec<ImageDetections>, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_paths.lock().unwrap() = image_paths.to_vec();
            assert!(image_paths.iter().all(|p| p.exists()));

            match &self.script {
                Script::Counts(per_image) => Ok(per_image
                    .iter()
                    .zip(image_paths)
                    .map(|(classes, path)| result(Some(path.clone()), classes))
                    .collect()),
                Script::Fail(err) => Err(err.clone()),
            }
        }

        async fn model_info(&self) -> Result<serde_json::Value, DetectorError> {
            Ok(serde_json::json!({}))
        }

        async fn health(&self) -> Result<serde_json::Value, DetectorError> {
            Ok(serde_json::json!({"status": "healthy"}))
        }
    }

    async fn setup(
        script: Script,
    ) -> (tempfile::TempDir, Arc<StagingStore>, Arc<ScriptedDetector>, BatchOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StagingStore::open(dir.path(), 10 * 1024 * 1024).await.unwrap());
        let detector = ScriptedDetector::new(script);
        let orchestrator = BatchOrchestrator::new(
            store.clone(),
            detector.clone(),
            Thresholds { conf: 0.7, iou: 0.3 },
        );
        (dir, store, detector, orchestrator)
    }

    fn staged(name: &str, path: &str) -> StagedFile {
        StagedFile {
            id: name.to_string(),
            stored_name: name.to_string(),
            original_name: name.to_string(),
            path: PathBuf::from(path),
            size_bytes: 1,
            uploaded_at: chrono::Utc::now(),
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_registry_skips_backend() {
        let (_dir, _store, detector, orchestrator) = setup(Script::Counts(vec![])).await;

        let err = orchestrator
            .run_batch(orchestrator.default_thresholds())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoFilesStaged));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_three_images_summary_and_cleanup() {
        let (dir, store, detector, orchestrator) = setup(Script::Counts(vec![
            vec!["apple", "banana"],
            vec![],
            vec!["apple"],
        ]))
        .await;

        for name in ["one.jpg", "two.jpg", "three.jpg"] {
            store.put(JPEG, name, Some("image/jpeg")).await.unwrap();
        }
        assert_eq!(store.count().await, 3);

        let outcome = orchestrator
            .run_batch(orchestrator.default_thresholds())
            .await
            .unwrap();

        assert_eq!(outcome.summary.total_images, 3);
        assert_eq!(outcome.summary.total_detections, 3);
        assert_eq!(outcome.summary.all_detected_classes, vec!["apple", "banana"]);
        assert_eq!(outcome.results[0].file.original_name, "one.jpg");
        assert_eq!(outcome.results[0].detection_count, 2);
        assert_eq!(outcome.results[1].detection_count, 0);
        assert_eq!(outcome.results[2].detected_classes, vec!["apple"]);

        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count().await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_still_cleans_up() {
        let (dir, store, _detector, orchestrator) =
            setup(Script::Fail(DetectorError::Backend("model not loaded".into()))).await;
        store.put(JPEG, "one.jpg", Some("image/jpeg")).await.unwrap();

        let err = orchestrator
            .run_batch(orchestrator.default_thresholds())
            .await
            .unwrap_err();
        match err {
            AppError::DetectionBackend(msg) => assert_eq!(msg, "model not loaded"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.count().await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_still_cleans_up() {
        let (dir, store, _detector, orchestrator) =
            setup(Script::Fail(DetectorError::Unavailable("connection refused".into()))).await;
        store.put(JPEG, "one.jpg", Some("image/jpeg")).await.unwrap();

        let err = orchestrator
            .run_batch(orchestrator.default_thresholds())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DetectionBackendUnavailable(_)));
        assert_eq!(store.count().await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_paths_sent_in_upload_order() {
        let (_dir, store, detector, orchestrator) =
            setup(Script::Counts(vec![vec![], vec![]])).await;
        let first = store.put(JPEG, "first.jpg", Some("image/jpeg")).await.unwrap();
        let second = store.put(JPEG, "second.jpg", Some("image/jpeg")).await.unwrap();

        orchestrator
            .run_batch(orchestrator.default_thresholds())
            .await
            .unwrap();
        assert_eq!(
            *detector.seen_paths.lock().unwrap(),
            vec![first.path, second.path]
        );
    }

    #[test]
    fn test_positional_merge() {
        let files = vec![staged("a", "/s/a.jpg"), staged("b", "/s/b.jpg"), staged("c", "/s/c.jpg")];
        let results = vec![
            result(None, &["kiwi", "kiwi"]),
            result(None, &[]),
            result(None, &["fig"]),
        ];

        let merged = merge_results(&files, results).unwrap();
        assert_eq!(merged[0].file.id, "a");
        assert_eq!(merged[0].detection_count, 2);
        assert_eq!(merged[0].detected_classes, vec!["kiwi"]);
        assert_eq!(merged[1].file.id, "b");
        assert_eq!(merged[1].detection_count, 0);
        assert_eq!(merged[2].file.id, "c");
        assert_eq!(merged[2].detected_classes, vec!["fig"]);
    }

    #[test]
    fn test_merge_by_path_survives_reordering() {
        let files = vec![staged("a", "/s/a.jpg"), staged("b", "/s/b.jpg")];
        let results = vec![
            result(Some(PathBuf::from("/s/b.jpg")), &["pear"]),
            result(Some(PathBuf::from("/s/a.jpg")), &[]),
        ];

        let merged = merge_results(&files, results).unwrap();
        assert_eq!(merged[0].file.id, "a");
        assert_eq!(merged[0].detection_count, 0);
        assert_eq!(merged[1].file.id, "b");
        assert_eq!(merged[1].detected_classes, vec!["pear"]);
    }

    #[test]
    fn test_merge_rejects_count_mismatch() {
        let files = vec![staged("a", "/s/a.jpg"), staged("b", "/s/b.jpg")];
        let err = merge_results(&files, vec![result(None, &["fig"])]).unwrap_err();
        assert!(matches!(err, DetectorError::Backend(_)));
    }

    #[test]
    fn test_merge_rejects_unknown_and_duplicate_paths() {
        let files = vec![staged("a", "/s/a.jpg"), staged("b", "/s/b.jpg")];

        let unknown = vec![
            result(Some(PathBuf::from("/s/a.jpg")), &[]),
            result(Some(PathBuf::from("/elsewhere.jpg")), &[]),
        ];
        assert!(merge_results(&files, unknown).is_err());

        let duplicate = vec![
            result(Some(PathBuf::from("/s/a.jpg")), &[]),
            result(Some(PathBuf::from("/s/a.jpg")), &[]),
        ];
        assert!(merge_results(&files, duplicate).is_err());
    }

    #[test]
    fn test_summary_unions_classes() {
        let files = vec![staged("a", "/s/a.jpg"), staged("b", "/s/b.jpg")];
        let merged = merge_results(
            &files,
            vec![result(None, &["tomato", "onion"]), result(None, &["onion"])],
        )
        .unwrap();

        let summary = BatchSummary::from_results(&merged);
        assert_eq!(summary.total_images, 2);
        assert_eq!(summary.total_detections, 3);
        assert_eq!(summary.all_detected_classes, vec!["onion", "tomato"]);
    }
}
