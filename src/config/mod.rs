use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Image types accepted by the intake endpoint.
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// File extensions accepted by the intake endpoint.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

/// Extra room for multipart framing on top of the file size limit.
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Configuration for image intake and batch detection
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Maximum size of a single uploaded image in bytes (default: 10 MB)
    pub max_file_size: usize,

    /// Directory holding staged images (default: "uploads")
    pub upload_dir: PathBuf,

    /// Base URL of the YOLO detection server (default: "http://127.0.0.1:5000")
    pub detector_url: String,

    /// Timeout for a single detection backend round trip in seconds (default: 120)
    pub detector_timeout_secs: u64,

    /// Confidence threshold sent with each batch (default: 0.7)
    pub conf_threshold: f32,

    /// IoU threshold for duplicate suppression (default: 0.3)
    pub iou_threshold: f32,

    /// Staged files older than this are evicted by the sweeper (default: 60 minutes)
    pub staging_max_age_minutes: u64,

    /// How often the sweeper runs in seconds (default: 300)
    pub staging_sweep_interval_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MB
            upload_dir: PathBuf::from("uploads"),
            detector_url: "http://127.0.0.1:5000".to_string(),
            detector_timeout_secs: 120,
            conf_threshold: 0.7,
            iou_threshold: 0.3,
            staging_max_age_minutes: 60,
            staging_sweep_interval_secs: 300,
        }
    }
}

impl IntakeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            upload_dir: env::var("UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            detector_url: env::var("YOLO_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.detector_url),

            detector_timeout_secs: env::var("YOLO_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.detector_timeout_secs),

            conf_threshold: env::var("CONF_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|t| is_unit_interval(*t))
                .unwrap_or(default.conf_threshold),

            iou_threshold: env::var("IOU_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|t| is_unit_interval(*t))
                .unwrap_or(default.iou_threshold),

            staging_max_age_minutes: env::var("STAGING_MAX_AGE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_max_age_minutes),

            staging_sweep_interval_secs: env::var("STAGING_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.staging_sweep_interval_secs),
        }
    }

    /// Create config for local development against a detector on localhost
    pub fn development() -> Self {
        Self {
            detector_timeout_secs: 30,
            staging_max_age_minutes: 24 * 60,
            ..Self::default()
        }
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }

    pub fn staging_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.staging_max_age_minutes as i64)
    }

    pub fn staging_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.staging_sweep_interval_secs)
    }

    /// Request body limit for the upload route
    pub fn upload_body_limit(&self) -> usize {
        self.max_file_size + MULTIPART_OVERHEAD
    }
}

fn is_unit_interval(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}
