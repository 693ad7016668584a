use crate::config::IntakeConfig;
use crate::services::detector::{DetectionBackend, YoloHttpClient};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the detector client and probes it once. An unreachable detector is not fatal;
/// uploads keep working and `/api/process` reports 503 until it comes up.
pub async fn setup_detector(config: &IntakeConfig) -> anyhow::Result<Arc<YoloHttpClient>> {
    let client = YoloHttpClient::new(&config.detector_url, config.detector_timeout())?;
    info!(
        "🤖 YOLO API: {} (timeout {:?})",
        client.base_url(),
        config.detector_timeout()
    );

    match client.health().await {
        Ok(health) => info!("✅ YOLO API is reachable: {}", health),
        Err(e) => warn!("⚠️  YOLO API health check failed: {}", e),
    }

    Ok(Arc::new(client))
}
