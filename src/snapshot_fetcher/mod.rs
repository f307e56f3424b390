//! SnapshotFetcher - Still Image Retrieval from the NVR
//!
//! ## Responsibilities
//!
//! - Fetch the event snapshot, falling back to the thumbnail
//! - Store the bytes in the detection store and duplicate them into the
//!   staging workspace (the agent gateway only accepts relative media paths)
//! - Sweep stale staging copies on a TTL
//!
//! A body of 1 KiB or less is treated as a placeholder and rejected.

use crate::config_store::RuntimeConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Bodies must exceed this many bytes to count as a real image
const MIN_IMAGE_BYTES: usize = 1024;

/// Where one fetched snapshot landed
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    /// Detection store path ({base}/ai-snapshots/{stem}.jpg)
    pub detection_path: PathBuf,
    /// Workspace-relative reference for media lines
    pub staging_rel: String,
    /// Raw JPEG bytes, reused for the vision request
    pub bytes: Vec<u8>,
}

/// SnapshotFetcher instance
pub struct SnapshotFetcher {
    client: reqwest::Client,
}

impl SnapshotFetcher {
    /// Create new SnapshotFetcher
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Fetch the snapshot for `event_id` and store it under `stem`.
    /// `stem` differs from the event id for confirmation re-fetches.
    pub async fn fetch(
        &self,
        config: &RuntimeConfig,
        event_id: &str,
        stem: &str,
    ) -> Result<StoredSnapshot> {
        let bytes = self.fetch_bytes(config, event_id).await?;

        let detection_dir = config.snapshot_base_dir.join("ai-snapshots");
        fs::create_dir_all(&detection_dir).await?;
        let detection_path = detection_dir.join(format!("{}.jpg", stem));
        fs::write(&detection_path, &bytes).await?;

        let staging_dir = config.staging_dir.join("ai-snapshots");
        fs::create_dir_all(&staging_dir).await?;
        let staging_path = staging_dir.join(format!("{}.jpg", stem));
        fs::write(&staging_path, &bytes).await?;

        tracing::info!(
            event_id = %event_id,
            path = %detection_path.display(),
            size = bytes.len(),
            "Snapshot stored"
        );

        Ok(StoredSnapshot {
            detection_path,
            staging_rel: format!("./ai-snapshots/{}.jpg", stem),
            bytes,
        })
    }

    /// snapshot.jpg first, thumbnail.jpg as fallback; no further retries
    async fn fetch_bytes(&self, config: &RuntimeConfig, event_id: &str) -> Result<Vec<u8>> {
        for endpoint in ["snapshot.jpg", "thumbnail.jpg"] {
            let url = format!(
                "{}/api/events/{}/{}",
                config.nvr_api.trim_end_matches('/'),
                event_id,
                endpoint
            );
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(body) if body.len() > MIN_IMAGE_BYTES => {
                        tracing::debug!(
                            event_id = %event_id,
                            endpoint = %endpoint,
                            size = body.len(),
                            "Snapshot fetched"
                        );
                        return Ok(body.to_vec());
                    }
                    Ok(body) => {
                        tracing::warn!(
                            event_id = %event_id,
                            endpoint = %endpoint,
                            size = body.len(),
                            "Snapshot body too small, trying fallback"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(event_id = %event_id, endpoint = %endpoint, error = %e, "Snapshot body read failed");
                    }
                },
                Ok(resp) => {
                    tracing::warn!(
                        event_id = %event_id,
                        endpoint = %endpoint,
                        status = %resp.status(),
                        "Snapshot fetch returned non-success"
                    );
                }
                Err(e) => {
                    tracing::warn!(event_id = %event_id, endpoint = %endpoint, error = %e, "Snapshot fetch failed");
                }
            }
        }

        Err(Error::Upstream(format!(
            "no snapshot or thumbnail available for event {}",
            event_id
        )))
    }
}

impl Default for SnapshotFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove staging snapshots older than the configured TTL
pub async fn sweep_staging(staging_dir: &Path, ttl: Duration) {
    let dir = staging_dir.join("ai-snapshots");
    let mut entries = match fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(_) => return,
    };

    let mut removed = 0usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let expired = modified
            .elapsed()
            .map(|age| age > ttl)
            .unwrap_or(false);
        if expired && fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed = removed, dir = %dir.display(), "Staging snapshots swept");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_image_boundary() {
        // 1024 bytes is a placeholder, 1025 is a real image
        assert!(!(1024 > MIN_IMAGE_BYTES));
        assert!(1025 > MIN_IMAGE_BYTES);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("ai-snapshots");
        fs::create_dir_all(&staged).await.unwrap();
        fs::write(staged.join("fresh.jpg"), b"data").await.unwrap();

        sweep_staging(dir.path(), Duration::from_secs(3600)).await;
        assert!(staged.join("fresh.jpg").exists());

        sweep_staging(dir.path(), Duration::from_secs(0)).await;
        assert!(!staged.join("fresh.jpg").exists());
    }
}
