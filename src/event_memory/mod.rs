//! EventMemory - Append-Only History Store
//!
//! ## Responsibilities
//!
//! - Append one line-delimited JSON record per finalized event
//! - Enforce the configured line cap by oldest-first rewrite
//! - Answer recent-window queries for the policy engine and prompt context
//!
//! Reads tolerate a torn last line, which is expected after a crash
//! mid-append.

use crate::error::Result;
use crate::models::{HistoryRecord, RiskLevel};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// EventMemory instance
pub struct EventMemory {
    path: PathBuf,
    max_lines: usize,
    /// Write lock for append/trim; read lock for queries
    lock: RwLock<()>,
}

impl EventMemory {
    /// Create new EventMemory backed by `path`
    pub fn new(path: PathBuf, max_lines: usize) -> Self {
        Self {
            path,
            max_lines,
            lock: RwLock::new(()),
        }
    }

    /// Append one record, then trim when the cap is exceeded
    pub async fn append(&self, record: &HistoryRecord) -> Result<()> {
        let _guard = self.lock.write().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.trim_locked().await?;

        tracing::debug!(
            camera = %record.camera,
            risk = %record.risk_level.as_str(),
            "Event history appended"
        );
        Ok(())
    }

    /// Rewrite the file keeping only the newest `max_lines` lines
    async fn trim_locked(&self) -> Result<()> {
        let text = fs::read_to_string(&self.path).await?;
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() <= self.max_lines {
            return Ok(());
        }

        let keep = &lines[lines.len() - self.max_lines..];
        let mut out = keep.join("\n");
        out.push('\n');
        fs::write(&self.path, out).await?;

        tracing::info!(
            dropped = lines.len() - self.max_lines,
            kept = self.max_lines,
            "Event history trimmed"
        );
        Ok(())
    }

    /// Records for one camera within the rolling window, oldest first
    pub async fn recent(&self, camera: &str, window_seconds: u64) -> Vec<HistoryRecord> {
        let _guard = self.lock.read().await;

        let text = match fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };

        let cutoff = Utc::now() - Duration::seconds(window_seconds as i64);
        text.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                // Torn or foreign lines are skipped, not fatal
                serde_json::from_str::<HistoryRecord>(line).ok()
            })
            .filter(|r| r.camera == camera && r.timestamp >= cutoff)
            .collect()
    }

    /// Count of detections for one camera within the rolling window
    pub async fn count_since(&self, camera: &str, window_seconds: u64) -> u32 {
        self.recent(camera, window_seconds).await.len() as u32
    }

    /// Short history digest for the vision prompt
    pub async fn recent_summary(&self, camera: &str, window_seconds: u64) -> String {
        let rows = self.recent(camera, window_seconds).await;
        let Some(last) = rows.last() else {
            return format!("- none in last {} minutes", window_seconds / 60);
        };
        let high_or_critical = rows
            .iter()
            .filter(|r| r.risk_level >= RiskLevel::High)
            .count();
        format!(
            "- {} events in last {} minutes ({})\n- last event: {}\n- high/critical count: {}\n- latest type trend: {}",
            rows.len(),
            window_seconds / 60,
            camera,
            last.timestamp.to_rfc3339(),
            high_or_critical,
            last.event_type.as_str(),
        )
    }
}
