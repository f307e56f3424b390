//! EventIntake - Detection Decoding + Per-Camera Cooldown
//!
//! ## Responsibilities
//!
//! - Decode raw bus messages into detection events
//! - Reject everything that is not a new person detection
//! - Enforce the per-camera cooldown with an atomic check-and-set
//!
//! A malformed message is logged and skipped; it never blocks the queue.
//! Cooldown drops happen before any pending publication or vision call.

use crate::models::DetectionEvent;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    after: RawAfter,
}

#[derive(Debug, Default, Deserialize)]
struct RawAfter {
    #[serde(default)]
    id: String,
    #[serde(default)]
    camera: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    start_time: Option<f64>,
}

/// Why a message was not handed to a worker
#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    NotNew,
    NotPerson,
    MissingId,
    Cooldown,
}

/// Per-camera process-lived state
#[derive(Debug)]
pub struct CameraState {
    pub name: String,
    pub last_alert_at: Option<Instant>,
}

/// Map of per-camera state machines; one small lock per camera,
/// no global write lock on the hot path
#[derive(Default)]
pub struct CameraRegistry {
    cameras: RwLock<HashMap<String, Arc<Mutex<CameraState>>>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, camera: &str) -> Arc<Mutex<CameraState>> {
        {
            let cameras = self.cameras.read().await;
            if let Some(state) = cameras.get(camera) {
                return Arc::clone(state);
            }
        }
        let mut cameras = self.cameras.write().await;
        Arc::clone(cameras.entry(camera.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(CameraState {
                name: camera.to_string(),
                last_alert_at: None,
            }))
        }))
    }

    /// Atomic cooldown check-and-set: returns false (and does not advance
    /// the timestamp) while the camera is still cooling down
    pub async fn try_accept(&self, camera: &str, cooldown: Duration) -> bool {
        let entry = self.entry(camera).await;
        let mut state = entry.lock().await;
        let now = Instant::now();
        if let Some(last) = state.last_alert_at {
            if now.duration_since(last) < cooldown {
                return false;
            }
        }
        state.last_alert_at = Some(now);
        true
    }
}

/// EventIntake instance
pub struct EventIntake {
    registry: CameraRegistry,
}

impl EventIntake {
    pub fn new() -> Self {
        Self {
            registry: CameraRegistry::new(),
        }
    }

    /// Decode and filter one bus message; `Ok` events are on-cooldown and
    /// ready for a worker
    pub async fn accept(
        &self,
        payload: &[u8],
        cooldown: Duration,
    ) -> std::result::Result<DetectionEvent, Rejection> {
        let event = decode_event(payload)?;

        if !self.registry.try_accept(&event.camera, cooldown).await {
            tracing::info!(
                camera = %event.camera,
                event_id = %event.event_id,
                "Skipping event, cooldown active"
            );
            return Err(Rejection::Cooldown);
        }

        tracing::info!(
            camera = %event.camera,
            event_id = %event.event_id,
            score = event.score,
            "Person detected"
        );
        Ok(event)
    }
}

impl Default for EventIntake {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the Frigate-shaped event JSON and apply the type/label filter
pub fn decode_event(payload: &[u8]) -> std::result::Result<DetectionEvent, Rejection> {
    let raw: RawEvent = match serde_json::from_slice(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed bus message");
            return Err(Rejection::Malformed);
        }
    };

    if raw.event_type != "new" {
        return Err(Rejection::NotNew);
    }
    if raw.after.label != "person" {
        return Err(Rejection::NotPerson);
    }
    if raw.after.id.is_empty() {
        return Err(Rejection::MissingId);
    }

    let start_time = raw
        .after
        .start_time
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch as i64, 0))
        .unwrap_or_else(Utc::now);

    Ok(DetectionEvent {
        event_id: raw.after.id,
        camera: if raw.after.camera.is_empty() {
            "unknown".to_string()
        } else {
            raw.after.camera
        },
        label: raw.after.label,
        score: raw.after.score,
        start_time,
    })
}
