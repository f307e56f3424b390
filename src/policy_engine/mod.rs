//! PolicyEngine - Per-Event Context Gathering
//!
//! ## Responsibilities
//!
//! - Bucket the local hour into day/evening/night against configured bands
//! - Read home mode and known-faces presence from the smart-home hub,
//!   cached for up to 30 seconds
//! - Resolve the camera's zone tag and policy note from config
//! - Count recent detections on the camera from the event memory
//!
//! Hub reads fail soft: a missing or unreachable entity falls back to the
//! safe default (home mode "home", no known faces).

use crate::config_store::RuntimeConfig;
use crate::event_memory::EventMemory;
use crate::models::{EventContext, HomeMode, TimeOfDay};
use chrono::{Local, Timelike};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Hub state reads younger than this are served from cache
const HUB_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HubStateResponse {
    #[serde(default)]
    state: String,
}

/// PolicyEngine instance
pub struct PolicyEngine {
    client: reqwest::Client,
    memory: Arc<EventMemory>,
    hub_cache: RwLock<HashMap<String, (Instant, String)>>,
}

impl PolicyEngine {
    /// Create new PolicyEngine
    pub fn new(memory: Arc<EventMemory>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(6))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            memory,
            hub_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Gather the full context for one event
    pub async fn gather(&self, config: &RuntimeConfig, camera: &str) -> EventContext {
        let now = Local::now();
        let time_of_day = time_bucket(config, now.hour());

        let home_mode = self
            .hub_state(config, &config.home_mode_entity)
            .await
            .map(|s| HomeMode::parse(&s))
            .unwrap_or(HomeMode::Home);

        let known_faces_present = self
            .hub_state(config, &config.known_faces_entity)
            .await
            .map(|s| {
                matches!(
                    s.to_lowercase().as_str(),
                    "on" | "true" | "home" | "detected"
                )
            })
            .unwrap_or(false);

        let recent_events = self
            .memory
            .count_since(camera, config.recent_events_window_seconds)
            .await;

        let context = EventContext {
            time_of_day,
            home_mode,
            known_faces_present,
            camera_zone: config.zone_for(camera),
            camera_notes: config.notes_for(camera),
            recent_events,
            local_time: now.format("%H:%M:%S").to_string(),
        };

        tracing::debug!(
            camera = %camera,
            time_of_day = %context.time_of_day.as_str(),
            home_mode = %context.home_mode.as_str(),
            known_faces = context.known_faces_present,
            zone = %context.camera_zone,
            recent = context.recent_events,
            "Policy context gathered"
        );
        context
    }

    /// History digest for the vision prompt
    pub async fn recent_summary(&self, config: &RuntimeConfig, camera: &str) -> String {
        self.memory
            .recent_summary(camera, config.recent_events_window_seconds)
            .await
    }

    /// One hub entity state, served from the 30 s cache when fresh
    async fn hub_state(&self, config: &RuntimeConfig, entity_id: &str) -> Option<String> {
        {
            let cache = self.hub_cache.read().await;
            if let Some((at, state)) = cache.get(entity_id) {
                if at.elapsed() < HUB_CACHE_TTL {
                    return Some(state.clone());
                }
            }
        }

        let url = format!(
            "{}/api/states/{}",
            config.hub_url.trim_end_matches('/'),
            entity_id
        );
        let resp = match self
            .client
            .get(&url)
            .bearer_auth(&config.hub_token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(entity = %entity_id, error = %e, "Hub state read failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            tracing::warn!(
                entity = %entity_id,
                status = %resp.status(),
                "Hub state read returned non-success"
            );
            return None;
        }

        let state = match resp.json::<HubStateResponse>().await {
            Ok(body) => body.state.trim().to_string(),
            Err(e) => {
                tracing::warn!(entity = %entity_id, error = %e, "Hub state body invalid");
                return None;
            }
        };

        self.hub_cache
            .write()
            .await
            .insert(entity_id.to_string(), (Instant::now(), state.clone()));
        Some(state)
    }
}

/// Local hour to day/evening/night against the configured bands
fn time_bucket(config: &RuntimeConfig, hour: u32) -> TimeOfDay {
    if hour >= config.day_start_hour && hour < config.evening_start_hour {
        TimeOfDay::Day
    } else if hour >= config.evening_start_hour && hour < config.night_start_hour {
        TimeOfDay::Evening
    } else {
        TimeOfDay::Night
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_buckets_default_bands() {
        let config = RuntimeConfig::default();
        assert_eq!(time_bucket(&config, 6), TimeOfDay::Day);
        assert_eq!(time_bucket(&config, 11), TimeOfDay::Day);
        assert_eq!(time_bucket(&config, 17), TimeOfDay::Day);
        assert_eq!(time_bucket(&config, 18), TimeOfDay::Evening);
        assert_eq!(time_bucket(&config, 22), TimeOfDay::Evening);
        assert_eq!(time_bucket(&config, 23), TimeOfDay::Night);
        assert_eq!(time_bucket(&config, 2), TimeOfDay::Night);
        assert_eq!(time_bucket(&config, 5), TimeOfDay::Night);
    }

    #[test]
    fn test_home_mode_domain() {
        assert_eq!(HomeMode::parse("away"), HomeMode::Away);
        assert_eq!(HomeMode::parse("Sleep"), HomeMode::Sleep);
        assert_eq!(HomeMode::parse("unavailable"), HomeMode::Home);
    }
}
