//! ActionExecutor - Smart-Home Side Effects
//!
//! ## Responsibilities
//!
//! - Translate the decided action into hub service calls from a closed table
//! - Issue the NVR clip-retention call and fetch the clip when the media
//!   plan requires one
//! - Suppress audible actions during quiet hours unless the risk is critical
//!
//! Every call gets one retry on failure. Hub failures are logged and never
//! block messaging or publication.

use crate::config_store::RuntimeConfig;
use crate::models::{AlertAction, Decision, MediaPlan, RiskLevel};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// ActionExecutor instance
pub struct ActionExecutor {
    client: reqwest::Client,
}

impl ActionExecutor {
    /// Create new ActionExecutor
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Execute the decided action plus the media plan's clip requirement.
    /// Returns the stored clip path when one was fetched.
    pub async fn execute(
        &self,
        config: &RuntimeConfig,
        decision: &Decision,
        media: &MediaPlan,
        camera: &str,
        event_id: &str,
        tts: &str,
        local_hour: u32,
    ) -> Option<PathBuf> {
        // Low risk never escalates past notification
        let action = if decision.risk_level == RiskLevel::Low {
            AlertAction::NotifyOnly
        } else {
            decision.action
        };

        tracing::info!(
            camera = %camera,
            event_id = %event_id,
            action = %action.as_str(),
            risk = %decision.risk_level.as_str(),
            "Executing action"
        );

        let clip_path = if media.clip {
            self.retain_and_fetch_clip(config, event_id).await
        } else {
            None
        };

        let quiet = config.in_quiet_hours(local_hour);
        let critical = decision.risk_level == RiskLevel::Critical;

        match action {
            AlertAction::NotifyOnly | AlertAction::NotifyAndSaveClip => {}
            AlertAction::NotifyAndLight => {
                self.turn_on_lights(config, camera).await;
            }
            AlertAction::NotifyAndSpeaker => {
                if quiet && !critical {
                    tracing::info!(
                        camera = %camera,
                        risk = %decision.risk_level.as_str(),
                        "Suppressing speaker during quiet hours"
                    );
                } else {
                    self.announce(config, tts).await;
                }
            }
            AlertAction::NotifyAndAlarm => {
                self.turn_on_lights(config, camera).await;
                if quiet && !critical {
                    tracing::info!(
                        camera = %camera,
                        risk = %decision.risk_level.as_str(),
                        "Suppressing siren and speakers during quiet hours"
                    );
                } else {
                    self.activate_alarm(config).await;
                    self.announce(config, tts).await;
                }
            }
        }

        clip_path
    }

    async fn turn_on_lights(&self, config: &RuntimeConfig, camera: &str) {
        for entity in config.lights_for(camera) {
            let body = serde_json::json!({
                "entity_id": entity,
                "brightness_pct": 100,
            });
            if !self.call_service(config, "light", "turn_on", &body).await {
                tracing::error!(camera = %camera, entity = %entity, "Failed to turn on zone light");
            }
        }
    }

    async fn announce(&self, config: &RuntimeConfig, tts: &str) {
        if config.speaker_entities.is_empty() {
            tracing::debug!("No speaker entities configured, skipping announcement");
            return;
        }
        let body = serde_json::json!({
            "entity_id": config.speaker_entities,
            "media_content_type": "tts",
            "media_content_id": tts,
        });
        if !self
            .call_service(config, "media_player", "play_media", &body)
            .await
        {
            tracing::error!("Failed to announce on speakers");
        }
    }

    async fn activate_alarm(&self, config: &RuntimeConfig) {
        let body = serde_json::json!({ "entity_id": config.alarm_entity });
        if !self.call_service(config, "switch", "turn_on", &body).await {
            tracing::error!(entity = %config.alarm_entity, "Failed to activate alarm");
        }
    }

    /// POST one hub service call; one retry after a short pause
    async fn call_service(
        &self,
        config: &RuntimeConfig,
        domain: &str,
        service: &str,
        body: &serde_json::Value,
    ) -> bool {
        let url = format!(
            "{}/api/services/{}/{}",
            config.hub_url.trim_end_matches('/'),
            domain,
            service
        );

        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            match self
                .client
                .post(&url)
                .bearer_auth(&config.hub_token)
                .json(body)
                .send()
                .await
            {
                Ok(resp) if matches!(resp.status().as_u16(), 200 | 201) => {
                    tracing::info!(
                        domain = %domain,
                        service = %service,
                        attempt = attempt + 1,
                        "Hub service call OK"
                    );
                    return true;
                }
                Ok(resp) => {
                    tracing::warn!(
                        domain = %domain,
                        service = %service,
                        status = %resp.status(),
                        attempt = attempt + 1,
                        "Hub service call returned non-success"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %domain,
                        service = %service,
                        error = %e,
                        attempt = attempt + 1,
                        "Hub service call failed"
                    );
                }
            }
        }
        false
    }

    /// Mark the event clip for retention and pull the file into the clip store
    async fn retain_and_fetch_clip(
        &self,
        config: &RuntimeConfig,
        event_id: &str,
    ) -> Option<PathBuf> {
        let nvr = config.nvr_api.trim_end_matches('/');

        let retain_url = format!("{}/api/events/{}/retain", nvr, event_id);
        match self.client.post(&retain_url).send().await {
            Ok(resp) if matches!(resp.status().as_u16(), 200 | 201) => {
                tracing::info!(event_id = %event_id, "Clip marked for retention");
            }
            Ok(resp) => {
                tracing::warn!(event_id = %event_id, status = %resp.status(), "Clip retain returned non-success");
            }
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Clip retain failed");
            }
        }

        let clip_dir = config.snapshot_base_dir.join("ai-clips");
        if let Err(e) = fs::create_dir_all(&clip_dir).await {
            tracing::warn!(error = %e, "Cannot create clip store");
            return None;
        }
        let clip_path = clip_dir.join(format!("{}.mp4", event_id));

        let clip_url = format!("{}/api/events/{}/clip.mp4", nvr, event_id);
        match self
            .client
            .get(&clip_url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(body) if body.len() > 1024 => {
                    if let Err(e) = fs::write(&clip_path, &body).await {
                        tracing::warn!(event_id = %event_id, error = %e, "Clip write failed");
                        return None;
                    }
                    tracing::info!(
                        event_id = %event_id,
                        path = %clip_path.display(),
                        size = body.len(),
                        "Clip saved"
                    );
                    Some(clip_path)
                }
                Ok(body) => {
                    tracing::warn!(event_id = %event_id, size = body.len(), "Clip body too small");
                    None
                }
                Err(e) => {
                    tracing::warn!(event_id = %event_id, error = %e, "Clip body read failed");
                    None
                }
            },
            Ok(resp) => {
                tracing::warn!(event_id = %event_id, status = %resp.status(), "Clip download returned non-success");
                None
            }
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Clip download failed");
                None
            }
        }
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}
