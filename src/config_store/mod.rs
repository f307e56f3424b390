//! ConfigStore - Runtime Configuration (SSoT)
//!
//! ## Responsibilities
//!
//! - Load and validate the JSON config document at startup
//! - Overlay secrets from an env-style file
//! - Watch the file for changes and swap snapshots atomically
//! - Hand out immutable snapshots valid for the lifetime of one event
//!
//! ## Design Principles
//!
//! - SSoT: every tunable lives here; components never read env/files directly
//! - Readers always see a complete snapshot; a reload mid-event never changes
//!   behavior for that event
//! - An invalid document is fatal at startup only; on reload the previous
//!   snapshot stays in force

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Runtime configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    // Bus
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_topic_subscribe: String,
    pub mqtt_topic_publish: String,

    // NVR
    pub nvr_api: String,

    // Vision endpoint
    pub vision_endpoint: String,
    pub vision_endpoint_fallback: Option<String>,
    pub vision_model: String,
    pub vision_timeout_seconds: u64,

    // Agent gateway
    pub agent_webhook: String,
    pub agent_token: String,
    pub agent_name: String,
    pub alert_channel: String,
    pub alert_recipients: Vec<String>,
    pub alert_delivery_enabled: bool,

    // Smart-home hub
    pub hub_url: String,
    pub hub_token: String,
    pub home_mode_entity: String,
    pub known_faces_entity: String,
    pub exclude_known_faces: bool,

    // Per-camera policy
    pub camera_zones: HashMap<String, String>,
    pub camera_zone_default: String,
    pub camera_notes: HashMap<String, String>,
    pub camera_zone_lights: HashMap<String, Vec<String>>,
    pub camera_zone_lights_default: Vec<String>,
    pub speaker_entities: Vec<String>,
    pub alarm_entity: String,

    // Pipeline timing
    pub cooldown_seconds: u64,
    pub snapshot_delay_seconds: u64,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,
    pub day_start_hour: u32,
    pub evening_start_hour: u32,
    pub night_start_hour: u32,

    // History / policy window
    pub recent_events_window_seconds: u64,
    pub event_history_file: PathBuf,
    pub event_history_max_lines: usize,

    // Confirmation
    pub confirm_enabled: bool,
    pub confirm_delay_seconds: u64,
    pub confirm_timeout_seconds: u64,

    // Stores
    pub snapshot_base_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub staging_ttl_seconds: u64,

    // Secrets overlay
    pub secrets_env_file: Option<PathBuf>,

    // Backpressure
    pub event_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            mqtt_topic_subscribe: "frigate/events".to_string(),
            mqtt_topic_publish: "sentinel/frigate/analysis".to_string(),
            nvr_api: "http://localhost:5000".to_string(),
            vision_endpoint: "http://localhost:11434".to_string(),
            vision_endpoint_fallback: None,
            vision_model: "qwen2.5vl:7b".to_string(),
            vision_timeout_seconds: 60,
            agent_webhook: "http://localhost:18789/hooks/agent".to_string(),
            agent_token: String::new(),
            agent_name: "Sentinel".to_string(),
            alert_channel: "whatsapp".to_string(),
            alert_recipients: Vec::new(),
            alert_delivery_enabled: true,
            hub_url: "http://localhost:8123".to_string(),
            hub_token: String::new(),
            home_mode_entity: "input_select.home_mode".to_string(),
            known_faces_entity: "binary_sensor.known_faces_present".to_string(),
            exclude_known_faces: false,
            camera_zones: HashMap::new(),
            camera_zone_default: "entry".to_string(),
            camera_notes: HashMap::new(),
            camera_zone_lights: HashMap::new(),
            camera_zone_lights_default: Vec::new(),
            speaker_entities: Vec::new(),
            alarm_entity: "switch.security_siren".to_string(),
            cooldown_seconds: 30,
            snapshot_delay_seconds: 3,
            quiet_hours_start: 23,
            quiet_hours_end: 6,
            day_start_hour: 6,
            evening_start_hour: 18,
            night_start_hour: 23,
            recent_events_window_seconds: 600,
            event_history_file: PathBuf::from("/var/lib/sentinel/events-history.jsonl"),
            event_history_max_lines: 5000,
            confirm_enabled: true,
            confirm_delay_seconds: 4,
            confirm_timeout_seconds: 90,
            snapshot_base_dir: PathBuf::from("/var/lib/sentinel"),
            staging_dir: PathBuf::from("/var/lib/sentinel/workspace"),
            staging_ttl_seconds: 3600,
            secrets_env_file: None,
            event_queue_capacity: 64,
        }
    }
}

impl RuntimeConfig {
    /// Zone tag for a camera, with the configured default
    pub fn zone_for(&self, camera: &str) -> String {
        self.camera_zones
            .get(camera)
            .cloned()
            .unwrap_or_else(|| self.camera_zone_default.clone())
    }

    /// Free-form policy note for a camera
    pub fn notes_for(&self, camera: &str) -> String {
        self.camera_notes
            .get(camera)
            .cloned()
            .unwrap_or_else(|| "unspecified".to_string())
    }

    /// Light entities for a camera's zone, with the configured fallback
    pub fn lights_for(&self, camera: &str) -> Vec<String> {
        self.camera_zone_lights
            .get(camera)
            .cloned()
            .unwrap_or_else(|| self.camera_zone_lights_default.clone())
    }

    /// Quiet-hours check for a local hour, handling windows that wrap midnight
    pub fn in_quiet_hours(&self, hour: u32) -> bool {
        if self.quiet_hours_start > self.quiet_hours_end {
            hour >= self.quiet_hours_start || hour < self.quiet_hours_end
        } else {
            hour >= self.quiet_hours_start && hour < self.quiet_hours_end
        }
    }

    /// Validate required fields, enum domains, and numeric ranges
    pub fn validate(&self) -> Result<()> {
        fn require(name: &str, value: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
            Ok(())
        }

        require("mqtt_host", &self.mqtt_host)?;
        require("mqtt_topic_subscribe", &self.mqtt_topic_subscribe)?;
        require("mqtt_topic_publish", &self.mqtt_topic_publish)?;
        require("nvr_api", &self.nvr_api)?;
        require("vision_endpoint", &self.vision_endpoint)?;
        require("vision_model", &self.vision_model)?;
        require("agent_webhook", &self.agent_webhook)?;
        require("hub_url", &self.hub_url)?;
        require("alarm_entity", &self.alarm_entity)?;
        require("camera_zone_default", &self.camera_zone_default)?;

        for (name, hour) in [
            ("quiet_hours_start", self.quiet_hours_start),
            ("quiet_hours_end", self.quiet_hours_end),
            ("day_start_hour", self.day_start_hour),
            ("evening_start_hour", self.evening_start_hour),
            ("night_start_hour", self.night_start_hour),
        ] {
            if hour > 23 {
                return Err(Error::Config(format!("{} out of range: {}", name, hour)));
            }
        }

        if self.vision_timeout_seconds == 0 {
            return Err(Error::Config("vision_timeout_seconds must be > 0".into()));
        }
        if self.event_history_max_lines == 0 {
            return Err(Error::Config("event_history_max_lines must be > 0".into()));
        }
        if self.event_queue_capacity == 0 {
            return Err(Error::Config("event_queue_capacity must be > 0".into()));
        }
        if self.confirm_timeout_seconds == 0 {
            return Err(Error::Config("confirm_timeout_seconds must be > 0".into()));
        }
        if self.alert_delivery_enabled && self.alert_recipients.is_empty() {
            return Err(Error::Config(
                "alert_recipients must not be empty while delivery is enabled".into(),
            ));
        }

        Ok(())
    }
}

fn looks_masked_secret(value: &str) -> bool {
    value.trim().starts_with("********")
}

/// Parse the JSON document and apply the secrets overlay
fn parse_document(text: &str) -> Result<RuntimeConfig> {
    let mut config: RuntimeConfig =
        serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid config JSON: {}", e)))?;

    // Masked placeholders in the document never become live secrets
    if looks_masked_secret(&config.mqtt_pass) {
        config.mqtt_pass = String::new();
    }
    if looks_masked_secret(&config.agent_token) {
        config.agent_token = String::new();
    }
    if looks_masked_secret(&config.hub_token) {
        config.hub_token = String::new();
    }

    if let Some(path) = config.secrets_env_file.clone() {
        if path.exists() {
            apply_secrets_env(&mut config, &path)?;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Overlay MQTT/gateway/hub secrets from an env-style file
fn apply_secrets_env(config: &mut RuntimeConfig, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('\'').trim_matches('"');
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "MQTT_PASS" => config.mqtt_pass = value.to_string(),
            "AGENT_TOKEN" => config.agent_token = value.to_string(),
            "HUB_TOKEN" => config.hub_token = value.to_string(),
            _ => {}
        }
    }
    Ok(())
}

/// ConfigStore instance
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<RuntimeConfig>>,
    last_modified: RwLock<Option<SystemTime>>,
}

impl ConfigStore {
    /// Load the document at `path`; an invalid document refuses startup
    pub fn load(path: PathBuf) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = parse_document(&text)?;
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

        tracing::info!(
            path = %path.display(),
            cameras = config.camera_zones.len(),
            "Runtime config loaded"
        );

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
            last_modified: RwLock::new(modified),
        })
    }

    /// Immutable snapshot; callers hold it for the lifetime of one event
    pub async fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.current.read().await.clone()
    }

    /// Re-check the file and swap the snapshot when it changed.
    /// A failed reload keeps the previous snapshot.
    pub async fn reload_if_changed(&self) {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Config stat failed");
                return;
            }
        };

        {
            let last = self.last_modified.read().await;
            if *last == Some(modified) {
                return;
            }
        }

        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Config read failed, keeping previous snapshot");
                return;
            }
        };

        match parse_document(&text) {
            Ok(config) => {
                *self.current.write().await = Arc::new(config);
                *self.last_modified.write().await = Some(modified);
                tracing::info!(path = %self.path.display(), "Runtime config reloaded");
            }
            Err(e) => {
                *self.last_modified.write().await = Some(modified);
                tracing::warn!(error = %e, "Config reload rejected, keeping previous snapshot");
            }
        }
    }

    /// Spawn the watch loop; polls the file mtime every few seconds
    pub fn spawn_watcher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.reload_if_changed().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_doc() -> serde_json::Value {
        serde_json::json!({
            "mqtt_host": "broker.local",
            "alert_recipients": ["+15550000000"],
        })
    }

    #[test]
    fn test_defaults_applied_for_missing_fields() {
        let config = parse_document(&minimal_doc().to_string()).unwrap();
        assert_eq!(config.cooldown_seconds, 30);
        assert_eq!(config.snapshot_delay_seconds, 3);
        assert_eq!(config.mqtt_host, "broker.local");
        assert_eq!(config.quiet_hours_start, 23);
    }

    #[test]
    fn test_validation_rejects_bad_hour() {
        let mut doc = minimal_doc();
        doc["quiet_hours_start"] = serde_json::json!(24);
        assert!(parse_document(&doc.to_string()).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_endpoint() {
        let mut doc = minimal_doc();
        doc["vision_endpoint"] = serde_json::json!("");
        assert!(parse_document(&doc.to_string()).is_err());
    }

    #[test]
    fn test_validation_requires_recipients_when_delivering() {
        let mut doc = minimal_doc();
        doc["alert_recipients"] = serde_json::json!([]);
        assert!(parse_document(&doc.to_string()).is_err());

        doc["alert_delivery_enabled"] = serde_json::json!(false);
        assert!(parse_document(&doc.to_string()).is_ok());
    }

    #[test]
    fn test_masked_secret_is_dropped() {
        let mut doc = minimal_doc();
        doc["hub_token"] = serde_json::json!("********abcd");
        let config = parse_document(&doc.to_string()).unwrap();
        assert!(config.hub_token.is_empty());
    }

    #[test]
    fn test_secrets_env_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nHUB_TOKEN='tok-123'\nMQTT_PASS=pw").unwrap();

        let mut doc = minimal_doc();
        doc["secrets_env_file"] = serde_json::json!(file.path());
        let config = parse_document(&doc.to_string()).unwrap();
        assert_eq!(config.hub_token, "tok-123");
        assert_eq!(config.mqtt_pass, "pw");
    }

    #[test]
    fn test_quiet_hours_wrap() {
        let config = RuntimeConfig::default();
        assert!(config.in_quiet_hours(23));
        assert!(config.in_quiet_hours(2));
        assert!(!config.in_quiet_hours(6));
        assert!(!config.in_quiet_hours(12));
    }

    #[test]
    fn test_zone_and_lights_fallback() {
        let mut config = RuntimeConfig::default();
        config.camera_zones.insert("GarageCam".into(), "garage".into());
        config
            .camera_zone_lights
            .insert("GarageCam".into(), vec!["light.garage".into()]);
        config.camera_zone_lights_default = vec!["light.porch".into()];

        assert_eq!(config.zone_for("GarageCam"), "garage");
        assert_eq!(config.zone_for("Elsewhere"), "entry");
        assert_eq!(config.lights_for("GarageCam"), vec!["light.garage".to_string()]);
        assert_eq!(config.lights_for("Elsewhere"), vec!["light.porch".to_string()]);
    }

    #[tokio::test]
    async fn test_reload_keeps_previous_on_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, minimal_doc().to_string()).unwrap();

        let store = ConfigStore::load(path.clone()).unwrap();
        assert_eq!(store.snapshot().await.mqtt_host, "broker.local");

        std::fs::write(&path, "{ not json").unwrap();
        // Force mtime comparison to see a change
        *store.last_modified.write().await = None;
        store.reload_if_changed().await;
        assert_eq!(store.snapshot().await.mqtt_host, "broker.local");
    }
}
