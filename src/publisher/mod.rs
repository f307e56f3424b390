//! Publisher - Analysis Topic Payloads
//!
//! ## Responsibilities
//!
//! - Build the pending payload emitted right after intake accepts an event
//! - Build the final payload carrying the scored decision, context, media
//!   plan, formatted body, and speech string
//! - Publish both retained at QoS 1 with the same event_id so consumers can
//!   update in place

use crate::alert_formatter::AlertMessage;
use crate::bus::BusClient;
use crate::config_store::RuntimeConfig;
use crate::error::Result;
use crate::models::{
    AlertAction, AnalysisPayload, Decision, DetectionEvent, EventContext, EventType, MediaPlan,
    RiskLevel,
};
use chrono::Utc;

/// Preliminary payload for a just-accepted event
pub fn pending_payload(config: &RuntimeConfig, event: &DetectionEvent) -> AnalysisPayload {
    AnalysisPayload {
        camera: event.camera.clone(),
        label: event.label.clone(),
        risk: RiskLevel::Low,
        risk_score: 0,
        risk_confidence: 0.0,
        event_type: EventType::Other,
        action: AlertAction::NotifyOnly,
        analysis: format!(
            "Person detected on {} \u{2014} vision analysis pending.",
            event.camera
        ),
        tts: String::new(),
        behavior: String::new(),
        subject_identity: "unknown".to_string(),
        subject_description: String::new(),
        camera_zone: config.zone_for(&event.camera),
        home_mode: "unknown".to_string(),
        time_of_day: "unknown".to_string(),
        media_snapshot: false,
        media_clip: false,
        clip_url: None,
        snapshot_path: String::new(),
        timestamp: Utc::now(),
        event_id: event.event_id.clone(),
    }
}

/// Complete payload for a scored and confirmed event
#[allow(clippy::too_many_arguments)]
pub fn final_payload(
    config: &RuntimeConfig,
    event: &DetectionEvent,
    decision: &Decision,
    context: &EventContext,
    media: &MediaPlan,
    alert: &AlertMessage,
    snapshot_path: &str,
) -> AnalysisPayload {
    let clip_url = media.clip.then(|| {
        format!(
            "{}/api/events/{}/clip.mp4",
            config.nvr_api.trim_end_matches('/'),
            event.event_id
        )
    });

    AnalysisPayload {
        camera: event.camera.clone(),
        label: event.label.clone(),
        risk: decision.risk_level,
        risk_score: decision.risk_score,
        risk_confidence: decision.risk_confidence,
        event_type: decision.event_type,
        action: decision.action,
        analysis: alert.body.clone(),
        tts: alert.speech.clone(),
        behavior: decision.behavior.clone(),
        subject_identity: decision.subject_identity.as_str().to_string(),
        subject_description: decision.subject_description.clone(),
        camera_zone: context.camera_zone.clone(),
        home_mode: context.home_mode.as_str().to_string(),
        time_of_day: context.time_of_day.as_str().to_string(),
        media_snapshot: media.snapshot,
        media_clip: media.clip,
        clip_url,
        snapshot_path: snapshot_path.to_string(),
        timestamp: Utc::now(),
        event_id: event.event_id.clone(),
    }
}

/// Publisher instance
pub struct Publisher {
    bus: BusClient,
}

impl Publisher {
    /// Create new Publisher over the shared bus handle
    pub fn new(bus: BusClient) -> Self {
        Self { bus }
    }

    /// Serialize and publish one payload, retained at QoS 1
    pub async fn publish(&self, config: &RuntimeConfig, payload: &AnalysisPayload) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.bus
            .publish_retained(&config.mqtt_topic_publish, &text)
            .await?;
        tracing::info!(
            topic = %config.mqtt_topic_publish,
            event_id = %payload.event_id,
            risk = %payload.risk.as_str(),
            "Analysis published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_decider::decide_media;
    use crate::models::SubjectIdentity;

    fn event() -> DetectionEvent {
        DetectionEvent {
            event_id: "evt-1".to_string(),
            camera: "GarageCam".to_string(),
            label: "person".to_string(),
            score: 0.9,
            start_time: Utc::now(),
        }
    }

    #[test]
    fn test_pending_payload_shape() {
        let config = RuntimeConfig::default();
        let payload = pending_payload(&config, &event());
        assert_eq!(payload.risk, RiskLevel::Low);
        assert!(payload.analysis.contains("vision analysis pending"));
        assert_eq!(payload.event_id, "evt-1");
        assert!(payload.clip_url.is_none());
    }

    #[test]
    fn test_final_payload_carries_decision_and_clip_url() {
        let config = RuntimeConfig::default();
        let decision = Decision {
            risk_level: RiskLevel::High,
            risk_score: 5,
            risk_confidence: 0.75,
            risk_reason: "after hours".to_string(),
            event_type: EventType::UnknownPerson,
            action: AlertAction::NotifyAndLight,
            subject_identity: SubjectIdentity::Unknown,
            subject_description: "adult".to_string(),
            behavior: "looking around".to_string(),
        };
        let context = EventContext::default();
        let media = decide_media(decision.risk_level);
        let alert = AlertMessage {
            body: "body".to_string(),
            speech: "speech".to_string(),
            snapshot_media: "MEDIA:./s.jpg".to_string(),
            clip_media: None,
        };

        let payload = final_payload(
            &config,
            &event(),
            &decision,
            &context,
            &media,
            &alert,
            "/var/lib/sentinel/ai-snapshots/evt-1.jpg",
        );
        assert_eq!(payload.risk, RiskLevel::High);
        assert_eq!(payload.risk_score, 5);
        assert!(payload.media_clip);
        assert_eq!(
            payload.clip_url.as_deref(),
            Some("http://localhost:5000/api/events/evt-1/clip.mp4")
        );
        assert_eq!(payload.tts, "speech");

        // Serialized payload survives a round trip unchanged
        let text = serde_json::to_string(&payload).unwrap();
        let back: AnalysisPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(payload, back);
    }
}
