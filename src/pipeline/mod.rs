//! Pipeline - Per-Event State Machine
//!
//! ## Flow
//!
//! ```text
//! INTAKE -> PENDING_PUBLISHED -> SNAPSHOT -> VISION -> SCORE
//!   -> [CONFIRM -> VISION_2 -> RESCORE] -> ACTION -> FINAL_PUBLISHED
//!   -> FORMAT -> DELIVER -> MEMORY_APPEND -> DONE
//! ```
//!
//! A failure in SNAPSHOT or VISION is terminal for the event: the pending
//! publication stays on the bus and the failure is logged. Failures in
//! ACTION, DELIVER, or MEMORY_APPEND are logged and the remaining stages
//! still run, so the final payload is always attempted.

use crate::action_executor::ActionExecutor;
use crate::alert_formatter::{self, AlertMessage};
use crate::bus::EventQueue;
use crate::config_store::{ConfigStore, RuntimeConfig};
use crate::confirmation::ConfirmationController;
use crate::delivery_client::DeliveryClient;
use crate::event_intake::EventIntake;
use crate::event_memory::EventMemory;
use crate::media_decider::decide_media;
use crate::models::{
    AlertAction, Decision, DetectionEvent, EventType, HistoryRecord, RiskLevel, SubjectIdentity,
};
use crate::policy_engine::PolicyEngine;
use crate::publisher::{self, Publisher};
use crate::severity_scorer;
use crate::snapshot_fetcher::SnapshotFetcher;
use crate::vision_client::{VisionClient, VisionRequest};
use chrono::{Local, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline instance wiring every stage
pub struct Pipeline {
    pub config_store: Arc<ConfigStore>,
    pub intake: EventIntake,
    pub fetcher: Arc<SnapshotFetcher>,
    pub vision: Arc<VisionClient>,
    pub policy: Arc<PolicyEngine>,
    pub confirmation: ConfirmationController,
    pub executor: ActionExecutor,
    pub delivery: DeliveryClient,
    pub publisher: Publisher,
    pub memory: Arc<EventMemory>,
}

impl Pipeline {
    /// Consume the event queue; one worker task per accepted detection
    pub async fn run(self: Arc<Self>, queue: Arc<EventQueue>) {
        loop {
            let payload = queue.pop().await;
            let config = self.config_store.snapshot().await;
            let cooldown = Duration::from_secs(config.cooldown_seconds);

            if let Ok(event) = self.intake.accept(&payload, cooldown).await {
                let pipeline = Arc::clone(&self);
                tokio::spawn(async move {
                    pipeline.process(event, config).await;
                });
            }
        }
    }

    /// Drive one detection through the full state machine
    async fn process(&self, event: DetectionEvent, config: Arc<RuntimeConfig>) {
        // Pending publication always precedes the final one
        let pending = publisher::pending_payload(&config, &event);
        if let Err(e) = self.publisher.publish(&config, &pending).await {
            tracing::warn!(event_id = %event.event_id, error = %e, "Pending publish failed");
        }

        let context = self.policy.gather(&config, &event.camera).await;

        if config.exclude_known_faces && context.known_faces_present {
            tracing::info!(
                event_id = %event.event_id,
                "Skipping analysis, known faces present and exclusion enabled"
            );
            let decision = known_face_decision();
            let media = decide_media(decision.risk_level);
            let alert = AlertMessage {
                body: format!(
                    "Person detected on {} \u{2014} ignored because a known face is present.",
                    event.camera
                ),
                speech: String::new(),
                snapshot_media: String::new(),
                clip_media: None,
            };
            let payload =
                publisher::final_payload(&config, &event, &decision, &context, &media, &alert, "");
            if let Err(e) = self.publisher.publish(&config, &payload).await {
                tracing::error!(event_id = %event.event_id, error = %e, "Final publish failed");
            }
            return;
        }

        // SNAPSHOT: give the NVR time to finalize the still
        tokio::time::sleep(Duration::from_secs(config.snapshot_delay_seconds)).await;
        let snapshot = match self.fetcher.fetch(&config, &event.event_id, &event.event_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "Snapshot stage failed, event terminated");
                return;
            }
        };

        // VISION
        let recent_summary = self.policy.recent_summary(&config, &event.camera).await;
        let request = VisionRequest {
            camera: &event.camera,
            context: &context,
            recent_summary: &recent_summary,
            media_rel_path: &snapshot.staging_rel,
            image: &snapshot.bytes,
        };
        let assessment = match self.vision.analyze(&config, &request).await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "Vision stage failed, event terminated");
                return;
            }
        };

        // SCORE, then the gated second pass
        let decision = severity_scorer::score(&assessment, &context);
        let mut decision = self
            .confirmation
            .confirm(
                &config,
                &event.camera,
                &event.event_id,
                decision,
                &context,
                &recent_summary,
            )
            .await;

        if decision.coerce_band() {
            tracing::warn!(
                event_id = %event.event_id,
                score = decision.risk_score,
                "Risk level inconsistent with score, coerced to band"
            );
        }

        // ACTION
        let media = decide_media(decision.risk_level);
        let speech = alert_formatter::make_speech(&event.camera, &decision, &context);
        let clip_path = self
            .executor
            .execute(
                &config,
                &decision,
                &media,
                &event.camera,
                &event.event_id,
                &speech,
                Local::now().hour(),
            )
            .await;
        let clip_rel = clip_path
            .as_ref()
            .map(|_| format!("./ai-clips/{}.mp4", event.event_id));

        // FORMAT + FINAL_PUBLISHED
        let alert = alert_formatter::format_alert(
            &event.camera,
            &event.event_id,
            &decision,
            &context,
            &media,
            &snapshot.staging_rel,
            clip_rel.as_deref(),
        );
        let payload = publisher::final_payload(
            &config,
            &event,
            &decision,
            &context,
            &media,
            &alert,
            &snapshot.detection_path.to_string_lossy(),
        );
        if let Err(e) = self.publisher.publish(&config, &payload).await {
            tracing::error!(event_id = %event.event_id, error = %e, "Final publish failed");
        }

        // DELIVER: low-risk events skip chat but keep the bus publication
        if decision.risk_level >= RiskLevel::Medium {
            self.delivery
                .deliver(&config, &event.camera, &event.event_id, &alert)
                .await;
        } else {
            tracing::info!(
                event_id = %event.event_id,
                risk = %decision.risk_level.as_str(),
                "Skipping chat delivery for low risk"
            );
        }

        // MEMORY_APPEND
        let record = HistoryRecord {
            timestamp: Utc::now(),
            camera: event.camera.clone(),
            risk_level: decision.risk_level,
            event_type: decision.event_type,
            risk_confidence: decision.risk_confidence,
            action: decision.action,
        };
        if let Err(e) = self.memory.append(&record).await {
            tracing::error!(event_id = %event.event_id, error = %e, "History append failed");
        }

        tracing::info!(
            event_id = %event.event_id,
            camera = %event.camera,
            risk = %decision.risk_level.as_str(),
            score = decision.risk_score,
            action = %decision.action.as_str(),
            "Event pipeline complete"
        );
    }
}

/// Decision used when known-face exclusion short-circuits the pipeline
fn known_face_decision() -> Decision {
    Decision {
        risk_level: RiskLevel::Low,
        risk_score: 0,
        risk_confidence: 0.95,
        risk_reason: "known face excluded".to_string(),
        event_type: EventType::KnownPerson,
        action: AlertAction::NotifyOnly,
        subject_identity: SubjectIdentity::Known,
        subject_description: String::new(),
        behavior: String::new(),
    }
}
