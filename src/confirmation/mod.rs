//! ConfirmationController - Two-Pass Re-Analysis
//!
//! ## Responsibilities
//!
//! - For high/critical decisions, wait, re-fetch a fresh snapshot, run a
//!   second vision pass, re-score it, and compare bands
//! - Keep the original decision on any failure or timeout
//!
//! Comparison rules: a second band at or above the first keeps the original;
//! a one-band drop adopts the lower band; a drop of two or more bands, or a
//! known_person verdict, forces medium with a "confirmation downgrade"
//! reason.

use crate::config_store::RuntimeConfig;
use crate::models::{AlertAction, Decision, EventContext, EventType, RiskLevel};
use crate::severity_scorer;
use crate::snapshot_fetcher::SnapshotFetcher;
use crate::vision_client::{VisionClient, VisionRequest};
use std::sync::Arc;
use std::time::Duration;

/// Reason attached to forced downgrades
pub const DOWNGRADE_REASON: &str = "confirmation downgrade";

/// ConfirmationController instance
pub struct ConfirmationController {
    fetcher: Arc<SnapshotFetcher>,
    vision: Arc<VisionClient>,
}

impl ConfirmationController {
    /// Create new ConfirmationController
    pub fn new(fetcher: Arc<SnapshotFetcher>, vision: Arc<VisionClient>) -> Self {
        Self { fetcher, vision }
    }

    /// Run the gated second pass; returns the decision to act on
    pub async fn confirm(
        &self,
        config: &RuntimeConfig,
        camera: &str,
        event_id: &str,
        original: Decision,
        context: &EventContext,
        recent_summary: &str,
    ) -> Decision {
        if !config.confirm_enabled || original.risk_level < RiskLevel::High {
            return original;
        }

        tracing::info!(
            camera = %camera,
            event_id = %event_id,
            risk = %original.risk_level.as_str(),
            "Confirmation pass started"
        );

        let deadline = Duration::from_secs(config.confirm_timeout_seconds);
        let second = tokio::time::timeout(
            deadline,
            self.second_pass(config, camera, event_id, context, recent_summary),
        )
        .await;

        match second {
            Ok(Some(second)) => resolve(original, second),
            Ok(None) => {
                tracing::warn!(event_id = %event_id, "Confirmation unavailable, keeping original decision");
                original
            }
            Err(_) => {
                tracing::warn!(event_id = %event_id, "Confirmation timed out, keeping original decision");
                original
            }
        }
    }

    /// Delay, fresh snapshot, second vision pass, re-score
    async fn second_pass(
        &self,
        config: &RuntimeConfig,
        camera: &str,
        event_id: &str,
        context: &EventContext,
        recent_summary: &str,
    ) -> Option<Decision> {
        tokio::time::sleep(Duration::from_secs(config.confirm_delay_seconds)).await;

        let stem = format!("{}-confirm", event_id);
        let snapshot = match self.fetcher.fetch(config, event_id, &stem).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Confirmation snapshot fetch failed");
                return None;
            }
        };

        let request = VisionRequest {
            camera,
            context,
            recent_summary,
            media_rel_path: &snapshot.staging_rel,
            image: &snapshot.bytes,
        };
        let assessment = match self.vision.analyze(config, &request).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Confirmation vision call failed");
                return None;
            }
        };

        Some(severity_scorer::score(&assessment, context))
    }
}

/// Apply the band-comparison rules between the first and second pass
pub fn resolve(original: Decision, second: Decision) -> Decision {
    if second.event_type == EventType::KnownPerson {
        return downgrade_to_medium(original);
    }

    if second.risk_level >= original.risk_level {
        tracing::info!(
            risk = %original.risk_level.as_str(),
            "Confirmation upheld original decision"
        );
        return original;
    }

    let drop = band_index(original.risk_level) - band_index(second.risk_level);
    if drop >= 2 {
        return downgrade_to_medium(original);
    }

    // One-band drop: adopt the second band
    let mut adjusted = original;
    adjusted.risk_level = second.risk_level;
    adjusted.risk_score = second.risk_level.clamp_score(adjusted.risk_score);
    adjusted.action = AlertAction::for_band(second.risk_level);
    tracing::info!(
        risk = %adjusted.risk_level.as_str(),
        "Confirmation downgraded decision one band"
    );
    adjusted
}

fn downgrade_to_medium(original: Decision) -> Decision {
    let mut adjusted = original;
    adjusted.risk_level = RiskLevel::Medium;
    adjusted.risk_score = RiskLevel::Medium.clamp_score(adjusted.risk_score);
    adjusted.action = AlertAction::for_band(RiskLevel::Medium);
    adjusted.risk_reason = DOWNGRADE_REASON.to_string();
    tracing::info!("Confirmation forced downgrade to medium");
    adjusted
}

fn band_index(level: RiskLevel) -> i32 {
    match level {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
        RiskLevel::Critical => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectIdentity;

    fn decision(risk: RiskLevel, event_type: EventType) -> Decision {
        Decision {
            risk_level: risk,
            risk_score: risk.baseline_score(),
            risk_confidence: 0.8,
            risk_reason: "initial".to_string(),
            event_type,
            action: AlertAction::for_band(risk),
            subject_identity: SubjectIdentity::Unknown,
            subject_description: String::new(),
            behavior: String::new(),
        }
    }

    #[test]
    fn test_second_pass_equal_or_higher_keeps_original() {
        let original = decision(RiskLevel::High, EventType::UnknownPerson);
        let second = decision(RiskLevel::Critical, EventType::UnknownPerson);
        let resolved = resolve(original.clone(), second);
        assert_eq!(resolved, original);
    }

    #[test]
    fn test_one_band_drop_downgrades_one_band() {
        let original = decision(RiskLevel::Critical, EventType::UnknownPerson);
        let second = decision(RiskLevel::High, EventType::UnknownPerson);
        let resolved = resolve(original, second);
        assert_eq!(resolved.risk_level, RiskLevel::High);
        assert_eq!(resolved.action, AlertAction::NotifyAndLight);
        assert_eq!(resolved.risk_level, RiskLevel::band_of(resolved.risk_score));
    }

    #[test]
    fn test_two_band_drop_forces_medium() {
        let original = decision(RiskLevel::Critical, EventType::UnknownPerson);
        let second = decision(RiskLevel::Medium, EventType::UnknownPerson);
        let resolved = resolve(original, second);
        assert_eq!(resolved.risk_level, RiskLevel::Medium);
        assert_eq!(resolved.risk_reason, DOWNGRADE_REASON);
    }

    #[test]
    fn test_known_person_downgrades_high_to_medium_not_low() {
        let original = decision(RiskLevel::High, EventType::UnknownPerson);
        let second = decision(RiskLevel::Low, EventType::KnownPerson);
        let resolved = resolve(original, second);
        assert_eq!(resolved.risk_level, RiskLevel::Medium);
        assert_eq!(resolved.risk_reason, DOWNGRADE_REASON);
        assert_eq!(resolved.action, AlertAction::NotifyAndSaveClip);
        assert_eq!(resolved.risk_level, RiskLevel::band_of(resolved.risk_score));
    }
}
