//! SeverityScorer - Deterministic Risk Re-Scoring
//!
//! ## Responsibilities
//!
//! - Start from the vision model's proposed risk level (mapped to a baseline
//!   score) and apply weighted context rules
//! - Map the final score back to a band and re-derive the action
//!
//! The model's judgment is preserved as the starting point; the rules only
//! adjust it against context the model may not weigh consistently.

use crate::models::{
    AlertAction, Assessment, Decision, EventContext, EventType, HomeMode, RiskLevel, TimeOfDay,
};

/// Zones that carry an entry-point bonus
const SENSITIVE_ZONES: [&str; 4] = ["entry", "garage", "terrace", "door"];

/// Suspicious behavior keywords with per-category weights.
/// Matched categories sum, capped at +3.
const SUSPICIOUS_KEYWORDS: [(&str, u32); 9] = [
    ("loiter", 2),
    ("linger", 2),
    ("conceal", 2),
    ("mask", 2),
    ("hood", 2),
    ("tool", 3),
    ("forc", 3),
    ("climb", 3),
    ("pry", 3),
];

/// Calm keywords; subtract 1 only when nothing suspicious matched
const CALM_KEYWORDS: [&str; 3] = ["walking", "standing", "passing"];

/// Contribution of the behavior string, capped at +3
fn behavior_adjustment(behavior: &str) -> i32 {
    let lower = behavior.to_lowercase();
    let mut bonus: u32 = 0;
    for (keyword, weight) in SUSPICIOUS_KEYWORDS {
        if lower.contains(keyword) {
            bonus += weight;
        }
    }
    if bonus > 0 {
        return bonus.min(3) as i32;
    }
    if CALM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return -1;
    }
    0
}

/// Re-score the model's assessment against the event context.
/// Running this twice on the same inputs yields the same Decision.
pub fn score(assessment: &Assessment, context: &EventContext) -> Decision {
    let baseline = assessment.risk_level.baseline_score() as i32;
    let mut adjustments: i32 = 0;

    if assessment.event_type == EventType::UnknownPerson {
        adjustments += 2;
    }
    match context.time_of_day {
        TimeOfDay::Evening => adjustments += 1,
        TimeOfDay::Night => adjustments += 2,
        TimeOfDay::Day => {}
    }
    let zone = context.camera_zone.to_lowercase();
    if SENSITIVE_ZONES.iter().any(|z| zone.contains(z)) {
        adjustments += 1;
    }
    match context.home_mode {
        HomeMode::Away => adjustments += 3,
        HomeMode::Sleep => adjustments += 2,
        HomeMode::Home | HomeMode::Guest => {}
    }
    adjustments += behavior_adjustment(&assessment.behavior);
    if context.known_faces_present {
        adjustments -= 4;
    }
    if assessment.event_type == EventType::Delivery {
        adjustments -= 2;
    }

    let risk_score = (baseline + adjustments).max(0) as u32;
    let risk_level = RiskLevel::band_of(risk_score);
    let action = derive_action(risk_level, assessment.action);

    if risk_level != assessment.risk_level {
        tracing::info!(
            ai_risk = %assessment.risk_level.as_str(),
            scored_risk = %risk_level.as_str(),
            score = risk_score,
            "Rule engine adjusted risk"
        );
    }

    Decision {
        risk_level,
        risk_score,
        risk_confidence: assessment.risk_confidence,
        risk_reason: assessment.risk_reason.clone(),
        event_type: assessment.event_type,
        action,
        subject_identity: assessment.subject_identity,
        subject_description: assessment.subject_description.clone(),
        behavior: assessment.behavior.clone(),
    }
}

/// Band default, unless the model asked for a stronger action and the band
/// is at least medium
fn derive_action(level: RiskLevel, requested: AlertAction) -> AlertAction {
    let band_action = AlertAction::for_band(level);
    if level >= RiskLevel::Medium && requested.strength() > band_action.strength() {
        requested
    } else {
        band_action
    }
}
