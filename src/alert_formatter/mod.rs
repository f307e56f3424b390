//! AlertFormatter - Structured Chat Alert + Speech String
//!
//! ## Responsibilities
//!
//! - Build the eight-section chat body (EVENT, SUBJECT, BEHAVIOR, RISK,
//!   CONTEXT, ACTION, MEDIA, ESCALATION); sections are always present and
//!   empty ones show a placeholder
//! - Prefix the title with the severity glyph
//! - Produce the short spoken briefing used for speaker announcements

use crate::models::{AlertAction, Decision, EventContext, MediaPlan, RiskLevel};
use chrono::Local;

/// Placeholder for sections with nothing to say
const EMPTY_SECTION: &str = "-";

/// Formatted alert ready for delivery
#[derive(Debug, Clone)]
pub struct AlertMessage {
    /// Structured body (no media lines)
    pub body: String,
    /// Spoken briefing, at most two sentences
    pub speech: String,
    /// MEDIA reference for the snapshot
    pub snapshot_media: String,
    /// MEDIA reference for the clip when one was saved
    pub clip_media: Option<String>,
}

/// Build the full alert for one finalized event
pub fn format_alert(
    camera: &str,
    event_id: &str,
    decision: &Decision,
    context: &EventContext,
    media: &MediaPlan,
    snapshot_rel: &str,
    clip_rel: Option<&str>,
) -> AlertMessage {
    let risk_upper = decision.risk_level.as_str().to_uppercase();
    let glyph = decision.risk_level.glyph();
    let date_str = Local::now().format("%d %b %Y").to_string();

    let subject_desc = non_empty(&decision.subject_description, EMPTY_SECTION);
    let behavior = non_empty(&decision.behavior, "Person detected in view");
    let reason = non_empty(&decision.risk_reason, EMPTY_SECTION);

    let mut event_short = event_id.to_string();
    event_short.truncate(35);

    let recent_line = if context.recent_events > 0 {
        format!("\nRecent: {} events in window", context.recent_events)
    } else {
        String::new()
    };

    let clip_line = match (media.clip, clip_rel) {
        (true, Some(_)) => format!("{}s clip attached", media.clip_length_secs),
        (true, None) => format!("{}s clip saving...", media.clip_length_secs),
        (false, _) => "No clip needed".to_string(),
    };
    let monitor_line = if media.monitoring {
        "\nContinued monitoring active"
    } else {
        ""
    };

    let body = format!(
        "{glyph} AI SECURITY ALERT - {risk_upper}\n\
         \n\
         EVENT\n\
         Location: {camera}\n\
         Zone: {zone}\n\
         Time: {time} \u{2022} {date}\n\
         Event: {event_short}\n\
         \n\
         SUBJECT\n\
         Identity: {identity}\n\
         {subject_desc}\n\
         \n\
         BEHAVIOR\n\
         {behavior}\n\
         \n\
         RISK\n\
         Threat: {risk_upper}\n\
         Confidence: {confidence:.2}\n\
         Reason: {reason}\n\
         \n\
         CONTEXT\n\
         Home mode: {home_mode}\n\
         Known faces: {known_faces}\n\
         Time of day: {time_of_day}{recent_line}\n\
         \n\
         ACTION\n\
         {action_text}\n\
         \n\
         MEDIA\n\
         Snapshot attached\n\
         {clip_line}{monitor_line}\n\
         \n\
         ESCALATION\n\
         {escalation}",
        glyph = glyph,
        risk_upper = risk_upper,
        camera = camera,
        zone = title_case(&context.camera_zone),
        time = context.local_time,
        date = date_str,
        event_short = event_short,
        identity = title_case(decision.subject_identity.as_str()),
        subject_desc = subject_desc,
        behavior = behavior,
        confidence = decision.risk_confidence,
        reason = reason,
        home_mode = title_case(context.home_mode.as_str()),
        known_faces = if context.known_faces_present { "Yes" } else { "No" },
        time_of_day = title_case(context.time_of_day.as_str()),
        recent_line = recent_line,
        action_text = action_text(decision.action),
        clip_line = clip_line,
        monitor_line = monitor_line,
        escalation = escalation_text(decision.risk_level),
    );

    AlertMessage {
        body,
        speech: make_speech(camera, decision, context),
        snapshot_media: format!("MEDIA:{}", snapshot_rel),
        clip_media: clip_rel.map(|rel| format!("MEDIA:{}", rel)),
    }
}

/// Spoken briefing: severity, camera, subject, behavior, reason; two
/// sentences at most
pub fn make_speech(camera: &str, decision: &Decision, context: &EventContext) -> String {
    let severity_word = match decision.risk_level {
        RiskLevel::Low => "low priority",
        RiskLevel::Medium => "medium priority, please review",
        RiskLevel::High => "high priority, attention required",
        RiskLevel::Critical => "critical, immediate attention required",
    };

    let subject = non_empty(
        &decision.subject_description,
        &decision.event_type.as_str().replace('_', " "),
    );

    let mut detail = format!(
        "{} detected in the {} area",
        capitalize(&subject),
        context.camera_zone.replace('-', " ")
    );
    let behavior = decision.behavior.split('.').next().unwrap_or("").trim();
    if !behavior.is_empty() && behavior.len() < 120 {
        detail.push_str(&format!(", {}", behavior));
    }
    if !decision.risk_reason.is_empty() && decision.risk_reason.len() < 100 {
        detail.push_str(&format!("; {}", decision.risk_reason));
    }

    format!(
        "Security alert from {}, severity {}. {}.",
        camera, severity_word, detail
    )
}

fn action_text(action: AlertAction) -> &'static str {
    match action {
        AlertAction::NotifyOnly => "Owner notified",
        AlertAction::NotifyAndSaveClip => "Owner notified\nClip saved",
        AlertAction::NotifyAndLight => "Owner notified\nClip saved\nLights activated",
        AlertAction::NotifyAndSpeaker => "Owner notified\nClip saved\nSpeaker announcement",
        AlertAction::NotifyAndAlarm => {
            "ALARM ACTIVATED\nAll lights on\nSpeakers active\nClip saved"
        }
    }
}

fn escalation_text(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => EMPTY_SECTION,
        RiskLevel::Medium => {
            "Upgrades to HIGH if:\n\
             - subject remains > 60 sec\n\
             - forced entry attempt detected\n\
             - additional persons appear"
        }
        RiskLevel::High => {
            "Upgrades to CRITICAL if:\n\
             - break-in attempt detected\n\
             - weapon or tool observed\n\
             - multiple intruders confirmed"
        }
        RiskLevel::Critical => {
            "IMMEDIATE RESPONSE\n\
             - alarm siren active\n\
             - all lights on\n\
             - evidence being recorded\n\
             - consider calling authorities"
        }
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn title_case(value: &str) -> String {
    capitalize(&value.replace(['-', '_'], " "))
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_decider::decide_media;
    use crate::models::{EventType, HomeMode, SubjectIdentity, TimeOfDay};

    fn decision(risk: RiskLevel) -> Decision {
        Decision {
            risk_level: risk,
            risk_score: risk.baseline_score(),
            risk_confidence: 0.82,
            risk_reason: "unfamiliar adult near door".to_string(),
            event_type: EventType::UnknownPerson,
            action: AlertAction::for_band(risk),
            subject_identity: SubjectIdentity::Unknown,
            subject_description: "adult in dark hoodie".to_string(),
            behavior: "standing close to the entry door".to_string(),
        }
    }

    fn context() -> EventContext {
        EventContext {
            time_of_day: TimeOfDay::Night,
            home_mode: HomeMode::Away,
            known_faces_present: false,
            camera_zone: "entry".to_string(),
            camera_notes: String::new(),
            recent_events: 2,
            local_time: "02:15:00".to_string(),
        }
    }

    #[test]
    fn test_all_sections_present() {
        let d = decision(RiskLevel::High);
        let media = decide_media(d.risk_level);
        let alert = format_alert(
            "TerraceCam",
            "1700000000.123-abcd",
            &d,
            &context(),
            &media,
            "./ai-snapshots/e.jpg",
            None,
        );
        for section in [
            "EVENT", "SUBJECT", "BEHAVIOR", "RISK", "CONTEXT", "ACTION", "MEDIA", "ESCALATION",
        ] {
            assert!(alert.body.contains(section), "missing section {}", section);
        }
        assert!(alert.body.contains("\u{1f7e0}"));
        assert!(alert.body.contains("Threat: HIGH"));
        assert!(alert.body.contains("30s clip saving..."));
        assert!(alert.body.contains("Continued monitoring active"));
        assert!(alert.body.contains("Upgrades to CRITICAL"));
        assert_eq!(alert.snapshot_media, "MEDIA:./ai-snapshots/e.jpg");
        assert!(alert.clip_media.is_none());
    }

    #[test]
    fn test_low_risk_placeholder_escalation() {
        let d = decision(RiskLevel::Low);
        let media = decide_media(d.risk_level);
        let alert = format_alert("Cam", "e1", &d, &context(), &media, "./s.jpg", None);
        assert!(alert.body.ends_with("ESCALATION\n-"));
        assert!(alert.body.contains("No clip needed"));
    }

    #[test]
    fn test_clip_media_reference_when_saved() {
        let d = decision(RiskLevel::Medium);
        let media = decide_media(d.risk_level);
        let alert = format_alert(
            "Cam",
            "e1",
            &d,
            &context(),
            &media,
            "./s.jpg",
            Some("./ai-clips/e1.mp4"),
        );
        assert_eq!(alert.clip_media.as_deref(), Some("MEDIA:./ai-clips/e1.mp4"));
        assert!(alert.body.contains("15s clip attached"));
    }

    #[test]
    fn test_speech_is_two_sentences() {
        let speech = make_speech("TerraceCam", &decision(RiskLevel::Critical), &context());
        assert!(speech.starts_with("Security alert from TerraceCam"));
        assert!(speech.contains("critical"));
        let sentences = speech.split('.').filter(|s| !s.trim().is_empty()).count();
        assert!(sentences <= 2, "speech too long: {}", speech);
    }

    #[test]
    fn test_empty_behavior_gets_placeholder() {
        let mut d = decision(RiskLevel::Medium);
        d.behavior = String::new();
        let media = decide_media(d.risk_level);
        let alert = format_alert("Cam", "e1", &d, &context(), &media, "./s.jpg", None);
        assert!(alert.body.contains("Person detected in view"));
    }
}
