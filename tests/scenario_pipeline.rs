//! End-to-end scenarios over the pure pipeline stages:
//! vision reply parsing -> scoring -> confirmation -> media -> formatting
//! -> payload construction. No network involved.

use sentinel_bridge::alert_formatter::format_alert;
use sentinel_bridge::confirmation::{self, DOWNGRADE_REASON};
use sentinel_bridge::media_decider::decide_media;
use sentinel_bridge::models::{
    AlertAction, EventContext, EventType, HomeMode, RiskLevel, TimeOfDay,
};
use sentinel_bridge::severity_scorer::score;
use sentinel_bridge::vision_client::{extract_assessment, FALLBACK_REASON};

fn context(time: TimeOfDay, mode: HomeMode, zone: &str) -> EventContext {
    EventContext {
        time_of_day: time,
        home_mode: mode,
        known_faces_present: false,
        camera_zone: zone.to_string(),
        camera_notes: "unspecified".to_string(),
        recent_events: 0,
        local_time: "11:30:00".to_string(),
    }
}

/// S1: known delivery at 11:30, home, entry zone. AI says low/delivery with
/// confidence 0.8. Stays low, notify_only, no clip.
#[test]
fn daytime_delivery_stays_quiet() {
    let reply = "MEDIA:./ai-snapshots/e1.jpg\n\
        A courier in uniform places a package by the entry door and leaves.\n\
        JSON: {\"subject\":{\"identity\":\"unknown\",\"description\":\"courier in uniform\"},\
        \"behavior\":\"dropping off a package and walking away\",\
        \"risk\":{\"level\":\"low\",\"confidence\":0.8,\"reason\":\"routine delivery\"},\
        \"type\":\"delivery\",\"action\":\"notify_only\"}";

    let assessment = extract_assessment(reply);
    assert_eq!(assessment.event_type, EventType::Delivery);

    let ctx = context(TimeOfDay::Day, HomeMode::Home, "entry");
    let decision = score(&assessment, &ctx);

    assert_eq!(decision.risk_level, RiskLevel::Low);
    assert!(decision.risk_score <= 2);
    assert_eq!(decision.action, AlertAction::NotifyOnly);

    let media = decide_media(decision.risk_level);
    assert!(!media.clip);

    // Low risk means no chat delivery; the pipeline gate is risk >= medium
    assert!(decision.risk_level < RiskLevel::Medium);
}

/// S2: unknown person at 02:15, away, terrace. AI says medium; the rules
/// escalate to critical with alarm and a 60 s clip.
#[test]
fn night_away_prowler_escalates_to_critical() {
    let reply = "Person near the terrace door.\n\
        JSON: {\"subject\":{\"identity\":\"unknown\",\"description\":\"adult, dark clothing\"},\
        \"behavior\":\"approaching door, hood up, looking around\",\
        \"risk\":{\"level\":\"medium\",\"confidence\":0.7,\"reason\":\"unfamiliar person after hours\"},\
        \"type\":\"unknown_person\",\"action\":\"notify_and_save_clip\"}";

    let assessment = extract_assessment(reply);
    let ctx = context(TimeOfDay::Night, HomeMode::Away, "terrace");
    let decision = score(&assessment, &ctx);

    // baseline 3 + unknown 2 + night 2 + zone 1 + away 3 + keyword 2 = 13
    assert_eq!(decision.risk_score, 13);
    assert_eq!(decision.risk_level, RiskLevel::Critical);
    assert_eq!(decision.action, AlertAction::NotifyAndAlarm);

    let media = decide_media(decision.risk_level);
    assert_eq!(media.clip_length_secs, 60);
    assert!(media.monitoring);

    let alert = format_alert(
        "TerraceCam",
        "evt-2",
        &decision,
        &ctx,
        &media,
        "./ai-snapshots/evt-2.jpg",
        None,
    );
    assert!(alert.body.contains("CRITICAL"));
    assert!(alert.body.contains("IMMEDIATE RESPONSE"));
    assert!(alert.speech.contains("critical"));
}

/// S4: prose with no JSON at all still completes with a fallback decision
/// whose reason carries the fallback marker.
#[test]
fn prose_only_reply_uses_fallback_decision() {
    let reply = "I can see a single adult walking through the driveway toward the street. \
        Nothing is being carried and the gait is unhurried.";

    let assessment = extract_assessment(reply);
    assert_eq!(assessment.event_type, EventType::UnknownPerson);
    assert_eq!(assessment.risk_reason, FALLBACK_REASON);

    let ctx = context(TimeOfDay::Day, HomeMode::Home, "driveway");
    let decision = score(&assessment, &ctx);
    assert!(decision.risk_reason.contains("fallback"));
}

/// S5: high-risk decision whose second pass returns known_person downgrades
/// to medium with the downgrade reason and a 15 s clip.
#[test]
fn confirmation_known_person_downgrades_to_medium() {
    let first_reply = "A figure is standing partially out of frame near the cars.\n\
        JSON: {\"risk\":\"high\",\"type\":\"other\",\"confidence\":0.7,\
        \"action\":\"notify_and_light\",\"reason\":\"possible concealment\"}";
    let ctx = context(TimeOfDay::Day, HomeMode::Home, "driveway");
    let original = score(&extract_assessment(first_reply), &ctx);
    assert_eq!(original.risk_level, RiskLevel::High);

    let second_reply = "On the fresh frame this is clearly a resident.\n\
        JSON: {\"subject\":{\"identity\":\"known\",\"description\":\"resident\"},\
        \"risk\":{\"level\":\"low\",\"confidence\":0.9,\"reason\":\"recognized resident\"},\
        \"type\":\"known_person\",\"action\":\"notify_only\"}";
    let second = score(&extract_assessment(second_reply), &ctx);

    let resolved = confirmation::resolve(original, second);
    assert_eq!(resolved.risk_level, RiskLevel::Medium);
    assert_eq!(resolved.risk_reason, DOWNGRADE_REASON);
    assert_eq!(resolved.risk_level, RiskLevel::band_of(resolved.risk_score));

    let media = decide_media(resolved.risk_level);
    assert_eq!(media.clip_length_secs, 15);
}

/// A fenced decision block with no JSON: prefix must still parse
/// (extraction strategy 2).
#[test]
fn fenced_block_without_prefix_parses() {
    let reply = "Here is my assessment.\n```json\n\
        {\"risk\":\"medium\",\"type\":\"loitering\",\"confidence\":0.6,\
        \"action\":\"notify_and_save_clip\",\"reason\":\"repeated passes\"}\n```";
    let assessment = extract_assessment(reply);
    assert_eq!(assessment.risk_level, RiskLevel::Medium);
    assert_eq!(assessment.event_type, EventType::Loitering);
    assert_ne!(assessment.risk_reason, FALLBACK_REASON);
}

/// Invariant 6: the known-faces flag reduces the final score by exactly 4.
#[test]
fn known_faces_flag_reduces_score_by_four() {
    let reply = "JSON: {\"risk\":\"high\",\"type\":\"unknown_person\",\"confidence\":0.7,\
        \"action\":\"notify_and_light\",\"reason\":\"after hours\"}";
    let assessment = extract_assessment(reply);

    let mut ctx = context(TimeOfDay::Night, HomeMode::Home, "entry");
    let without = score(&assessment, &ctx);
    ctx.known_faces_present = true;
    let with = score(&assessment, &ctx);

    assert_eq!(without.risk_score - 4, with.risk_score);
}
