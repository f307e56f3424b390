//! Core data model
//!
//! ## Responsibilities
//!
//! - Risk / event-type / action enums with band and allowlist helpers
//! - Decision value object produced by the vision client + scorer
//! - Per-event policy context
//! - Bus payload and history record shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk band for a scored event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band thresholds: 0-2 low, 3-4 medium, 5-6 high, 7+ critical
    pub fn band_of(score: u32) -> Self {
        match score {
            0..=2 => RiskLevel::Low,
            3..=4 => RiskLevel::Medium,
            5..=6 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Baseline score for the AI-proposed level (scoring starts here)
    pub fn baseline_score(&self) -> u32 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 3,
            RiskLevel::High => 5,
            RiskLevel::Critical => 7,
        }
    }

    /// Clamp a score into this band so level and score stay consistent
    pub fn clamp_score(&self, score: u32) -> u32 {
        match self {
            RiskLevel::Low => score.min(2),
            RiskLevel::Medium => score.clamp(3, 4),
            RiskLevel::High => score.clamp(5, 6),
            RiskLevel::Critical => score.max(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Severity glyph used in alert titles
    pub fn glyph(&self) -> &'static str {
        match self {
            RiskLevel::Low => "\u{1f7e2}",
            RiskLevel::Medium => "\u{1f7e1}",
            RiskLevel::High => "\u{1f7e0}",
            RiskLevel::Critical => "\u{1f534}",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

/// Classified detection subject
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UnknownPerson,
    KnownPerson,
    Delivery,
    Vehicle,
    Animal,
    Loitering,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UnknownPerson => "unknown_person",
            EventType::KnownPerson => "known_person",
            EventType::Delivery => "delivery",
            EventType::Vehicle => "vehicle",
            EventType::Animal => "animal",
            EventType::Loitering => "loitering",
            EventType::Other => "other",
        }
    }

    /// Unknown values map to Other (sanitization rule)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown_person" => EventType::UnknownPerson,
            "known_person" => EventType::KnownPerson,
            "delivery" => EventType::Delivery,
            "vehicle" => EventType::Vehicle,
            "animal" => EventType::Animal,
            "loitering" => EventType::Loitering,
            _ => EventType::Other,
        }
    }
}

/// Closed allowlist of side effects the bridge may perform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    NotifyOnly,
    NotifyAndSaveClip,
    NotifyAndLight,
    NotifyAndSpeaker,
    NotifyAndAlarm,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::NotifyOnly => "notify_only",
            AlertAction::NotifyAndSaveClip => "notify_and_save_clip",
            AlertAction::NotifyAndLight => "notify_and_light",
            AlertAction::NotifyAndSpeaker => "notify_and_speaker",
            AlertAction::NotifyAndAlarm => "notify_and_alarm",
        }
    }

    /// Escalation order; used when the model requests a stronger action
    pub fn strength(&self) -> u8 {
        match self {
            AlertAction::NotifyOnly => 0,
            AlertAction::NotifyAndSaveClip => 1,
            AlertAction::NotifyAndLight => 2,
            AlertAction::NotifyAndSpeaker => 3,
            AlertAction::NotifyAndAlarm => 4,
        }
    }

    /// Default action for a risk band
    pub fn for_band(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => AlertAction::NotifyOnly,
            RiskLevel::Medium => AlertAction::NotifyAndSaveClip,
            RiskLevel::High => AlertAction::NotifyAndLight,
            RiskLevel::Critical => AlertAction::NotifyAndAlarm,
        }
    }

    /// Values outside the allowlist collapse to notify_only
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify_and_save_clip" => AlertAction::NotifyAndSaveClip,
            "notify_and_light" => AlertAction::NotifyAndLight,
            "notify_and_speaker" => AlertAction::NotifyAndSpeaker,
            "notify_and_alarm" => AlertAction::NotifyAndAlarm,
            _ => AlertAction::NotifyOnly,
        }
    }
}

/// Subject identity as reported by the vision model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubjectIdentity {
    Known,
    Unknown,
}

impl SubjectIdentity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectIdentity::Known => "known",
            SubjectIdentity::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("known") {
            SubjectIdentity::Known
        } else {
            SubjectIdentity::Unknown
        }
    }
}

/// Local-time bucket for scoring
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Day => "day",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Household occupancy mode from the smart-home hub
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HomeMode {
    Home,
    Away,
    Sleep,
    Guest,
}

impl HomeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HomeMode::Home => "home",
            HomeMode::Away => "away",
            HomeMode::Sleep => "sleep",
            HomeMode::Guest => "guest",
        }
    }

    /// Hub states outside the domain default to Home
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "away" => HomeMode::Away,
            "sleep" => HomeMode::Sleep,
            "guest" => HomeMode::Guest,
            _ => HomeMode::Home,
        }
    }
}

/// Person-detection event accepted from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub event_id: String,
    pub camera: String,
    pub label: String,
    pub score: f32,
    pub start_time: DateTime<Utc>,
}

/// Vision-model output before deterministic scoring
#[derive(Debug, Clone)]
pub struct Assessment {
    pub risk_level: RiskLevel,
    pub risk_confidence: f32,
    pub risk_reason: String,
    pub event_type: EventType,
    pub action: AlertAction,
    pub subject_identity: SubjectIdentity,
    pub subject_description: String,
    pub behavior: String,
    /// Prose analysis with MEDIA and JSON blocks stripped
    pub prose: String,
}

/// Scored decision driving actions, delivery, and publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub risk_confidence: f32,
    pub risk_reason: String,
    pub event_type: EventType,
    pub action: AlertAction,
    pub subject_identity: SubjectIdentity,
    pub subject_description: String,
    pub behavior: String,
}

impl Decision {
    /// Coerce risk_level to the band of risk_score after any mutation.
    /// Logs nothing itself; callers log the violation.
    pub fn coerce_band(&mut self) -> bool {
        let band = RiskLevel::band_of(self.risk_score);
        if band != self.risk_level {
            self.risk_level = band;
            true
        } else {
            false
        }
    }
}

/// Context gathered per event by the policy engine
#[derive(Debug, Clone)]
pub struct EventContext {
    pub time_of_day: TimeOfDay,
    pub home_mode: HomeMode,
    pub known_faces_present: bool,
    pub camera_zone: String,
    pub camera_notes: String,
    pub recent_events: u32,
    pub local_time: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self {
            time_of_day: TimeOfDay::Day,
            home_mode: HomeMode::Home,
            known_faces_present: false,
            camera_zone: "entry".to_string(),
            camera_notes: "unspecified".to_string(),
            recent_events: 0,
            local_time: String::new(),
        }
    }
}

/// Media requirements for a risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPlan {
    pub snapshot: bool,
    pub clip: bool,
    pub clip_length_secs: u32,
    pub monitoring: bool,
}

/// One appended line in the event history store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub camera: String,
    pub risk_level: RiskLevel,
    pub event_type: EventType,
    pub risk_confidence: f32,
    pub action: AlertAction,
}

/// Structured payload published on the analysis topic (pending and final)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisPayload {
    pub camera: String,
    pub label: String,
    pub risk: RiskLevel,
    pub risk_score: u32,
    pub risk_confidence: f32,
    pub event_type: EventType,
    pub action: AlertAction,
    pub analysis: String,
    pub tts: String,
    pub behavior: String,
    pub subject_identity: String,
    pub subject_description: String,
    pub camera_zone: String,
    pub home_mode: String,
    pub time_of_day: String,
    pub media_snapshot: bool,
    pub media_clip: bool,
    pub clip_url: Option<String>,
    pub snapshot_path: String,
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_thresholds() {
        assert_eq!(RiskLevel::band_of(0), RiskLevel::Low);
        assert_eq!(RiskLevel::band_of(2), RiskLevel::Low);
        assert_eq!(RiskLevel::band_of(3), RiskLevel::Medium);
        assert_eq!(RiskLevel::band_of(4), RiskLevel::Medium);
        assert_eq!(RiskLevel::band_of(5), RiskLevel::High);
        assert_eq!(RiskLevel::band_of(6), RiskLevel::High);
        assert_eq!(RiskLevel::band_of(7), RiskLevel::Critical);
        assert_eq!(RiskLevel::band_of(13), RiskLevel::Critical);
    }

    #[test]
    fn test_band_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_clamp_score_into_band() {
        assert_eq!(RiskLevel::Medium.clamp_score(9), 4);
        assert_eq!(RiskLevel::Medium.clamp_score(1), 3);
        assert_eq!(RiskLevel::Low.clamp_score(5), 2);
        assert_eq!(RiskLevel::Critical.clamp_score(3), 7);
    }

    #[test]
    fn test_action_allowlist_parse() {
        assert_eq!(AlertAction::parse("notify_and_alarm"), AlertAction::NotifyAndAlarm);
        assert_eq!(AlertAction::parse("call_police"), AlertAction::NotifyOnly);
        assert_eq!(AlertAction::parse("NOTIFY_AND_LIGHT"), AlertAction::NotifyAndLight);
    }

    #[test]
    fn test_event_type_unknown_maps_to_other() {
        assert_eq!(EventType::parse("drone"), EventType::Other);
        assert_eq!(EventType::parse("Delivery"), EventType::Delivery);
    }

    #[test]
    fn test_action_for_band() {
        assert_eq!(AlertAction::for_band(RiskLevel::Low), AlertAction::NotifyOnly);
        assert_eq!(AlertAction::for_band(RiskLevel::Medium), AlertAction::NotifyAndSaveClip);
        assert_eq!(AlertAction::for_band(RiskLevel::High), AlertAction::NotifyAndLight);
        assert_eq!(AlertAction::for_band(RiskLevel::Critical), AlertAction::NotifyAndAlarm);
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = AnalysisPayload {
            camera: "GarageCam".into(),
            label: "person".into(),
            risk: RiskLevel::Medium,
            risk_score: 4,
            risk_confidence: 0.8,
            event_type: EventType::UnknownPerson,
            action: AlertAction::NotifyAndSaveClip,
            analysis: "body".into(),
            tts: "speech".into(),
            behavior: "standing".into(),
            subject_identity: "unknown".into(),
            subject_description: "adult in dark jacket".into(),
            camera_zone: "garage".into(),
            home_mode: "home".into(),
            time_of_day: "evening".into(),
            media_snapshot: true,
            media_clip: true,
            clip_url: None,
            snapshot_path: "/srv/frigate/ai-snapshots/abc.jpg".into(),
            timestamp: Utc::now(),
            event_id: "abc".into(),
        };
        let text = serde_json::to_string(&payload).unwrap();
        let back: AnalysisPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(payload, back);
    }
}
