//! Decision extraction from vision-model replies
//!
//! The model is instructed to end with a `JSON:` line, but replies arrive in
//! several shapes: prefixed, fenced, bare, or buried mid-prose. Strategies
//! run in order; each either yields a decision object or defers to the next.
//! A reply with no usable JSON still produces a valid assessment via the
//! keyword fallback, so a parse failure never reaches downstream stages.

use crate::models::{
    AlertAction, Assessment, EventType, RiskLevel, SubjectIdentity,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static JSON_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^json:\s*(.*)").expect("valid regex"));
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?[ \t]*\n(.*?)```").expect("valid regex")
});
static EMBEDDED_RISK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"risk"\s*:\s*"[^"]*"[^{}]*\}"#).expect("valid regex")
});

/// Marker carried in `risk_reason` when no structured JSON was found
pub const FALLBACK_REASON: &str = "fallback: no structured decision in vision reply";

/// Parse the reply into an assessment, falling back to keyword extraction
pub fn extract_assessment(text: &str) -> Assessment {
    if let Some(value) = extract_decision_json(text) {
        if let Some(assessment) = assessment_from_value(&value, text) {
            return assessment;
        }
    }
    tracing::info!("No decision JSON in vision reply, using keyword fallback");
    fallback_assessment(text)
}

/// Ordered extraction strategies; each must yield an object carrying "risk"
fn extract_decision_json(text: &str) -> Option<Value> {
    strategy_prefix(text)
        .or_else(|| strategy_fence(text))
        .or_else(|| strategy_balanced(text))
        .or_else(|| strategy_embedded(text))
}

/// Candidate must parse to an object that mentions risk
fn parse_candidate(candidate: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(candidate.trim()).ok()?;
    let obj = value.as_object()?;
    if obj.contains_key("risk") {
        Some(value)
    } else {
        None
    }
}

/// Strategy 1: last line beginning with `JSON:`; the object may sit on the
/// same line or on the next one
fn strategy_prefix(text: &str) -> Option<Value> {
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate().rev() {
        let Some(caps) = JSON_PREFIX.captures(line.trim()) else {
            continue;
        };
        let mut candidate = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if candidate.is_empty() {
            candidate = lines.get(i + 1).map(|l| l.trim()).unwrap_or("");
        }
        return parse_candidate(candidate);
    }
    None
}

/// Strategy 2: first fenced code block tagged `json` or untagged
fn strategy_fence(text: &str) -> Option<Value> {
    let caps = CODE_FENCE.captures(text)?;
    parse_candidate(caps.get(1)?.as_str())
}

/// Strategy 3: substring from the first `{` to its brace-balanced close,
/// skipping braces inside string literals
fn strategy_balanced(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return parse_candidate(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strategy 4: any single-level `{… "risk": "…" …}` fragment
fn strategy_embedded(text: &str) -> Option<Value> {
    let m = EMBEDDED_RISK.find(text)?;
    parse_candidate(m.as_str())
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Confidence arrives as a number or string, sometimes as a percent
fn confidence_field(value: Option<&Value>) -> f32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.5),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.5),
        _ => 0.5,
    };
    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0) as f32
}

/// Build a sanitized assessment from a flat or nested decision object
fn assessment_from_value(value: &Value, full_text: &str) -> Option<Assessment> {
    let obj = value.as_object()?;
    let risk = obj.get("risk")?;

    // Nested: {"risk":{"level","confidence","reason"},…}; flat: {"risk":"low",…}
    let (level_raw, confidence, reason) = match risk.as_object() {
        Some(risk_obj) => (
            string_field(risk_obj, "level").unwrap_or_else(|| "low".to_string()),
            confidence_field(risk_obj.get("confidence")),
            string_field(risk_obj, "reason").unwrap_or_else(|| "AI analysis".to_string()),
        ),
        None => (
            risk.as_str().unwrap_or("low").to_string(),
            confidence_field(obj.get("confidence")),
            string_field(obj, "reason").unwrap_or_else(|| "AI analysis".to_string()),
        ),
    };

    let risk_level = RiskLevel::parse(&level_raw).unwrap_or(RiskLevel::Low);
    let event_type = EventType::parse(&string_field(obj, "type").unwrap_or_default());
    let action = AlertAction::parse(&string_field(obj, "action").unwrap_or_default());

    let (subject_identity, subject_description) = match obj.get("subject").and_then(Value::as_object)
    {
        Some(subject) => (
            SubjectIdentity::parse(&string_field(subject, "identity").unwrap_or_default()),
            string_field(subject, "description").unwrap_or_default(),
        ),
        None => {
            let identity = if event_type == EventType::KnownPerson {
                SubjectIdentity::Known
            } else {
                SubjectIdentity::Unknown
            };
            (identity, event_type.as_str().replace('_', " "))
        }
    };

    Some(Assessment {
        risk_level,
        risk_confidence: confidence,
        risk_reason: reason,
        event_type,
        action,
        subject_identity,
        subject_description,
        behavior: string_field(obj, "behavior").unwrap_or_default(),
        prose: strip_machine_lines(full_text),
    })
}

/// Keyword-derived assessment when every strategy failed
fn fallback_assessment(text: &str) -> Assessment {
    let lower = text.to_lowercase();

    let (event_type, risk_level) = if ["delivery", "package"].iter().any(|k| lower.contains(k)) {
        (EventType::Delivery, RiskLevel::Medium)
    } else if ["loiter", "linger", "concealment", "mask", "hood up"]
        .iter()
        .any(|k| lower.contains(k))
    {
        (EventType::UnknownPerson, RiskLevel::High)
    } else {
        (EventType::UnknownPerson, RiskLevel::Low)
    };

    let confidence = if risk_level == RiskLevel::Low { 0.4 } else { 0.6 };

    Assessment {
        risk_level,
        risk_confidence: confidence,
        risk_reason: FALLBACK_REASON.to_string(),
        event_type,
        action: AlertAction::for_band(risk_level),
        subject_identity: SubjectIdentity::Unknown,
        subject_description: event_type.as_str().replace('_', " "),
        behavior: String::new(),
        prose: strip_machine_lines(text),
    }
}

/// Drop machine lines (MEDIA references, JSON blocks, fences) from the prose
pub fn strip_machine_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut skip_next_object = false;
    let mut in_fence = false;
    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if skip_next_object {
            skip_next_object = false;
            if trimmed.starts_with('{') {
                continue;
            }
        }
        if let Some(caps) = JSON_PREFIX.captures(trimmed) {
            let tail = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if tail.is_empty() {
                skip_next_object = true;
            }
            continue;
        }
        if trimmed.to_lowercase().starts_with("media:") {
            continue;
        }
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_same_line() {
        let reply = "A person is at the door.\nJSON: {\"risk\":\"medium\",\"type\":\"unknown_person\",\"confidence\":0.7,\"action\":\"notify_and_save_clip\",\"reason\":\"unfamiliar adult\"}";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.event_type, EventType::UnknownPerson);
        assert_eq!(a.action, AlertAction::NotifyAndSaveClip);
        assert_eq!(a.risk_reason, "unfamiliar adult");
    }

    #[test]
    fn test_prefix_next_line() {
        let reply = "Assessment follows.\nJSON:\n{\"risk\":\"high\",\"action\":\"notify_and_light\"}";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::High);
        assert_eq!(a.action, AlertAction::NotifyAndLight);
    }

    #[test]
    fn test_fence_without_prefix_still_parses() {
        let reply = "Someone is outside.\n```json\n{\"risk\":\"low\",\"action\":\"notify_only\"}\n```\nDone.";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_ne!(a.risk_reason, FALLBACK_REASON);
    }

    #[test]
    fn test_untagged_fence_parses() {
        let reply = "```\n{\"risk\":\"medium\"}\n```";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_balanced_braces_with_nested_object() {
        let reply = r#"Result: {"subject":{"identity":"known","description":"neighbor in red coat"},"behavior":"waving at camera","risk":{"level":"low","confidence":0.9,"reason":"recognized visitor"},"type":"known_person","action":"notify_only"} end"#;
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.subject_identity, SubjectIdentity::Known);
        assert_eq!(a.subject_description, "neighbor in red coat");
        assert_eq!(a.behavior, "waving at camera");
        assert!((a.risk_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_embedded_fragment() {
        // First brace opens an object that never closes; strategy 4 finds
        // the flat fragment later in the text
        let reply = "broken {\"oops\": ... and then {\"risk\":\"medium\",\"action\":\"notify_and_save_clip\"} trailing";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_percent_confidence_normalized() {
        let reply = "JSON: {\"risk\":\"low\",\"confidence\":71.0,\"action\":\"notify_only\"}";
        let a = extract_assessment(reply);
        assert!((a.risk_confidence - 0.71).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_enums_sanitized() {
        let reply = "JSON: {\"risk\":\"LOW\",\"type\":\"ghost\",\"action\":\"launch_drone\"}";
        let a = extract_assessment(reply);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.event_type, EventType::Other);
        assert_eq!(a.action, AlertAction::NotifyOnly);
    }

    #[test]
    fn test_fallback_delivery_keywords() {
        let a = extract_assessment("A courier left a package at the door and walked away.");
        assert_eq!(a.event_type, EventType::Delivery);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.risk_reason, FALLBACK_REASON);
    }

    #[test]
    fn test_fallback_loitering_keywords() {
        let a = extract_assessment("An individual is lingering near the gate with their hood up.");
        assert_eq!(a.event_type, EventType::UnknownPerson);
        assert_eq!(a.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_fallback_plain_prose() {
        let a = extract_assessment("Nothing notable in frame.");
        assert_eq!(a.event_type, EventType::UnknownPerson);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert!((a.risk_confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_strip_machine_lines() {
        let reply = "MEDIA:./ai-snapshots/e1.jpg\nPerson at the gate.\nJSON: {\"risk\":\"low\"}";
        let prose = strip_machine_lines(reply);
        assert_eq!(prose, "Person at the gate.");
    }

    #[test]
    fn test_strip_json_on_following_line() {
        let reply = "Summary here.\nJSON:\n{\"risk\":\"low\"}";
        assert_eq!(strip_machine_lines(reply), "Summary here.");
    }
}
