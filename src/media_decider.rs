//! MediaDecider - risk band to media requirements

use crate::models::{MediaPlan, RiskLevel};

/// Fixed media table: what to attach and whether to keep monitoring
pub fn decide_media(risk: RiskLevel) -> MediaPlan {
    match risk {
        RiskLevel::Low => MediaPlan {
            snapshot: true,
            clip: false,
            clip_length_secs: 0,
            monitoring: false,
        },
        RiskLevel::Medium => MediaPlan {
            snapshot: true,
            clip: true,
            clip_length_secs: 15,
            monitoring: false,
        },
        RiskLevel::High => MediaPlan {
            snapshot: true,
            clip: true,
            clip_length_secs: 30,
            monitoring: true,
        },
        RiskLevel::Critical => MediaPlan {
            snapshot: true,
            clip: true,
            clip_length_secs: 60,
            monitoring: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_table() {
        assert_eq!(decide_media(RiskLevel::Low).clip, false);
        assert_eq!(decide_media(RiskLevel::Medium).clip_length_secs, 15);
        assert_eq!(decide_media(RiskLevel::High).clip_length_secs, 30);
        assert!(decide_media(RiskLevel::High).monitoring);
        assert_eq!(decide_media(RiskLevel::Critical).clip_length_secs, 60);
        assert!(decide_media(RiskLevel::Low).snapshot);
    }
}
