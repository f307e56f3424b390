//! Sentinel Bridge
//!
//! Event-driven bridge from NVR person detections to risk-scored security
//! alerts.
//!
//! ## Architecture (13 Components)
//!
//! 1. EventIntake - bus decode, label filter, per-camera cooldown
//! 2. SnapshotFetcher - still retrieval with thumbnail fallback + staging
//! 3. VisionClient - structured vision analysis with 4-strategy parsing
//! 4. PolicyEngine - time-of-day, home mode, known faces, zone, history
//! 5. SeverityScorer - deterministic re-scoring from the AI baseline
//! 6. ConfirmationController - two-pass re-analysis for high/critical
//! 7. MediaDecider - risk band to snapshot/clip/monitoring table
//! 8. ActionExecutor - smart-home REST side effects with allowlist
//! 9. AlertFormatter - eight-section chat body + speech string
//! 10. DeliveryClient - agent gateway webhook
//! 11. Publisher - pending + final retained bus payloads
//! 12. EventMemory - append-only JSONL history with window queries
//! 13. ConfigStore - validated, hot-reloadable runtime configuration
//!
//! ## Design Principles
//!
//! - SSoT: ConfigStore owns every tunable; events capture one snapshot
//! - One task per in-flight event; per-camera locks, no global lock
//! - Every stage failure is isolated; the bus payload is always attempted

pub mod action_executor;
pub mod alert_formatter;
pub mod bus;
pub mod config_store;
pub mod confirmation;
pub mod delivery_client;
pub mod error;
pub mod event_intake;
pub mod event_memory;
pub mod media_decider;
pub mod models;
pub mod pipeline;
pub mod policy_engine;
pub mod publisher;
pub mod severity_scorer;
pub mod snapshot_fetcher;
pub mod vision_client;

pub use error::{Error, Result};
