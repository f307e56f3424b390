//! DeliveryClient - Agent Gateway Webhook
//!
//! ## Responsibilities
//!
//! - POST the formatted alert to the agent gateway for chat delivery
//! - One envelope per configured recipient
//!
//! The body is prefixed with a DELIVERY MODE instruction so the agent
//! forwards it verbatim. 200/201/202 count as accepted; anything else is a
//! logged delivery failure that never blocks the pipeline.

use crate::alert_formatter::AlertMessage;
use crate::config_store::RuntimeConfig;
use std::time::Duration;

const FORWARD_INSTRUCTION: &str = "DELIVERY MODE. Forward the EXACT message below verbatim. \
Do not rewrite or add anything. Preserve all formatting:\n\n";

/// DeliveryClient instance
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    /// Create new DeliveryClient
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Deliver the alert to every configured recipient.
    /// Returns true when at least one envelope was accepted.
    pub async fn deliver(
        &self,
        config: &RuntimeConfig,
        camera: &str,
        event_id: &str,
        alert: &AlertMessage,
    ) -> bool {
        if !config.alert_delivery_enabled {
            tracing::info!(event_id = %event_id, "Chat delivery disabled by config, skipping");
            return false;
        }

        let mut message = format!("{}\n{}", alert.snapshot_media, alert.body);
        if let Some(clip) = &alert.clip_media {
            message.push('\n');
            message.push_str(clip);
        }
        let message = format!("{}{}", FORWARD_INSTRUCTION, message);

        let mut any_accepted = false;
        for recipient in &config.alert_recipients {
            let payload = serde_json::json!({
                "message": message,
                "deliver": true,
                "channel": config.alert_channel,
                "to": recipient,
                "name": config.agent_name,
                "sessionKey": format!("frigate:{}:{}", camera, event_id),
                "timeoutSeconds": 60,
            });

            match self
                .client
                .post(&config.agent_webhook)
                .bearer_auth(&config.agent_token)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) if matches!(resp.status().as_u16(), 200 | 201 | 202) => {
                    tracing::info!(
                        to = %recipient,
                        event_id = %event_id,
                        status = %resp.status(),
                        "Chat alert accepted"
                    );
                    any_accepted = true;
                }
                Ok(resp) => {
                    tracing::error!(
                        to = %recipient,
                        event_id = %event_id,
                        status = %resp.status(),
                        "Chat alert rejected"
                    );
                }
                Err(e) => {
                    tracing::error!(to = %recipient, event_id = %event_id, error = %e, "Chat alert failed");
                }
            }
        }
        any_accepted
    }
}

impl Default for DeliveryClient {
    fn default() -> Self {
        Self::new()
    }
}
