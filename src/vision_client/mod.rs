//! VisionClient - Vision Endpoint Adapter
//!
//! ## Responsibilities
//!
//! - Build the analysis prompt from event + policy context
//! - Send the base64 snapshot to the generate endpoint
//! - Retry once against the fallback endpoint on transport failure
//! - Turn the reply into a sanitized assessment (see `parse`)

mod parse;

pub use parse::{extract_assessment, strip_machine_lines, FALLBACK_REASON};

use crate::config_store::RuntimeConfig;
use crate::error::{Error, Result};
use crate::models::{Assessment, EventContext};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

/// One vision invocation
pub struct VisionRequest<'a> {
    pub camera: &'a str,
    pub context: &'a EventContext,
    pub recent_summary: &'a str,
    /// Workspace-relative media reference for the MEDIA line
    pub media_rel_path: &'a str,
    pub image: &'a [u8],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// VisionClient instance
pub struct VisionClient {
    client: reqwest::Client,
}

impl VisionClient {
    /// Create new VisionClient; the per-call deadline comes from config
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Check endpoint liveness
    pub async fn health_check(&self, endpoint: &str) -> bool {
        let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Analyze one snapshot. Transport failure on the primary endpoint is
    /// retried once against the fallback; a reply with no structured JSON
    /// still yields an assessment via the keyword fallback.
    pub async fn analyze(
        &self,
        config: &RuntimeConfig,
        request: &VisionRequest<'_>,
    ) -> Result<Assessment> {
        let prompt = build_prompt(request);
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(request.image);
        let deadline = Duration::from_secs(config.vision_timeout_seconds);

        match self
            .generate(&config.vision_endpoint, &config.vision_model, &prompt, &image_b64, deadline)
            .await
        {
            Ok(reply) => Ok(extract_assessment(&reply)),
            Err(e) if e.is_transient() => {
                let Some(fallback) = config.vision_endpoint_fallback.as_deref() else {
                    return Err(e);
                };
                tracing::warn!(
                    camera = %request.camera,
                    error = %e,
                    fallback = %fallback,
                    "Primary vision endpoint failed, retrying fallback"
                );
                let reply = self
                    .generate(fallback, &config.vision_model, &prompt, &image_b64, deadline)
                    .await?;
                Ok(extract_assessment(&reply))
            }
            Err(e) => Err(e),
        }
    }

    async fn generate(
        &self,
        endpoint: &str,
        model: &str,
        prompt: &str,
        image_b64: &str,
        deadline: Duration,
    ) -> Result<String> {
        let url = format!("{}/api/generate", endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "images": [image_b64],
            "stream": false,
            "options": {"num_predict": 350, "temperature": 0.1},
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(deadline)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Upstream(format!(
                "vision endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: GenerateResponse = resp.json().await?;
        if parsed.response.trim().is_empty() {
            return Err(Error::Upstream("vision endpoint returned empty reply".into()));
        }
        Ok(parsed.response)
    }
}

impl Default for VisionClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Prompt carrying camera, policy context, and output-format instructions
fn build_prompt(request: &VisionRequest<'_>) -> String {
    let ctx = request.context;
    format!(
        "You are an AI security camera analyst. Analyze this image from camera '{camera}'.\n\
         Location: {notes}\n\
         Zone: {zone}\n\
         Time: {local_time} ({time_of_day}), Home: {home_mode}\n\
         Known faces present: {known_faces}\n\
         Recent events on this camera: {recent_count}\n\n\
         RECENT_EVENTS:\n{recent_summary}\n\n\
         Describe EXACTLY what you see. Be specific about:\n\
         - Number of people, clothing, build, distinguishing features\n\
         - Actions: walking, standing, reaching, looking around, carrying items\n\
         - Items: bags, tools, packages, phone, nothing\n\
         - Is behavior normal or suspicious for this location?\n\n\
         Your reply MUST have exactly three parts:\n\
         PART 1 - this exact media reference line:\n\
         MEDIA:{media}\n\
         PART 2 - a 3-5 sentence security assessment.\n\
         PART 3 - a JSON decision block. Start the line with JSON: and put the entire object on ONE line.\n\
         JSON: {{\
         \"subject\":{{\"identity\":\"unknown\",\"description\":\"brief appearance\"}},\
         \"behavior\":\"what they are doing\",\
         \"risk\":{{\"level\":\"low|medium|high|critical\",\"confidence\":0.0,\"reason\":\"why\"}},\
         \"type\":\"unknown_person|known_person|delivery|vehicle|animal|loitering|other\",\
         \"action\":\"notify_only|notify_and_save_clip|notify_and_light|notify_and_speaker|notify_and_alarm\"}}\n\n\
         Rules: low=routine, medium=unusual activity, high=suspicious/after-hours, critical=threat/break-in.\n\
         Match action to risk: low->notify_only, medium->notify_and_save_clip, high->notify_and_light, critical->notify_and_alarm.\n\
         Be factual and direct, no questions or disclaimers. The JSON: line MUST be the last line.",
        camera = request.camera,
        notes = ctx.camera_notes,
        zone = ctx.camera_zone,
        local_time = ctx.local_time,
        time_of_day = ctx.time_of_day.as_str(),
        home_mode = ctx.home_mode.as_str(),
        known_faces = ctx.known_faces_present,
        recent_count = ctx.recent_events,
        recent_summary = request.recent_summary,
        media = request.media_rel_path,
    )
}
