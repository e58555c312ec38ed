//! Upstream (Cursor web chat) protocol: payload shape, stream event
//! vocabulary, and the HTTP client that issues the chat call.
//!
//! The backend is the same endpoint the public web page talks to, so the
//! request has to look like the page: browser client-hint headers, the page's
//! origin/referer, and the proof-of-humanity token in `x-is-human`.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use stile_humanizer::VerificationToken;

use crate::error::GatewayError;
use crate::types::{Role, ToolChoice, ToolDefinition};

const ORIGIN: &str = "https://cursor.com";
const REFERER: &str = "https://cursor.com/en-US/learn/how-ai-models-work";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const SEC_CH_UA: &str = "\"Chromium\";v=\"140\", \"Not=A?Brand\";v=\"24\", \"Google Chrome\";v=\"140\"";

const CLOUDFLARE_BLOCK_MARKER: &str = "Attention Required! | Cloudflare";

/// Chat request body in the upstream schema.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatPayload {
    pub context: Vec<serde_json::Value>,
    pub model: String,
    pub id: String,
    pub messages: Vec<UpstreamMessage>,
    pub trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// Upstream message: same role vocabulary, content wrapped into parts.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamMessage {
    pub role: Role,
    pub parts: Vec<UpstreamPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl UpstreamPart {
    pub fn text(text: String) -> Self {
        Self {
            kind: "text".to_string(),
            text,
        }
    }
}

/// One upstream SSE event.
///
/// The backend streams AI-SDK-style events tagged by `type`. Text arrives as
/// `text-delta`; tool invocations stream as `tool-input-start` +
/// `tool-input-delta` fragments (with `tool-input-available` carrying the
/// assembled arguments); `finish` is the terminal signal — a stream that
/// ends without one was cut off. Everything else is bookkeeping we skip.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "text-delta")]
    TextDelta { delta: String },

    #[serde(rename = "tool-input-start")]
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },

    #[serde(rename = "tool-input-delta")]
    ToolInputDelta {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "inputTextDelta")]
        input_text_delta: String,
    },

    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "finish")]
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: Option<String>,
    },

    #[serde(other)]
    Other,
}

/// HTTP client for the upstream chat endpoint.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    chat_url: String,
    user_agent: String,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        chat_url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            chat_url: chat_url.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Issue the chat call with the verification token attached. Returns the
    /// raw response for the caller to stream; non-success statuses are read
    /// to completion and surfaced as [`GatewayError::Upstream`].
    pub async fn send_chat(
        &self,
        payload: &UpstreamChatPayload,
        token: &VerificationToken,
    ) -> Result<reqwest::Response, GatewayError> {
        debug!(model = %payload.model, request_id = %payload.id, "sending upstream chat call");

        let response = self
            .http
            .post(&self.chat_url)
            .header("user-agent", &self.user_agent)
            .header("x-is-human", &token.value)
            .header("x-path", "/api/chat")
            .header("x-method", "POST")
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-ch-ua-arch", "\"x86\"")
            .header("sec-ch-ua-bitness", "\"64\"")
            .header("sec-fetch-site", "same-origin")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-dest", "empty")
            .header("origin", ORIGIN)
            .header("referer", REFERER)
            .header("accept-language", ACCEPT_LANGUAGE)
            .header("priority", "u=1, i")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The full Cloudflare interstitial is noise; keep the status.
            let body = if body.contains(CLOUDFLARE_BLOCK_MARKER) {
                "Cloudflare 403".to_string()
            } else {
                body
            };
            error!(status = status.as_u16(), body = %body, "upstream chat call rejected");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_deserialize_by_tag() {
        let text: UpstreamEvent =
            serde_json::from_str(r#"{"type": "text-delta", "delta": "Hi"}"#).unwrap();
        assert!(matches!(text, UpstreamEvent::TextDelta { ref delta } if delta == "Hi"));

        let start: UpstreamEvent = serde_json::from_str(
            r#"{"type": "tool-input-start", "toolCallId": "t1", "toolName": "lookup"}"#,
        )
        .unwrap();
        assert!(matches!(start, UpstreamEvent::ToolInputStart { .. }));

        let finish: UpstreamEvent =
            serde_json::from_str(r#"{"type": "finish", "finishReason": "stop"}"#).unwrap();
        assert!(
            matches!(finish, UpstreamEvent::Finish { finish_reason: Some(ref r) } if r == "stop")
        );
    }

    #[test]
    fn unknown_event_types_map_to_other() {
        let event: UpstreamEvent =
            serde_json::from_str(r#"{"type": "start-step", "warnings": []}"#).unwrap();
        assert!(matches!(event, UpstreamEvent::Other));
    }
}
