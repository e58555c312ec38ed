//! OpenAI <-> upstream translation.
//!
//! Request direction: OpenAI chat-completion JSON -> upstream chat payload
//! (content flattened into text parts, tools passed through).
//! Response direction: accumulated upstream events -> one OpenAI
//! `chat.completion` body. The streaming shape lives in `streaming`.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::types::{
    AssistantMessage, ChatCompletionRequest, ChatCompletionResponse, Choice, Role, ToolCall,
    ToolCallFunction, Usage,
};
use crate::upstream::{UpstreamChatPayload, UpstreamEvent, UpstreamMessage, UpstreamPart};

const UPSTREAM_TRIGGER: &str = "submit-message";

/// Build the upstream payload for one request. Roles pass through; message
/// content is flattened to text and wrapped into the upstream parts shape;
/// tools and tool_choice are forwarded uninterpreted.
pub fn build_upstream_payload(request: &ChatCompletionRequest) -> UpstreamChatPayload {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            let text = message
                .content
                .as_ref()
                .map(|content| content.to_plaintext())
                .unwrap_or_default();
            UpstreamMessage {
                role: message.role,
                parts: vec![UpstreamPart::text(text)],
            }
        })
        .collect();

    UpstreamChatPayload {
        context: Vec::new(),
        model: request.model.clone(),
        id: request_id(),
        messages,
        trigger: UPSTREAM_TRIGGER.to_string(),
        tools: request.tools.clone(),
        tool_choice: request.tool_choice.clone(),
    }
}

/// Random 16-char alphanumeric id, the format the web client generates per
/// submission.
fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// OpenAI-style completion id (29 hex chars after the prefix).
pub fn completion_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..29])
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Map the upstream terminal signal to an OpenAI finish reason.
pub fn map_finish_reason(upstream: Option<&str>, has_tool_calls: bool) -> String {
    match upstream {
        Some("tool-calls") | Some("tool_calls") => "tool_calls".to_string(),
        Some("length") => "length".to_string(),
        Some("stop") => "stop".to_string(),
        Some(other) => other.to_string(),
        None if has_tool_calls => "tool_calls".to_string(),
        None => "stop".to_string(),
    }
}

/// Accumulates upstream events into one complete assistant turn.
///
/// Tool-call fragments are keyed by the upstream call id and kept in arrival
/// order; `tool-input-available` overwrites the fragment-assembled arguments
/// with the upstream's own final serialization when present.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    content: String,
    tool_order: Vec<String>,
    tool_names: std::collections::HashMap<String, String>,
    tool_args: std::collections::HashMap<String, String>,
    finish_reason: Option<String>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &UpstreamEvent) {
        match event {
            UpstreamEvent::TextDelta { delta } => self.content.push_str(delta),
            UpstreamEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => {
                self.register(tool_call_id, Some(tool_name));
            }
            UpstreamEvent::ToolInputDelta {
                tool_call_id,
                input_text_delta,
            } => {
                self.register(tool_call_id, None);
                self.tool_args
                    .entry(tool_call_id.clone())
                    .or_default()
                    .push_str(input_text_delta);
            }
            UpstreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.register(tool_call_id, Some(tool_name));
                self.tool_args
                    .insert(tool_call_id.clone(), input.to_string());
            }
            UpstreamEvent::Finish { finish_reason } => {
                self.finish_reason = finish_reason.clone();
            }
            UpstreamEvent::Other => {}
        }
    }

    fn register(&mut self, tool_call_id: &str, tool_name: Option<&str>) {
        if !self.tool_names.contains_key(tool_call_id) {
            self.tool_order.push(tool_call_id.to_string());
            self.tool_names.insert(
                tool_call_id.to_string(),
                tool_name.unwrap_or_default().to_string(),
            );
        } else if let Some(name) = tool_name {
            self.tool_names.insert(tool_call_id.to_string(), name.to_string());
        }
    }

    pub fn into_response(self, model: String) -> ChatCompletionResponse {
        let tool_calls: Vec<ToolCall> = self
            .tool_order
            .iter()
            .map(|id| ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: self.tool_names.get(id).cloned().unwrap_or_default(),
                    arguments: self.tool_args.get(id).cloned().unwrap_or_default(),
                },
            })
            .collect();

        let has_tool_calls = !tool_calls.is_empty();
        let finish_reason = map_finish_reason(self.finish_reason.as_deref(), has_tool_calls);

        let message = AssistantMessage {
            role: Role::Assistant,
            content: if has_tool_calls && self.content.is_empty() {
                None
            } else {
                Some(self.content)
            },
            tool_calls: if has_tool_calls {
                Some(tool_calls)
            } else {
                None
            },
        };

        ChatCompletionResponse {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage: Usage::default(),
        }
    }
}
