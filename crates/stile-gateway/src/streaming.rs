//! Streaming conversion (SSE).
//!
//! The upstream backend streams `data: {json}` events (see
//! [`UpstreamEvent`]). Clients expect OpenAI `chat.completion.chunk` frames
//! ending in `data: [DONE]`. Both directions are modeled as lazy streams:
//! the producer pulls one upstream frame at a time and pushes one translated
//! frame out, so first-token latency is whatever the upstream gives us and
//! cancellation is just dropping the stream.
//!
//! A stream that ends without the upstream's terminal signal was cut off;
//! it surfaces as an error item, never as a fabricated `[DONE]`.

use std::collections::HashMap;

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use crate::error::GatewayError;
use crate::translation::{completion_id, map_finish_reason, unix_now};
use crate::types::{
    ChatCompletionChunk, ChunkChoice, Delta, Role, ToolCallDelta, ToolCallFunctionDelta,
};
use crate::upstream::UpstreamEvent;

/// Decode the upstream SSE body into a stream of [`UpstreamEvent`]s.
///
/// Ends after the upstream terminal signal (`finish` event or `[DONE]`
/// line). EOF or a transport error before that yields
/// [`GatewayError::StreamInterrupted`] as the final item.
pub fn upstream_events(
    response: reqwest::Response,
) -> impl Stream<Item = Result<UpstreamEvent, GatewayError>> + Send {
    try_stream! {
        let mut buffer = String::new();
        let mut finished = false;
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|_| GatewayError::StreamInterrupted)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some((frame, rest)) = split_sse_frame(&buffer) {
                buffer = rest;

                let Some(data) = extract_data_line(&frame) else {
                    continue;
                };
                if data.trim() == "[DONE]" {
                    finished = true;
                    break 'read;
                }
                // Data lines that do not parse as events are padding; skip.
                let Ok(event) = serde_json::from_str::<UpstreamEvent>(data) else {
                    continue;
                };

                let is_finish = matches!(event, UpstreamEvent::Finish { .. });
                yield event;
                if is_finish {
                    finished = true;
                    break 'read;
                }
            }
        }

        if !finished {
            Err(GatewayError::StreamInterrupted)?;
        }
    }
}

/// Translate upstream events into fully formatted OpenAI SSE frames.
///
/// Emission order equals upstream order. Tool-call fragments keep OpenAI's
/// accumulating shape: the first fragment per call carries index/id/name,
/// later ones append to `function.arguments`. The stream closes with a
/// finish chunk and `data: [DONE]`; an error item from the input propagates
/// and suppresses both.
pub fn openai_chunks(
    events: impl Stream<Item = Result<UpstreamEvent, GatewayError>> + Send + 'static,
    model: String,
) -> impl Stream<Item = Result<String, GatewayError>> + Send {
    try_stream! {
        let id = completion_id();
        let created = unix_now();
        let mut events = Box::pin(events);

        let mut role_sent = false;
        let mut tool_indices: HashMap<String, u32> = HashMap::new();
        let mut finish_reason: Option<String> = None;

        while let Some(event) = events.next().await {
            match event? {
                UpstreamEvent::TextDelta { delta } => {
                    if !role_sent {
                        role_sent = true;
                        yield frame(&id, created, &model, Delta {
                            role: Some(Role::Assistant),
                            content: Some(String::new()),
                            tool_calls: None,
                        }, None)?;
                    }
                    yield frame(&id, created, &model, Delta {
                        role: None,
                        content: Some(delta),
                        tool_calls: None,
                    }, None)?;
                }

                UpstreamEvent::ToolInputStart { tool_call_id, tool_name } => {
                    let index = tool_indices.len() as u32;
                    tool_indices.insert(tool_call_id.clone(), index);
                    let role = if role_sent { None } else { Some(Role::Assistant) };
                    role_sent = true;
                    yield frame(&id, created, &model, Delta {
                        role,
                        content: None,
                        tool_calls: Some(vec![ToolCallDelta {
                            index,
                            id: Some(tool_call_id),
                            kind: Some("function".to_string()),
                            function: ToolCallFunctionDelta {
                                name: Some(tool_name),
                                arguments: Some(String::new()),
                            },
                        }]),
                    }, None)?;
                }

                UpstreamEvent::ToolInputDelta { tool_call_id, input_text_delta } => {
                    let (index, first_fragment) = match tool_indices.get(&tool_call_id) {
                        Some(index) => (*index, false),
                        None => {
                            let index = tool_indices.len() as u32;
                            tool_indices.insert(tool_call_id.clone(), index);
                            (index, true)
                        }
                    };
                    yield frame(&id, created, &model, Delta {
                        role: None,
                        content: None,
                        tool_calls: Some(vec![ToolCallDelta {
                            index,
                            id: first_fragment.then_some(tool_call_id),
                            kind: first_fragment.then(|| "function".to_string()),
                            function: ToolCallFunctionDelta {
                                name: None,
                                arguments: Some(input_text_delta),
                            },
                        }]),
                    }, None)?;
                }

                UpstreamEvent::ToolInputAvailable { tool_call_id, tool_name, input } => {
                    // Fragments already streamed for this call; the assembled
                    // form is redundant.
                    if tool_indices.contains_key(&tool_call_id) {
                        continue;
                    }
                    let index = tool_indices.len() as u32;
                    tool_indices.insert(tool_call_id.clone(), index);
                    let role = if role_sent { None } else { Some(Role::Assistant) };
                    role_sent = true;
                    yield frame(&id, created, &model, Delta {
                        role,
                        content: None,
                        tool_calls: Some(vec![ToolCallDelta {
                            index,
                            id: Some(tool_call_id),
                            kind: Some("function".to_string()),
                            function: ToolCallFunctionDelta {
                                name: Some(tool_name),
                                arguments: Some(input.to_string()),
                            },
                        }]),
                    }, None)?;
                }

                UpstreamEvent::Finish { finish_reason: reason } => {
                    finish_reason = reason;
                }

                UpstreamEvent::Other => {}
            }
        }

        let reason = map_finish_reason(finish_reason.as_deref(), !tool_indices.is_empty());
        yield frame(&id, created, &model, Delta::default(), Some(reason))?;
        yield "data: [DONE]\n\n".to_string();
    }
}

fn frame(
    id: &str,
    created: u64,
    model: &str,
    delta: Delta,
    finish_reason: Option<String>,
) -> Result<String, GatewayError> {
    let chunk = ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };
    Ok(format!("data: {}\n\n", serde_json::to_string(&chunk)?))
}

/// Split the buffer at the first complete SSE frame (frames are separated by
/// a blank line).
fn split_sse_frame(buffer: &str) -> Option<(String, String)> {
    let idx = buffer.find("\n\n")?;
    let (frame, rest) = buffer.split_at(idx + 2);
    Some((frame.to_string(), rest.to_string()))
}

fn extract_data_line(frame: &str) -> Option<&str> {
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            return Some(rest.trim_start());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(lines: &[&str]) -> String {
        lines
            .iter()
            .map(|l| format!("data: {}\n\n", l))
            .collect::<String>()
    }

    async fn events_from(body: String) -> Vec<Result<UpstreamEvent, GatewayError>> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let response = reqwest::get(format!("{}/chat", server.uri())).await.unwrap();
        upstream_events(response).collect().await
    }

    fn parse_chunk(frame: &str) -> ChatCompletionChunk {
        let data = frame.strip_prefix("data: ").unwrap().trim();
        serde_json::from_str(data).unwrap()
    }

    #[tokio::test]
    async fn decodes_upstream_events_until_finish() {
        let body = sse_body(&[
            r#"{"type":"start"}"#,
            r#"{"type":"text-delta","delta":"a"}"#,
            r#"{"type":"text-delta","delta":"b"}"#,
            r#"{"type":"finish","finishReason":"stop"}"#,
        ]);

        let events = events_from(body).await;
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.is_ok()));
        assert!(matches!(
            events.last().unwrap().as_ref().unwrap(),
            UpstreamEvent::Finish { .. }
        ));
    }

    #[tokio::test]
    async fn eof_without_finish_is_an_interrupted_stream() {
        let body = sse_body(&[
            r#"{"type":"text-delta","delta":"partial"}"#,
        ]);

        let events = events_from(body).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(
            events[1],
            Err(GatewayError::StreamInterrupted)
        ));
    }

    #[tokio::test]
    async fn five_deltas_forward_in_order_then_terminate() {
        let deltas = ["The", " quick", " brown", " fox", " jumps"];
        let mut events: Vec<Result<UpstreamEvent, GatewayError>> = deltas
            .iter()
            .map(|d| {
                Ok(UpstreamEvent::TextDelta {
                    delta: d.to_string(),
                })
            })
            .collect();
        events.push(Ok(UpstreamEvent::Finish {
            finish_reason: Some("stop".to_string()),
        }));

        let frames: Vec<_> = openai_chunks(stream::iter(events), "gpt-4o".to_string())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        // role announcement + 5 deltas + finish + [DONE]
        assert_eq!(frames.len(), 8);

        let opener = parse_chunk(&frames[0]);
        assert_eq!(opener.choices[0].delta.role, Some(Role::Assistant));

        for (i, expected) in deltas.iter().enumerate() {
            let chunk = parse_chunk(&frames[i + 1]);
            assert_eq!(chunk.choices[0].delta.content.as_deref(), Some(*expected));
            assert!(chunk.choices[0].finish_reason.is_none());
        }

        let finish = parse_chunk(&frames[6]);
        assert_eq!(finish.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(frames[7], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn tool_call_fragments_keep_openai_accumulating_shape() {
        let events: Vec<Result<UpstreamEvent, GatewayError>> = vec![
            Ok(UpstreamEvent::ToolInputStart {
                tool_call_id: "call_1".to_string(),
                tool_name: "lookup".to_string(),
            }),
            Ok(UpstreamEvent::ToolInputDelta {
                tool_call_id: "call_1".to_string(),
                input_text_delta: "{\"q\":".to_string(),
            }),
            Ok(UpstreamEvent::ToolInputDelta {
                tool_call_id: "call_1".to_string(),
                input_text_delta: "\"rust\"}".to_string(),
            }),
            Ok(UpstreamEvent::Finish {
                finish_reason: Some("tool-calls".to_string()),
            }),
        ];

        let frames: Vec<_> = openai_chunks(stream::iter(events), "gpt-4o".to_string())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        let opener = parse_chunk(&frames[0]);
        let calls = opener.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.name.as_deref(), Some("lookup"));

        let fragment = parse_chunk(&frames[1]);
        let calls = fragment.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, 0);
        assert!(calls[0].id.is_none());
        assert_eq!(calls[0].function.arguments.as_deref(), Some("{\"q\":"));

        let finish = parse_chunk(&frames[3]);
        assert_eq!(
            finish.choices[0].finish_reason.as_deref(),
            Some("tool_calls")
        );
        assert_eq!(frames[4], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn input_error_suppresses_done() {
        let events: Vec<Result<UpstreamEvent, GatewayError>> = vec![
            Ok(UpstreamEvent::TextDelta {
                delta: "partial".to_string(),
            }),
            Err(GatewayError::StreamInterrupted),
        ];

        let items: Vec<_> = openai_chunks(stream::iter(events), "gpt-4o".to_string())
            .collect::<Vec<_>>()
            .await;

        assert!(matches!(
            items.last().unwrap(),
            Err(GatewayError::StreamInterrupted)
        ));
        for item in items.iter().filter_map(|i| i.as_ref().ok()) {
            assert!(!item.contains("[DONE]"));
        }
    }
}
