//! # Translation Pipeline
//!
//! Canonical requests and responses are already OpenAI-shaped (see
//! [`crate::models`]); this module covers the part that differs per
//! provider dialect: tool-call argument normalization and the per-stream
//! state machine that reassembles streamed tool-call fragments into a
//! single canonical chunk.
//!
//! Request/response reshaping for a specific wire dialect (role
//! remapping, system-message hoisting, content-shape conversion) lives in
//! each adapter under `providers/`, since it's adapter-specific glue, not
//! a cross-cutting concern.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::models::{Delta, DeltaToolCall, StreamChunk, ToolCall};

/// Canonical tool call: arguments are a parsed JSON object, not a string.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Error, PartialEq)]
pub enum TranslationError {
    #[error("tool call {index} arguments never closed before end of stream")]
    ToolCallParseError { index: u32 },
}

/// Parses a unary (non-streaming) tool call's stringly-typed `arguments`
/// into canonical form.
pub fn normalize_tool_call(call: &ToolCall) -> Result<NormalizedToolCall, TranslationError> {
    let arguments: Value = serde_json::from_str(&call.function.arguments).map_err(|_| {
        TranslationError::ToolCallParseError { index: 0 }
    })?;
    Ok(NormalizedToolCall {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments,
    })
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Buffers streamed tool-call argument fragments (keyed by the delta's
/// `index`) until the JSON closes, then hands back the finalized call.
/// Deliberately separate from [`StreamState`] so a stream's text and
/// tool-call tracks can be driven independently.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partials: HashMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one `DeltaToolCall` fragment. Returns `Some` once this
    /// index's arguments form balanced, parseable JSON.
    pub fn accumulate(
        &mut self,
        delta: &DeltaToolCall,
    ) -> Option<Result<NormalizedToolCall, TranslationError>> {
        let partial = self.partials.entry(delta.index).or_default();
        if let Some(id) = &delta.id {
            partial.id = Some(id.clone());
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                partial.name = Some(name.clone());
            }
            if let Some(arguments) = &function.arguments {
                partial.arguments.push_str(arguments);
            }
        }

        if !is_balanced(&partial.arguments) {
            return None;
        }

        match serde_json::from_str::<Value>(&partial.arguments) {
            Ok(arguments) => {
                let id = partial.id.clone().unwrap_or_default();
                let name = partial.name.clone().unwrap_or_default();
                self.partials.remove(&delta.index);
                Some(Ok(NormalizedToolCall { id, name, arguments }))
            }
            Err(_) => None,
        }
    }

    /// Called once the upstream stream ends. Any index still buffered
    /// means the stream was truncated mid-tool-call: each yields exactly
    /// one [`TranslationError::ToolCallParseError`].
    pub fn finish(self) -> Vec<TranslationError> {
        self.partials
            .into_keys()
            .map(|index| TranslationError::ToolCallParseError { index })
            .collect()
    }
}

/// True once `text` contains a complete, brace-balanced JSON value,
/// ignoring braces inside string literals.
fn is_balanced(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut seen_open = false;
    for ch in trimmed.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                depth += 1;
                seen_open = true;
            }
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }
    seen_open && depth == 0
}

/// Per-stream position: initial/streaming-text/streaming-tool-call/done.
/// Role is emitted once on the first chunk; `finish_reason` on the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initial,
    StreamingText,
    StreamingToolCall,
    Done,
}

impl Default for StreamState {
    fn default() -> Self {
        StreamState::Initial
    }
}

/// A chunk ready to hand to the HTTP writer, or `None` when the upstream
/// delta was fully absorbed into accumulator state (a partial tool call).
#[derive(Debug, Clone)]
pub struct TranslatedChunk {
    pub role: Option<crate::models::Role>,
    pub content_delta: Option<String>,
    pub finished_tool_calls: Vec<NormalizedToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<crate::models::Usage>,
}

/// Advances `state`/`accumulator` by one upstream [`StreamChunk`] and
/// returns the canonical chunk to emit, if any.
pub fn translate_chunk(
    chunk: &StreamChunk,
    state: &mut StreamState,
    accumulator: &mut ToolCallAccumulator,
) -> Option<TranslatedChunk> {
    let choice = chunk.choices.first()?;
    let Delta {
        role,
        content,
        tool_calls,
    } = &choice.delta;

    let mut finished = Vec::new();
    if let Some(deltas) = tool_calls {
        *state = StreamState::StreamingToolCall;
        for delta in deltas {
            if let Some(result) = accumulator.accumulate(delta) {
                if let Ok(call) = result {
                    finished.push(call);
                }
            }
        }
    } else if content.is_some() {
        *state = StreamState::StreamingText;
    }

    if choice.finish_reason.is_some() {
        *state = StreamState::Done;
    }

    if role.is_none() && content.is_none() && finished.is_empty() && choice.finish_reason.is_none() {
        return None;
    }

    Some(TranslatedChunk {
        role: role.clone(),
        content_delta: content.clone(),
        finished_tool_calls: finished,
        finish_reason: choice.finish_reason.clone(),
        usage: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeltaFunction, DeltaToolCall};

    #[test]
    fn reassembles_fragmented_arguments() {
        let mut acc = ToolCallAccumulator::new();
        let fragments = [r#"{"loc"#, r#"ation":"#, r#""nyc"}"#];
        let mut result = None;
        for (i, fragment) in fragments.iter().enumerate() {
            let delta = DeltaToolCall {
                index: 0,
                id: if i == 0 { Some("call_1".to_string()) } else { None },
                call_type: None,
                function: Some(DeltaFunction {
                    name: if i == 0 { Some("get_weather".to_string()) } else { None },
                    arguments: Some(fragment.to_string()),
                }),
            };
            result = acc.accumulate(&delta);
        }
        let call = result.unwrap().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments["location"], "nyc");
    }

    #[test]
    fn truncated_stream_yields_one_parse_error() {
        let mut acc = ToolCallAccumulator::new();
        let delta = DeltaToolCall {
            index: 2,
            id: Some("call_2".to_string()),
            call_type: None,
            function: Some(DeltaFunction {
                name: Some("lookup".to_string()),
                arguments: Some(r#"{"incomplete":"#.to_string()),
            }),
        };
        assert!(acc.accumulate(&delta).is_none());
        let errors = acc.finish();
        assert_eq!(errors, vec![TranslationError::ToolCallParseError { index: 2 }]);
    }

    #[test]
    fn braces_inside_string_values_dont_confuse_balance() {
        assert!(is_balanced(r#"{"text":"a{b}c"}"#));
        assert!(!is_balanced(r#"{"text":"a{b}c""#));
    }
}
