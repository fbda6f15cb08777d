// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Production source boundary.
//
// An `InsightSource` is the blocking capability that produces the raw
// insight text: invoked once per session, it lazily yields text fragments
// and then either completes normally or fails. Implementations block — the
// stream bridge runs them on a dedicated worker, never on the async
// scheduler. Test doubles implement the same trait.

use crate::config::UpstreamConfig;
use crate::payload::InsightRequest;
use std::io::{BufRead, BufReader, Lines};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures raised by the production source. These are the only errors a
/// consumer ever sees as Error events.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream stream interrupted: {0}")]
    Interrupted(String),

    #[error("missing credentials: {0}")]
    Credentials(String),
}

// ---------------------------------------------------------------------------
// Trait: InsightSource (dependency injection point)
// ---------------------------------------------------------------------------

/// A lazy, finite sequence of text fragments. Each `next()` may block on
/// network I/O. An `Err` item terminates the sequence.
pub type FragmentIter = Box<dyn Iterator<Item = Result<String, SourceError>> + Send>;

/// Blocking production source for insight text.
///
/// Implementations must be Send + Sync so they can be shared across
/// sessions via `Arc`. `stream` is invoked at most once per session.
pub trait InsightSource: Send + Sync {
    fn stream(&self, sport: &str, request: &InsightRequest) -> Result<FragmentIter, SourceError>;
}

// ---------------------------------------------------------------------------
// GeminiSource
// ---------------------------------------------------------------------------

/// Production source backed by the Gemini streaming REST API.
///
/// Posts the session parameters to `:streamGenerateContent?alt=sse` and
/// yields the text of each SSE data frame as one fragment. The model
/// deployment owns the prompt template; we forward the match parameters
/// verbatim. All calls block, so this type must only run on the bridge's
/// worker.
pub struct GeminiSource {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiSource {
    /// Build a source from upstream config, reading the API key from the
    /// configured environment variable.
    pub fn from_env(config: &UpstreamConfig) -> Result<Self, SourceError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| SourceError::Credentials(format!("{} is not set", config.api_key_env)))?;
        Ok(Self {
            http: reqwest::blocking::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

impl InsightSource for GeminiSource {
    fn stream(&self, sport: &str, request: &InsightRequest) -> Result<FragmentIter, SourceError> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [{
                    "text": format!(
                        "sport: {sport}\nparameters: {}",
                        serde_json::to_string(request)
                            .map_err(|e| SourceError::Transport(e.to_string()))?
                    )
                }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::new(SseFragments {
            lines: BufReader::new(response).lines(),
        }))
    }
}

/// Iterator over the text fragments of an upstream SSE response body.
struct SseFragments {
    lines: Lines<BufReader<reqwest::blocking::Response>>,
}

impl Iterator for SseFragments {
    type Item = Result<String, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(SourceError::Interrupted(e.to_string()))),
            };
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            match fragment_text(data) {
                Some(text) if !text.is_empty() => return Some(Ok(text)),
                _ => continue,
            }
        }
    }
}

/// Extract the concatenated part text from one Gemini SSE data frame.
/// Frames without text (e.g. the final usage-only frame) yield None.
fn fragment_text(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_text_extracts_part_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"{\"players\""},{"text":": {}}"}]}}]}"#;
        assert_eq!(fragment_text(data).as_deref(), Some("{\"players\": {}}"));
    }

    #[test]
    fn fragment_text_without_parts_is_none() {
        assert_eq!(fragment_text(r#"{"usageMetadata":{"totalTokenCount":12}}"#), None);
        assert_eq!(fragment_text("not json"), None);
    }

    #[test]
    fn source_error_messages_name_the_failure() {
        let err = SourceError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        let err = SourceError::Credentials("GEMINI_API_KEY is not set".to_string());
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
