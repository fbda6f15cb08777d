// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Stream types: session events, wire frames, and the session state machine.

use crate::payload::InsightPayload;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One event in a session's output sequence.
///
/// Events are delivered in strict arrival order. Every session ends with
/// exactly one terminal sequence: `Final, Done` on normal completion or
/// `Error, Done` on a production-source failure. Nothing follows `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One raw text fragment, exactly as produced upstream.
    Chunk(String),
    /// The repaired (or fallback) payload. Always schema-valid.
    Final(InsightPayload),
    /// Liveness ping emitted during idle gaps. Carries no content.
    Heartbeat,
    /// Production-source failure description. No Final follows.
    Error(String),
    /// End-of-session sentinel.
    Done,
}

impl StreamEvent {
    /// The wire frame for this event: a single-line JSON object for data
    /// events, or the literal `[DONE]` marker for the terminal sentinel.
    /// JSON string escaping guarantees frames never contain raw newlines.
    pub fn frame(&self) -> String {
        match self {
            StreamEvent::Chunk(text) => serde_json::json!({ "chunk": text }).to_string(),
            StreamEvent::Final(payload) => serde_json::json!({ "final": payload }).to_string(),
            StreamEvent::Heartbeat => serde_json::json!({ "heartbeat": true }).to_string(),
            StreamEvent::Error(message) => serde_json::json!({ "error": message }).to_string(),
            StreamEvent::Done => "[DONE]".to_string(),
        }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// Phases of one session, in protocol order. `Done` and `Error` are
/// terminal; no events are emitted after either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Session started, no chunk observed yet.
    Idle,
    /// At least one chunk relayed.
    Streaming,
    /// Production complete; repair pipeline running over accumulated text.
    Finalizing,
    /// Terminal: Final and Done emitted.
    Done,
    /// Terminal: Error and Done emitted.
    Error,
}
