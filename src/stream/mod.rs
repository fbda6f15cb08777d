// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Streaming session pipeline.
//
// Responsibilities:
// - Bridge the blocking production source onto a bounded worker pool
// - Relay fragments to the consumer in strict FIFO order
// - Emit heartbeats during idle gaps after streaming begins
// - Repair the accumulated text into a schema-valid Final payload
// - Enforce the session protocol: exactly one terminal event sequence

mod bridge;
mod heartbeat;
mod session;
mod types;

pub use session::{run_session, SessionOptions};
pub use types::{SessionPhase, StreamEvent};

#[cfg(test)]
mod tests;
