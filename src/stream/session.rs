// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Session protocol driver.
//
// One async task per session consumes the worker channel and emits the
// event sequence the protocol promises: zero or more Chunks (with
// Heartbeats during idle gaps), then exactly one of `Final, Done` or
// `Error, Done`. Accumulated text is owned here, on the consumer side of
// the bridge, so no state is shared across the concurrency boundary except
// the channel itself.

use super::bridge::{self, WorkerMsg};
use super::heartbeat::HeartbeatTimer;
use super::types::{SessionPhase, StreamEvent};
use crate::payload::InsightRequest;
use crate::registry::{CancelFlag, SessionGuard, SessionRegistry};
use crate::repair;
use crate::source::InsightSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-session tuning, derived from the stream section of the config.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Idle gap after which a heartbeat is emitted.
    pub heartbeat_interval: Duration,
    /// Capacity of the worker and event channels.
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            channel_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Start a session for the given production source and parameters, and
/// return its event sequence.
///
/// Waits for a worker slot from the registry's bounded pool, spawns the
/// blocking worker and the session driver, and hands back the consumer end.
/// Dropping the returned stream cancels the session cooperatively.
pub async fn run_session(
    source: Arc<dyn InsightSource>,
    sport: String,
    request: InsightRequest,
    options: SessionOptions,
    registry: &SessionRegistry,
) -> impl Stream<Item = StreamEvent> {
    let ticket = registry.begin().await;
    let session_id = ticket.id;
    tracing::info!(%session_id, %sport, "session started");

    let worker_rx = bridge::spawn_worker(
        source,
        sport,
        request,
        ticket.permit,
        ticket.cancel.clone(),
        options.channel_capacity,
    );

    let (tx, rx) = mpsc::channel(options.channel_capacity);
    tokio::spawn(drive(
        worker_rx,
        tx,
        options,
        ticket.cancel,
        session_id,
        Some(ticket.guard),
    ));

    ReceiverStream::new(rx)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Record a state-machine transition.
fn advance(phase: &mut SessionPhase, next: SessionPhase, session_id: Uuid) {
    tracing::debug!(%session_id, from = ?*phase, to = ?next, "session transition");
    *phase = next;
}

/// Consume worker messages and emit the session's event sequence.
pub(crate) async fn drive(
    mut worker_rx: mpsc::Receiver<WorkerMsg>,
    tx: mpsc::Sender<StreamEvent>,
    options: SessionOptions,
    cancel: CancelFlag,
    session_id: Uuid,
    _guard: Option<SessionGuard>,
) {
    let mut phase = SessionPhase::Idle;
    let mut accumulated = String::new();
    let mut chunks = 0usize;
    let mut heartbeat = HeartbeatTimer::new(options.heartbeat_interval);

    let terminal = loop {
        let deadline = heartbeat.deadline();
        let heartbeat_due = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            msg = worker_rx.recv() => match msg {
                Some(WorkerMsg::Fragment(text)) => {
                    if phase == SessionPhase::Idle {
                        advance(&mut phase, SessionPhase::Streaming, session_id);
                    }
                    accumulated.push_str(&text);
                    chunks += 1;
                    heartbeat.observe();
                    if tx.send(StreamEvent::Chunk(text)).await.is_err() {
                        cancel.cancel();
                        return;
                    }
                }
                Some(WorkerMsg::Complete) => {
                    advance(&mut phase, SessionPhase::Finalizing, session_id);
                    tracing::info!(
                        %session_id,
                        chunks,
                        bytes = accumulated.len(),
                        "production complete, repairing payload"
                    );
                    let payload = repair::repair_or_fallback(&accumulated);
                    break [StreamEvent::Final(payload), StreamEvent::Done];
                }
                Some(WorkerMsg::Failed(message)) => {
                    tracing::warn!(%session_id, chunks, error = %message, "production source failed");
                    break [StreamEvent::Error(message), StreamEvent::Done];
                }
                None => {
                    // Worker went away without Complete or Failed (cancelled
                    // or panicked). Surface it as a production failure.
                    tracing::warn!(%session_id, "worker stopped without a completion signal");
                    break [
                        StreamEvent::Error("production source terminated unexpectedly".to_string()),
                        StreamEvent::Done,
                    ];
                }
            },
            _ = heartbeat_due => {
                heartbeat.rearm();
                tracing::debug!(%session_id, "idle threshold reached, emitting heartbeat");
                if tx.send(StreamEvent::Heartbeat).await.is_err() {
                    cancel.cancel();
                    return;
                }
            }
        }
    };

    let failed = matches!(terminal[0], StreamEvent::Error(_));
    for event in terminal {
        if tx.send(event).await.is_err() {
            cancel.cancel();
            return;
        }
    }
    advance(
        &mut phase,
        if failed { SessionPhase::Error } else { SessionPhase::Done },
        session_id,
    );
    tracing::info!(%session_id, ?phase, chunks, "session complete");
}
