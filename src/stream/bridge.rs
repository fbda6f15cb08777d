// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Blocking-to-async bridge.
//
// The production source blocks on network I/O, so it runs on a dedicated
// worker via `spawn_blocking`, holding one slot permit from the bounded
// session pool for its whole lifetime. Fragments cross to the async side
// through a bounded FIFO channel; the consumer awaits `recv()` rather than
// polling. The worker stops producing as soon as the cancel flag is set or
// the consumer side of the channel is gone.

use crate::payload::InsightRequest;
use crate::registry::CancelFlag;
use crate::source::InsightSource;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;

/// Messages sent from the worker to the session driver.
#[derive(Debug)]
pub(crate) enum WorkerMsg {
    /// One text fragment, in production order.
    Fragment(String),
    /// The source completed normally. Nothing follows.
    Complete,
    /// The source failed. Nothing follows, and no Complete is sent.
    Failed(String),
}

/// Spawn the blocking worker for one session and return the consumer end
/// of its channel. The permit is released when the worker returns.
pub(crate) fn spawn_worker(
    source: Arc<dyn InsightSource>,
    sport: String,
    request: InsightRequest,
    permit: OwnedSemaphorePermit,
    cancel: CancelFlag,
    capacity: usize,
) -> mpsc::Receiver<WorkerMsg> {
    let (tx, rx) = mpsc::channel(capacity);

    tokio::task::spawn_blocking(move || {
        let _slot = permit;

        let fragments = match source.stream(&sport, &request) {
            Ok(fragments) => fragments,
            Err(e) => {
                let _ = tx.blocking_send(WorkerMsg::Failed(e.to_string()));
                return;
            }
        };

        for item in fragments {
            if cancel.is_cancelled() {
                tracing::debug!(%sport, "worker cancelled, stopping production");
                return;
            }
            match item {
                Ok(fragment) => {
                    if tx.blocking_send(WorkerMsg::Fragment(fragment)).is_err() {
                        // Consumer is gone; stop pulling from the source.
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(WorkerMsg::Failed(e.to_string()));
                    return;
                }
            }
        }

        let _ = tx.blocking_send(WorkerMsg::Complete);
    });

    rx
}
