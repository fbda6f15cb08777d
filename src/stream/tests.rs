// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Tests for the streaming session pipeline.
//
// Covers:
//  1. Chunks relayed in production order, then Final, then Done
//  2. Accumulated text repaired into the Final payload
//  3. Producer failure after k chunks -> k Chunks, Error, Done, no Final
//  4. Failure at invocation -> Error, Done
//  5. Empty and unrepairable productions degrade to the fallback Final
//  6. Exactly one terminal sequence, Done always last
//  7. No heartbeat before the first chunk
//  8. One heartbeat per idle interval; chunk arrival resets the timer
//  9. Dropping the consumer cancels the worker and frees its slot

use super::bridge::WorkerMsg;
use super::session::drive;
use super::*;
use crate::payload::{InsightPayload, InsightRequest};
use crate::registry::{CancelFlag, SessionRegistry};
use crate::source::{FragmentIter, InsightSource, SourceError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Source that plays back a fixed script of fragments and failures.
struct ScriptedSource {
    script: Vec<Result<String, String>>,
}

impl ScriptedSource {
    fn chunks(parts: &[&str]) -> Self {
        Self {
            script: parts.iter().map(|p| Ok(p.to_string())).collect(),
        }
    }

    fn failing_after(parts: &[&str], message: &str) -> Self {
        let mut script: Vec<Result<String, String>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        script.push(Err(message.to_string()));
        Self { script }
    }
}

impl InsightSource for ScriptedSource {
    fn stream(&self, _sport: &str, _request: &InsightRequest) -> Result<FragmentIter, SourceError> {
        let items: Vec<Result<String, SourceError>> = self
            .script
            .iter()
            .map(|item| match item {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(SourceError::Transport(message.clone())),
            })
            .collect();
        Ok(Box::new(items.into_iter()))
    }
}

/// Source whose invocation itself fails.
struct RefusingSource;

impl InsightSource for RefusingSource {
    fn stream(&self, _sport: &str, _request: &InsightRequest) -> Result<FragmentIter, SourceError> {
        Err(SourceError::Status {
            status: 503,
            body: "model overloaded".to_string(),
        })
    }
}

/// Source that produces fragments forever, counting how many were pulled.
struct EndlessSource {
    produced: Arc<AtomicUsize>,
}

impl InsightSource for EndlessSource {
    fn stream(&self, _sport: &str, _request: &InsightRequest) -> Result<FragmentIter, SourceError> {
        let produced = Arc::clone(&self.produced);
        Ok(Box::new(std::iter::repeat_with(move || {
            produced.fetch_add(1, Ordering::SeqCst);
            Ok("fragment ".to_string())
        })))
    }
}

async fn collect_events(stream: impl Stream<Item = StreamEvent>) -> Vec<StreamEvent> {
    tokio::pin!(stream);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

async fn run_with(source: impl InsightSource + 'static) -> Vec<StreamEvent> {
    let registry = SessionRegistry::new(2);
    let stream = run_session(
        Arc::new(source),
        "nba".to_string(),
        InsightRequest::default(),
        SessionOptions::default(),
        &registry,
    )
    .await;
    collect_events(stream).await
}

fn assert_single_terminal(events: &[StreamEvent]) {
    let done_count = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Done))
        .count();
    assert_eq!(done_count, 1, "exactly one Done per session: {events:?}");
    assert!(
        matches!(events.last(), Some(StreamEvent::Done)),
        "Done must be last: {events:?}"
    );
}

// ---------------------------------------------------------------------------
// 1-2. Normal completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chunks_relayed_in_order_then_final_then_done() {
    let parts = ["{\"players\": {\"A\"", ": {\"insights\"", ": [\"x\"]}}}"];
    let events = run_with(ScriptedSource::chunks(&parts)).await;

    assert_eq!(events.len(), 5);
    for (i, part) in parts.iter().enumerate() {
        assert_eq!(events[i], StreamEvent::Chunk(part.to_string()));
    }
    let StreamEvent::Final(payload) = &events[3] else {
        panic!("expected Final, got {:?}", events[3]);
    };
    assert_eq!(payload.players["A"].insights, vec!["x"]);
    assert_single_terminal(&events);
}

#[tokio::test]
async fn many_chunks_preserve_production_order() {
    let parts: Vec<String> = (0..50).map(|i| format!("part-{i} ")).collect();
    let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    let events = run_with(ScriptedSource::chunks(&refs)).await;

    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, refs);
    assert_single_terminal(&events);
}

#[tokio::test]
async fn truncated_production_is_repaired_in_the_final_payload() {
    // Production stops two closers short.
    let events = run_with(ScriptedSource::chunks(&[
        "{\"players\": {\"A\": ",
        "{\"insights\": [\"x\", \"y\"]}",
    ]))
    .await;

    let payload = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Final(p) => Some(p.clone()),
            _ => None,
        })
        .expect("session must deliver a Final payload");
    assert_eq!(payload.players["A"].insights, vec!["x", "y"]);
    assert_single_terminal(&events);
}

// ---------------------------------------------------------------------------
// 3-4. Producer failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_after_k_chunks_yields_k_chunks_error_done() {
    let events = run_with(ScriptedSource::failing_after(
        &["{\"players\"", ": {"],
        "connection reset",
    ))
    .await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], StreamEvent::Chunk(_)));
    assert!(matches!(events[1], StreamEvent::Chunk(_)));
    let StreamEvent::Error(message) = &events[2] else {
        panic!("expected Error, got {:?}", events[2]);
    };
    assert!(message.contains("connection reset"));
    assert!(
        !events.iter().any(|e| matches!(e, StreamEvent::Final(_))),
        "no Final on the error path"
    );
    assert_single_terminal(&events);
}

#[tokio::test]
async fn failure_at_invocation_yields_error_done() {
    let events = run_with(RefusingSource).await;

    assert_eq!(events.len(), 2);
    let StreamEvent::Error(message) = &events[0] else {
        panic!("expected Error, got {:?}", events[0]);
    };
    assert!(message.contains("503"));
    assert_single_terminal(&events);
}

// ---------------------------------------------------------------------------
// 5. Degradation to fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_production_delivers_the_fallback_final() {
    let events = run_with(ScriptedSource::chunks(&[])).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::Final(InsightPayload::fallback()));
    assert_single_terminal(&events);
}

#[tokio::test]
async fn unrepairable_production_delivers_the_fallback_final() {
    let events = run_with(ScriptedSource::chunks(&["sorry, I cannot help with that"])).await;

    let payload = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Final(p) => Some(p.clone()),
            _ => None,
        })
        .expect("fallback Final expected");
    assert_eq!(payload, InsightPayload::fallback());
    assert_single_terminal(&events);
}

// ---------------------------------------------------------------------------
// 7-8. Heartbeats (driver exercised directly with paused time)
// ---------------------------------------------------------------------------

fn spawn_driver(
    options: SessionOptions,
) -> (mpsc::Sender<WorkerMsg>, mpsc::Receiver<StreamEvent>) {
    let (worker_tx, worker_rx) = mpsc::channel(8);
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(drive(
        worker_rx,
        tx,
        options,
        CancelFlag::default(),
        Uuid::new_v4(),
        None,
    ));
    (worker_tx, rx)
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_before_the_first_chunk() {
    let options = SessionOptions {
        heartbeat_interval: Duration::from_secs(10),
        channel_capacity: 8,
    };
    let (worker_tx, mut rx) = spawn_driver(options);

    // Idle well past the threshold while still in the Idle phase.
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err(), "heartbeat requires a prior chunk");

    worker_tx.send(WorkerMsg::Complete).await.unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Final(_))));
    assert!(matches!(rx.recv().await, Some(StreamEvent::Done)));
}

#[tokio::test(start_paused = true)]
async fn one_heartbeat_per_idle_interval() {
    let options = SessionOptions {
        heartbeat_interval: Duration::from_secs(10),
        channel_capacity: 8,
    };
    let (worker_tx, mut rx) = spawn_driver(options);

    worker_tx
        .send(WorkerMsg::Fragment("{\"players\": {}".to_string()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk(_))));

    // First idle interval elapses: exactly one heartbeat.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(rx.recv().await, Some(StreamEvent::Heartbeat));
    assert!(rx.try_recv().is_err());

    // Second interval, second heartbeat.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(rx.recv().await, Some(StreamEvent::Heartbeat));

    worker_tx.send(WorkerMsg::Complete).await.unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Final(_))));
    assert!(matches!(rx.recv().await, Some(StreamEvent::Done)));
}

#[tokio::test(start_paused = true)]
async fn chunk_arrival_resets_the_idle_timer() {
    let options = SessionOptions {
        heartbeat_interval: Duration::from_secs(10),
        channel_capacity: 8,
    };
    let (worker_tx, mut rx) = spawn_driver(options);

    worker_tx
        .send(WorkerMsg::Fragment("a".to_string()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk(_))));

    // A chunk lands mid-interval; the timer restarts from it.
    tokio::time::advance(Duration::from_secs(6)).await;
    worker_tx
        .send(WorkerMsg::Fragment("b".to_string()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk(_))));

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(rx.try_recv().is_err(), "only 9s idle since the last chunk");

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(rx.recv().await, Some(StreamEvent::Heartbeat));

    worker_tx.send(WorkerMsg::Complete).await.unwrap();
    assert!(matches!(rx.recv().await, Some(StreamEvent::Final(_))));
    assert!(matches!(rx.recv().await, Some(StreamEvent::Done)));
}

// ---------------------------------------------------------------------------
// 9. Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_the_consumer_stops_the_worker_and_frees_its_slot() {
    let produced = Arc::new(AtomicUsize::new(0));
    let registry = SessionRegistry::new(1);

    let mut stream = run_session(
        Arc::new(EndlessSource {
            produced: Arc::clone(&produced),
        }),
        "nba".to_string(),
        InsightRequest::default(),
        SessionOptions {
            heartbeat_interval: Duration::from_secs(10),
            channel_capacity: 4,
        },
        &registry,
    )
    .await;

    assert!(matches!(
        stream.next().await,
        Some(StreamEvent::Chunk(_))
    ));
    drop(stream);

    // The worker must notice the dead channel, stop, and release the only
    // pool slot; acquiring a new session proves it.
    let ticket = tokio::time::timeout(Duration::from_secs(2), registry.begin())
        .await
        .expect("worker slot must be released after cancellation");
    drop(ticket);

    let settled = produced.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        produced.load(Ordering::SeqCst),
        settled,
        "production must stop after cancellation"
    );
}
