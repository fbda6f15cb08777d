// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Session registry and bounded worker pool.
//
// All per-deployment session state lives here, passed by reference through
// the call chain — there is no ambient global state, so concurrent sessions
// cannot cross-talk. The semaphore bounds the number of worker slots to the
// deployment's maximum concurrent-session count; the map tracks live
// sessions for observability and cancellation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal shared between a session's consumer side
/// and its blocking worker. The worker checks it between fragments.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// State tracked for one live session.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub started_at: DateTime<Utc>,
    cancel: CancelFlag,
}

/// Registry of live sessions plus the bounded worker pool.
pub struct SessionRegistry {
    slots: Arc<Semaphore>,
    active: Arc<DashMap<Uuid, ActiveSession>>,
}

/// Everything a new session needs from the registry: its id, the worker
/// slot permit, the shared cancel flag, and the guard that removes the
/// registry entry when the session's driver finishes.
pub struct SessionTicket {
    pub id: Uuid,
    pub permit: OwnedSemaphorePermit,
    pub cancel: CancelFlag,
    pub guard: SessionGuard,
}

/// Removes the session's registry entry on drop.
pub struct SessionGuard {
    id: Uuid,
    active: Arc<DashMap<Uuid, ActiveSession>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

impl SessionRegistry {
    /// Create a registry with `max_sessions` worker slots.
    pub fn new(max_sessions: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(max_sessions)),
            active: Arc::new(DashMap::new()),
        })
    }

    /// Begin a session: waits for a worker slot, then registers the
    /// session and returns its ticket.
    pub async fn begin(&self) -> SessionTicket {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("session semaphore is never closed");
        let id = Uuid::new_v4();
        let cancel = CancelFlag::default();
        self.active.insert(
            id,
            ActiveSession {
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        SessionTicket {
            id,
            permit,
            cancel,
            guard: SessionGuard {
                id,
                active: Arc::clone(&self.active),
            },
        }
    }

    /// Signal a live session to stop. Returns false if the session is not
    /// (or no longer) registered.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.active.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Worker slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
