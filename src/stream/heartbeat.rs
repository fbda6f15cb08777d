// Idle-gap liveness tracking.
//
// A heartbeat keeps long-lived SSE connections from being dropped by
// intermediaries during silent production gaps. The timer stays disarmed
// until the first real message, then fires once per idle interval.
// Heartbeats are informational only: they never touch accumulated text or
// the substantive state transitions.

use std::time::Duration;
use tokio::time::Instant;

/// Tracks when the next heartbeat is due.
#[derive(Debug)]
pub(crate) struct HeartbeatTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// A real message was observed: arm (or re-arm) the idle timer.
    pub fn observe(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    /// A heartbeat was just emitted: schedule the next one a full
    /// interval out.
    pub fn rearm(&mut self) {
        self.observe();
    }

    /// The next heartbeat deadline, or None while disarmed (no real
    /// message observed yet).
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
