//! Server-wide connection counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Live counters shared by the accept loop, every connection task and the
/// SSE registry. Counters never go below zero.
#[derive(Debug, Default)]
pub struct ServerStats {
    active_connections: AtomicUsize,
    active_sse: AtomicUsize,
    total_connections: AtomicU64,
    active_handlers: AtomicUsize,
    peak_handlers: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub active_connections: usize,
    pub active_sse: usize,
    pub total_connections: u64,
    pub active_handlers: usize,
    pub peak_handlers: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted connection whose handler task is about to start.
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::AcqRel);
        let running = self.active_handlers.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_handlers.fetch_max(running, Ordering::AcqRel);
    }

    pub fn connection_closed(&self) {
        decrement(&self.active_connections);
        decrement(&self.active_handlers);
    }

    pub fn sse_opened(&self) {
        self.active_sse.fetch_add(1, Ordering::AcqRel);
    }

    pub fn sse_closed(&self) {
        decrement(&self.active_sse);
    }

    /// Counts a connection until the returned guard drops.
    pub fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connection_opened();
        ConnectionGuard {
            stats: Arc::clone(self),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn active_sse(&self) -> usize {
        self.active_sse.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_connections: self.active_connections.load(Ordering::Acquire),
            active_sse: self.active_sse.load(Ordering::Acquire),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_handlers: self.active_handlers.load(Ordering::Acquire),
            peak_handlers: self.peak_handlers.load(Ordering::Acquire),
        }
    }
}

fn decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections={} sse={} total={} handlers={} peak_handlers={}",
            self.active_connections,
            self.active_sse,
            self.total_connections,
            self.active_handlers,
            self.peak_handlers
        )
    }
}

/// Decrements the connection counters when dropped, however the owning task
/// ends.
pub struct ConnectionGuard {
    stats: Arc<ServerStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_counters_and_keeps_peak() {
        let stats = Arc::new(ServerStats::new());
        {
            let _a = stats.track_connection();
            let _b = stats.track_connection();
            assert_eq!(stats.active_connections(), 2);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.active_connections, 0);
        assert_eq!(snap.active_handlers, 0);
        assert_eq!(snap.peak_handlers, 2);
        assert_eq!(snap.total_connections, 2);
    }

    #[test]
    fn counters_never_underflow() {
        let stats = ServerStats::new();
        stats.sse_closed();
        stats.connection_closed();
        assert_eq!(stats.active_sse(), 0);
        assert_eq!(stats.active_connections(), 0);
    }
}
