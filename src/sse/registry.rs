//! Registry of connected SSE clients, grouped by topic.
//!
//! Each entry holds the client's outbound frame queue. The transport itself
//! stays with the connection task, which drains the queue; removing an entry
//! drops the queue's sender and thereby tells that task to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::server::stats::ServerStats;
use crate::sse::event::SseEvent;

/// Frames buffered per client before new events are dropped for it.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

pub type ClientQueue = mpsc::Sender<Bytes>;

struct SseClient {
    topic: String,
    queue: ClientQueue,
}

pub struct SseRegistry {
    clients: DashMap<u64, SseClient>,
    next_id: AtomicU64,
    stats: Arc<ServerStats>,
}

impl SseRegistry {
    pub fn new(stats: Arc<ServerStats>) -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            stats,
        }
    }

    /// Registers a client and returns its id. Ids are never reused.
    pub fn add_client(&self, topic: impl Into<String>, queue: ClientQueue) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let topic = topic.into();
        tracing::debug!(client_id = id, topic = %topic, "SSE client registered");
        self.clients.insert(id, SseClient { topic, queue });
        self.stats.sse_opened();
        id
    }

    /// Removes a client. Returns `false` if it was already gone.
    pub fn remove_client(&self, id: u64) -> bool {
        match self.clients.remove(&id) {
            Some((_, client)) => {
                self.stats.sse_closed();
                tracing::debug!(client_id = id, topic = %client.topic, "SSE client removed");
                true
            }
            None => false,
        }
    }

    /// Sends `event` to every client on `topic` and returns how many got it.
    ///
    /// The event is serialized once; every client receives the same bytes.
    /// Clients whose connection has ended are removed. A client whose queue
    /// is full misses this event.
    pub fn broadcast(&self, topic: &str, event: &SseEvent) -> usize {
        let frame = event.to_bytes();
        let mut delivered = 0;
        let mut gone = Vec::new();

        for entry in self.clients.iter().filter(|e| e.topic == topic) {
            match entry.queue.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client_id = *entry.key(), topic, "SSE client lagging, event dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        for id in gone {
            self.remove_client(id);
        }
        delivered
    }

    /// Sends `event` to a single client.
    pub fn send_to(&self, id: u64, event: &SseEvent) -> bool {
        let result = match self.clients.get(&id) {
            Some(client) => client.queue.try_send(event.to_bytes()),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                self.remove_client(id);
                false
            }
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn topic_client_count(&self, topic: &str) -> usize {
        self.clients.iter().filter(|e| e.topic == topic).count()
    }

    /// Distinct topics with at least one client, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.clients.iter().map(|e| e.topic.clone()).collect();
        topics.sort();
        topics.dedup();
        topics
    }
}

/// Removes its client from the registry when dropped.
pub struct Registration<'a> {
    registry: &'a SseRegistry,
    id: u64,
}

impl<'a> Registration<'a> {
    pub fn new(registry: &'a SseRegistry, topic: impl Into<String>, queue: ClientQueue) -> Self {
        let id = registry.add_client(topic, queue);
        Self { registry, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove_client(self.id);
    }
}
