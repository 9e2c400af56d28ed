//! The per-connection SSE loop.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::sse::event::{SseEvent, PING_FRAME};
use crate::sse::registry::{Registration, SseRegistry, CLIENT_QUEUE_CAPACITY};
use crate::transport::Transport;

const SSE_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
\r\n";

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A write to the client failed.
    ClientGone,
    /// The registry entry was removed by someone else.
    Removed,
    Shutdown,
}

/// Registers the client, sends the stream head and a `connected` event,
/// then forwards queued events and pings until the stream ends.
///
/// The client is removed from the registry exactly once, whichever way the
/// loop exits.
pub async fn serve(
    transport: &mut Transport,
    registry: &SseRegistry,
    topic: String,
    ping_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> StreamEnd {
    let (queue, mut frames) = mpsc::channel::<Bytes>(CLIENT_QUEUE_CAPACITY);
    let registration = Registration::new(registry, topic.clone(), queue);
    let id = registration.id();
    let peer = transport.peer_addr();

    let connected = SseEvent::new(
        serde_json::json!({ "client_id": id, "topic": topic }).to_string(),
    )
    .event("connected");

    if transport.send(SSE_HEAD).await.is_err()
        || transport.send(&connected.to_bytes()).await.is_err()
    {
        return StreamEnd::ClientGone;
    }
    tracing::info!(client_id = id, %peer, topic = %topic, "SSE stream opened");

    if *shutdown.borrow_and_update() {
        return StreamEnd::Shutdown;
    }

    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = transport.send(&frame).await {
                        tracing::debug!(client_id = id, error = %e, "SSE event write failed");
                        break StreamEnd::ClientGone;
                    }
                }
                None => break StreamEnd::Removed,
            },
            _ = ticker.tick() => {
                if let Err(e) = transport.send(PING_FRAME).await {
                    tracing::debug!(client_id = id, error = %e, "SSE ping failed");
                    break StreamEnd::ClientGone;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break StreamEnd::Shutdown;
                }
            }
        }
    };

    drop(registration);
    tracing::info!(client_id = id, %peer, reason = ?end, "SSE stream closed");
    end
}
