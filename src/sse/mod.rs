//! Server-Sent Events.
//!
//! A request whose path matches an [`SseRoute`] leaves normal request
//! processing for good: the connection is registered in the
//! [`registry::SseRegistry`] under a topic and kept open by
//! [`stream::serve`], which pings the client until it goes away.
//! Application code publishes with [`registry::SseRegistry::broadcast`].

pub mod event;
pub mod registry;
pub mod stream;

pub use event::SseEvent;
pub use registry::SseRegistry;

use crate::http::router::{Pattern, PatternError};
use crate::http::server_request::ServerRequest;

/// A path served as an event stream.
#[derive(Debug, Clone)]
pub struct SseRoute {
    pub pattern: Pattern,
    pub topic: String,
}

impl SseRoute {
    pub fn new(pattern: &str, topic: impl Into<String>) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: Pattern::parse(pattern)?,
            topic: topic.into(),
        })
    }

    /// Topic for a request on this route: a `:topic` path parameter, then a
    /// `topic` query parameter, then the route's own topic.
    pub fn topic_for(&self, req: &ServerRequest) -> String {
        req.param("topic")
            .map(str::to_string)
            .or_else(|| req.query("topic"))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.topic.clone())
    }
}
