use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::BytesMut;

use crate::http::middleware::{chain, BoxHandler};
use crate::http::parser::{declared_content_length, find_headers_end, parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::server_request::ServerRequest;
use crate::http::writer::ResponseWriter;
use crate::server::App;
use crate::sse;
use crate::transport::{Transport, TransportKind};

/// Bytes requested from the transport per receive.
pub const READ_CHUNK_SIZE: usize = 8192;

/// Largest request head (request line and headers) accepted.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Outcome of reading one request.
#[derive(Debug)]
pub enum ReadResult {
    Success(Request),
    /// The peer closed, or an idle keep-alive connection timed out.
    ConnectionClosed,
    ParseError(ParseError),
    PayloadTooLarge,
    /// The request stalled past `request_timeout`, or needed more than
    /// `max_read_attempts` receives.
    Timeout,
}

pub enum ConnectionState {
    Reading,
    Dispatching(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Streaming(String),             // SSE topic; never returns to Reading
    Closed,
}

enum Dispatch {
    Respond(Response),
    Stream(String),
}

pub struct Connection {
    transport: Transport,
    buffer: BytesMut,
    state: ConnectionState,
    app: Arc<App>,
}

impl Connection {
    pub fn new(transport: Transport, app: Arc<App>) -> Self {
        Self {
            transport,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            state: ConnectionState::Reading,
            app,
        }
    }

    /// Serves requests until the connection closes. The transport is closed
    /// on return, including when an error is returned.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);
            self.state = match state {
                ConnectionState::Reading => {
                    let result = self.read_request().await;
                    self.after_read(result)
                }

                ConnectionState::Dispatching(req) => {
                    let keep_alive = req.keep_alive();
                    let echo_keep_alive = keep_alive && req.is_http10();
                    match self.dispatch(req) {
                        Dispatch::Respond(response) => ConnectionState::Writing(
                            ResponseWriter::new(response, keep_alive, echo_keep_alive),
                            keep_alive,
                        ),
                        Dispatch::Stream(topic) => ConnectionState::Streaming(topic),
                    }
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to(&mut self.transport).await?;

                    if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Streaming(topic) => {
                    let config = &self.app.config;
                    self.transport.set_timeout(Some(config.request_timeout));
                    sse::stream::serve(
                        &mut self.transport,
                        &self.app.registry,
                        topic,
                        config.sse_ping_interval,
                        self.app.shutdown.subscribe(),
                    )
                    .await;
                    ConnectionState::Closed
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    fn after_read(&self, result: ReadResult) -> ConnectionState {
        let peer = self.transport.peer_addr();
        match result {
            ReadResult::Success(req) => ConnectionState::Dispatching(req),
            ReadResult::ConnectionClosed => ConnectionState::Closed,
            ReadResult::ParseError(e) => {
                tracing::debug!(%peer, error = %e, "Malformed request");
                ConnectionState::Writing(ResponseWriter::closing(Response::bad_request()), false)
            }
            ReadResult::PayloadTooLarge => {
                tracing::debug!(%peer, limit = self.app.config.max_body_size, "Request body too large");
                ConnectionState::Writing(ResponseWriter::closing(Response::payload_too_large()), false)
            }
            ReadResult::Timeout => {
                tracing::debug!(%peer, "Request timed out");
                ConnectionState::Writing(ResponseWriter::closing(Response::request_timeout()), false)
            }
        }
    }

    /// Reads one request, buffering bytes until it parses.
    pub async fn read_request(&mut self) -> ReadResult {
        let max_body = self.app.config.max_body_size;
        let max_attempts = self.app.config.max_read_attempts;
        let request_timeout = self.app.config.request_timeout;
        let keep_alive_timeout = self.app.config.keep_alive_timeout;

        let mut attempts = 0;
        loop {
            // Leftover bytes may already hold the next request
            if !self.buffer.is_empty() {
                match parse_http_request(&self.buffer) {
                    Ok((request, _)) if request.body.len() > max_body => {
                        return ReadResult::PayloadTooLarge;
                    }
                    Ok((request, consumed)) => {
                        let _ = self.buffer.split_to(consumed);
                        return ReadResult::Success(request);
                    }
                    Err(ParseError::Incomplete) => {
                        if exceeds_limits(&self.buffer, max_body) {
                            return ReadResult::PayloadTooLarge;
                        }
                    }
                    Err(e) => return ReadResult::ParseError(e),
                }
            }

            if attempts >= max_attempts {
                return ReadResult::Timeout;
            }
            attempts += 1;

            let idle = self.buffer.is_empty();
            self.transport
                .set_timeout(Some(if idle { keep_alive_timeout } else { request_timeout }));

            let chunk = match self.transport.receive(READ_CHUNK_SIZE).await {
                Ok(chunk) => chunk,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return if idle {
                        ReadResult::ConnectionClosed
                    } else {
                        ReadResult::Timeout
                    };
                }
                Err(e) => {
                    tracing::debug!(peer = %self.transport.peer_addr(), error = %e, "Read failed");
                    return ReadResult::ConnectionClosed;
                }
            };

            if chunk.is_empty() {
                return ReadResult::ConnectionClosed;
            }

            self.buffer.extend_from_slice(&chunk);
        }
    }

    fn dispatch(&self, req: Request) -> Dispatch {
        let app = &self.app;

        if let Some((route, params)) = app
            .sse_routes
            .iter()
            .find_map(|r| r.pattern.matches(&req.path).map(|p| (r, p)))
        {
            if self.transport.kind() == TransportKind::Encrypted && !app.config.sse_over_tls {
                return Dispatch::Respond(Response::text(
                    StatusCode::NotImplemented,
                    "event streams are not served over TLS",
                ));
            }
            let req = ServerRequest::new(req, params);
            return Dispatch::Stream(route.topic_for(&req));
        }

        let response = match app.router.find_route(&req) {
            Some((route, params)) => {
                let handler = Arc::clone(&route.handler);
                self.invoke(handler, ServerRequest::new(req, params))
            }
            None => {
                let allowed = app.router.find_methods_for_path(&req.path);
                if allowed.is_empty() {
                    Response::not_found()
                } else {
                    Response::method_not_allowed(&allowed)
                }
            }
        };

        Dispatch::Respond(response)
    }

    fn invoke(&self, handler: BoxHandler, req: ServerRequest) -> Response {
        let handler = chain(&self.app.middleware, handler);
        let peer = self.transport.peer_addr();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(&req)));
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(%peer, method = %req.method(), path = req.path(), error = %e, "Handler failed");
                Response::internal_error()
            }
            Err(payload) => {
                tracing::error!(
                    %peer,
                    method = %req.method(),
                    path = req.path(),
                    panic = panic_message(payload.as_ref()),
                    "Handler panicked"
                );
                Response::internal_error()
            }
        };

        tracing::debug!(%peer, method = %req.method(), path = req.path(), status = response.status.as_u16(), "Dispatched");
        response
    }

    pub async fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.transport.close().await;
    }
}

/// Body limit check for a request that is still incomplete.
///
/// Once the head is complete the declared `Content-Length` decides; a body
/// of exactly `max_body` bytes is allowed, and bytes past the declared body
/// belong to the next request. An unterminated head may not grow past
/// `MAX_HEAD_SIZE`.
fn exceeds_limits(buf: &[u8], max_body: usize) -> bool {
    match find_headers_end(buf) {
        Some(_) => declared_content_length(buf).is_some_and(|n| n > max_body),
        None => buf.len() > MAX_HEAD_SIZE,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_of_exactly_the_limit_is_allowed() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n";
        assert!(!exceeds_limits(buf, 10));
        assert!(exceeds_limits(buf, 9));
    }

    #[test]
    fn pipelined_bytes_are_not_counted_as_body() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcdGET / HTTP/1.1\r\n\r\n";
        assert!(!exceeds_limits(buf, 4));
    }

    #[test]
    fn unterminated_head_is_capped() {
        let mut buf = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        buf.resize(MAX_HEAD_SIZE + 1, b'a');
        assert!(exceeds_limits(&buf, usize::MAX));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
