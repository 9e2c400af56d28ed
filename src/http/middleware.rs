//! Handlers and the middleware chain.
//!
//! A middleware turns one handler into another. The chain folds the
//! registered list from the right, so for `[m1, m2]` around `h` the result
//! is `m1(m2(h))`: `m1` sees the request first and the response last.

use std::sync::Arc;
use std::time::Instant;

use crate::http::response::Response;
use crate::http::server_request::ServerRequest;

pub type HandlerResult = anyhow::Result<Response>;

pub trait Handler: Send + Sync {
    fn call(&self, req: &ServerRequest) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&ServerRequest) -> HandlerResult + Send + Sync,
{
    fn call(&self, req: &ServerRequest) -> HandlerResult {
        self(req)
    }
}

pub type BoxHandler = Arc<dyn Handler>;

/// Wraps a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> BoxHandler
where
    F: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// Composes `middleware` around `handler`, first entry outermost.
///
/// An empty list returns `handler` unchanged.
pub fn chain(middleware: &[Arc<dyn Middleware>], handler: BoxHandler) -> BoxHandler {
    middleware
        .iter()
        .rev()
        .fold(handler, |inner, m| m.wrap(inner))
}

/// Logs one line per request with its status and latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        handler_fn(move |req| {
            let started = Instant::now();
            let result = next.call(req);
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            match &result {
                Ok(response) => tracing::info!(
                    method = %req.method(),
                    path = req.path(),
                    status = response.status.as_u16(),
                    elapsed_ms,
                    "Request handled"
                ),
                Err(e) => tracing::warn!(
                    method = %req.method(),
                    path = req.path(),
                    error = %e,
                    elapsed_ms,
                    "Request failed"
                ),
            }
            result
        })
    }
}
