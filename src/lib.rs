//! Beacon - embeddable HTTP/1.1 server
//!
//! Routing, middleware, keep-alive connections and Server-Sent Events over
//! plain TCP or TLS.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod sse;
pub mod transport;

pub use config::{ServerConfig, TlsConfig};
pub use error::ServerError;
pub use http::middleware::{BoxHandler, Handler, HandlerResult, Middleware, RequestLogger};
pub use http::request::{Method, Request};
pub use http::response::{Response, StatusCode};
pub use http::server_request::ServerRequest;
pub use server::{BoundServer, Server, ShutdownHandle};
pub use sse::{SseEvent, SseRegistry};
