//! HTTP protocol implementation.
//!
//! This module implements an HTTP/1.1 server with keep-alive connections.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-connection state machine
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//! - **`router`**: Method and path-pattern routing
//! - **`middleware`**: Handler trait and middleware composition
//! - **`server_request`**: The request view handlers receive (params, query, cookies, forms)
//! - **`query`**, **`form`**, **`cookie`**: Request body and header helpers
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received        (400 / 408 / 413 → Writing, then Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Route, run middleware and handler
//!        └──────┬───────────┘
//!               │ Response ready          (SSE route → Streaming → Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use beacon::http::request::Method;
//! use beacon::http::router::Router;
//! use beacon::http::response::Response;
//!
//! let mut router = Router::new();
//! router.add(Method::GET, "/users/:id", |req| {
//!     Ok(Response::ok(format!("user {}", req.param("id").unwrap_or_default())))
//! })?;
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod connection;
pub mod writer;
pub mod router;
pub mod middleware;
pub mod server_request;
pub mod query;
pub mod form;
pub mod cookie;
