//! Server orchestration: route registration, binding, the accept loop and
//! graceful shutdown.
//!
//! ```ignore
//! use beacon::{Response, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(ServerConfig::default());
//!     server.get("/hello/:name", |req| {
//!         Ok(Response::ok(format!("hello {}", req.param("name").unwrap_or("?"))))
//!     })?;
//!     server.sse("/events", "news")?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod listener;
pub mod stats;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::middleware::{HandlerResult, Middleware};
use crate::http::request::Method;
use crate::http::router::Router;
use crate::http::server_request::ServerRequest;
use crate::sse::{SseRegistry, SseRoute};
use crate::transport::tls;

use stats::ServerStats;

/// Everything a connection task needs, shared read-only once the server
/// starts.
pub struct App {
    pub(crate) config: ServerConfig,
    pub(crate) router: Router,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) sse_routes: Vec<SseRoute>,
    pub(crate) registry: Arc<SseRegistry>,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) shutdown: watch::Sender<bool>,
}

impl App {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SseRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Collects routes, middleware and SSE endpoints before the server starts.
pub struct Server {
    config: ServerConfig,
    router: Router,
    middleware: Vec<Arc<dyn Middleware>>,
    sse_routes: Vec<SseRoute>,
    registry: Arc<SseRegistry>,
    stats: Arc<ServerStats>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let stats = Arc::new(ServerStats::new());
        Self {
            config,
            router: Router::new(),
            middleware: Vec::new(),
            sse_routes: Vec::new(),
            registry: Arc::new(SseRegistry::new(Arc::clone(&stats))),
            stats,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn route<H>(&mut self, method: Method, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.router.add(method, pattern, handler)?;
        Ok(self)
    }

    pub fn get<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn patch<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.route(Method::PATCH, pattern, handler)
    }

    pub fn delete<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, ServerError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Appends a middleware. The first one added sees each request first.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Serves `pattern` as an event stream on `topic`. SSE routes are
    /// checked before regular routes.
    pub fn sse(&mut self, pattern: &str, topic: impl Into<String>) -> Result<&mut Self, ServerError> {
        let route = SseRoute::new(pattern, topic)?;
        tracing::debug!(pattern = route.pattern.as_str(), topic = %route.topic, "SSE route registered");
        self.sse_routes.push(route);
        Ok(self)
    }

    /// The registry used to publish events. Valid before and after start.
    pub fn registry(&self) -> Arc<SseRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Validates the configuration, loads TLS material if configured and
    /// binds the listening socket.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        self.config.validate()?;

        let acceptor = match &self.config.tls {
            Some(tls) => Some(tls::load_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };

        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let (shutdown, _) = watch::channel(false);
        let app = Arc::new(App {
            config: self.config,
            router: self.router,
            middleware: self.middleware,
            sse_routes: self.sse_routes,
            registry: self.registry,
            stats: self.stats,
            shutdown,
        });

        Ok(BoundServer {
            listener,
            acceptor,
            local_addr,
            app,
        })
    }

    /// Binds and serves until shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.run().await
    }
}

/// A server whose socket is bound but which is not yet accepting.
pub struct BoundServer {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    local_addr: SocketAddr,
    app: Arc<App>,
}

impl BoundServer {
    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            app: Arc::clone(&self.app),
        }
    }

    /// Accepts connections until [`ShutdownHandle::shutdown`] is called.
    pub async fn run(self) -> Result<(), ServerError> {
        listener::run(self.listener, self.acceptor, self.app).await
    }
}

/// Stops a running server.
///
/// The accept loop exits and every open SSE stream ends; connections in the
/// middle of a request finish it.
#[derive(Clone)]
pub struct ShutdownHandle {
    app: Arc<App>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.app.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        self.app.is_shutting_down()
    }
}
