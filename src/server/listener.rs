use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::http::connection::Connection;
use crate::server::App;
use crate::transport::Transport;

/// Pause after a failed accept, so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub async fn run(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    app: Arc<App>,
) -> Result<(), ServerError> {
    let scheme = if acceptor.is_some() { "https" } else { "http" };
    info!("Listening on {}://{}", scheme, listener.local_addr()?);

    let reporter = spawn_stats_reporter(Arc::clone(&app));
    let mut shutdown = app.shutdown.subscribe();

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let (socket, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        tracing::debug!("Accepted connection from {}", peer);
        let _ = socket.set_nodelay(true);

        let guard = app.stats.track_connection();
        let app = Arc::clone(&app);
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let Some(transport) = establish(socket, peer, acceptor, &app).await else {
                return;
            };

            let mut conn = Connection::new(transport, app);
            if let Err(e) = conn.run().await {
                tracing::debug!("Connection error from {}: {}", peer, e);
            }
        });
    }

    reporter.abort();
    info!("Listener stopped; {}", app.stats.snapshot());
    Ok(())
}

/// Wraps an accepted socket, running the TLS handshake when configured.
async fn establish(
    socket: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    app: &App,
) -> Option<Transport> {
    let Some(acceptor) = acceptor else {
        return Some(Transport::plain(socket, peer));
    };

    match tokio::time::timeout(app.config.request_timeout, acceptor.accept(socket)).await {
        Ok(Ok(stream)) => Some(Transport::encrypted(stream, peer)),
        Ok(Err(e)) => {
            warn!("TLS handshake with {} failed: {}", peer, e);
            None
        }
        Err(_) => {
            warn!("TLS handshake with {} timed out", peer);
            None
        }
    }
}

/// Logs a stats line every `stats_interval` until aborted.
fn spawn_stats_reporter(app: Arc<App>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(app.config.stats_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = app.stats.snapshot();
            info!(
                active_connections = snapshot.active_connections,
                active_sse = snapshot.active_sse,
                total_connections = snapshot.total_connections,
                peak_handlers = snapshot.peak_handlers,
                "Server stats"
            );
        }
    })
}
