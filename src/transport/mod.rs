//! Connection transports.
//!
//! A [`Transport`] is either a plain TCP stream or a TLS stream over TCP.
//! Everything above this module talks to it through the same four
//! operations (receive, send, close, set_timeout) and never looks at which
//! variant it holds, except for deployment policy via [`Transport::kind`].

pub mod tls;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Encrypted,
}

enum Stream {
    Plain(TcpStream),
    Encrypted(Box<TlsStream<TcpStream>>),
}

pub struct Transport {
    stream: Stream,
    peer: SocketAddr,
    timeout: Option<Duration>,
    closed: bool,
}

impl Transport {
    pub fn plain(stream: TcpStream, peer: SocketAddr) -> Self {
        Self::with_stream(Stream::Plain(stream), peer)
    }

    pub fn encrypted(stream: TlsStream<TcpStream>, peer: SocketAddr) -> Self {
        Self::with_stream(Stream::Encrypted(Box::new(stream)), peer)
    }

    fn with_stream(stream: Stream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            timeout: None,
            closed: false,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self.stream {
            Stream::Plain(_) => TransportKind::Plain,
            Stream::Encrypted(_) => TransportKind::Encrypted,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Deadline applied to each later `receive` and `send`.
    ///
    /// An expired deadline surfaces as `io::ErrorKind::TimedOut`. `None`
    /// waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Reads at most `max_bytes`. An empty result means the peer closed.
    pub async fn receive(&mut self, max_bytes: usize) -> io::Result<Bytes> {
        if self.closed {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::with_capacity(max_bytes);
        let deadline = self.timeout;
        let stream = &mut self.stream;
        with_deadline(deadline, async {
            match stream {
                Stream::Plain(s) => s.read_buf(&mut buf).await,
                Stream::Encrypted(s) => s.read_buf(&mut buf).await,
            }
        })
        .await?;

        Ok(buf.freeze())
    }

    /// Writes all of `bytes` and flushes.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }

        let deadline = self.timeout;
        let stream = &mut self.stream;
        with_deadline(deadline, async {
            match stream {
                Stream::Plain(s) => {
                    s.write_all(bytes).await?;
                    s.flush().await
                }
                Stream::Encrypted(s) => {
                    s.write_all(bytes).await?;
                    s.flush().await
                }
            }
        })
        .await
    }

    /// Shuts the stream down. Safe to call more than once, and on a stream
    /// the peer already closed.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let deadline = self.timeout.or(Some(Duration::from_secs(5)));
        let stream = &mut self.stream;
        let result = with_deadline(deadline, async {
            match stream {
                Stream::Plain(s) => s.shutdown().await,
                Stream::Encrypted(s) => s.shutdown().await,
            }
        })
        .await;

        if let Err(e) = result {
            tracing::trace!(peer = %self.peer, error = %e, "Shutdown after close");
        }
    }
}

async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "transport deadline elapsed"))?,
        None => fut.await,
    }
}
