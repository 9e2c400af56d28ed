use crate::http::response::{is_content_length, Response};
use crate::transport::Transport;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response in wire format.
///
/// Headers go out in insertion order, followed by a `Content-Length`
/// computed from the body. A `Content-Length` present in `headers` is
/// skipped so the sent value always matches the body.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in resp.headers.iter().filter(|(k, _)| !is_content_length(k)) {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(format!("Content-Length: {}\r\n", resp.body.len()).as_bytes());

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&resp.body);

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    status: u16,
}

impl ResponseWriter {
    /// Prepares `response` for sending.
    ///
    /// When the connection will close afterwards the response is forced to
    /// carry `Connection: close`. `echo_keep_alive` adds
    /// `Connection: keep-alive` for HTTP/1.0 clients that asked for it.
    pub fn new(mut response: Response, keep_alive: bool, echo_keep_alive: bool) -> Self {
        if !keep_alive {
            response.set_header("Connection", "close");
        } else if echo_keep_alive {
            response.set_header("Connection", "keep-alive");
        }

        Self {
            status: response.status.as_u16(),
            buffer: serialize_response(&response),
        }
    }

    /// A response after which the connection closes.
    pub fn closing(response: Response) -> Self {
        Self::new(response, false, false)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub async fn write_to(&self, transport: &mut Transport) -> anyhow::Result<()> {
        transport.send(&self.buffer).await?;
        Ok(())
    }
}
