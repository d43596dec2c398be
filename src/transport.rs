//! Asynchronous TLS + WebSocket transport: a single task owns the socket,
//! the write queue, and every hook invocation, serializing all three onto
//! one strand of control so no lock is needed while it runs.
//!
//! `connect_async`'s `rustls-tls-webpki-roots` TLS config already verifies
//! the peer against the webpki root store and checks the SAN/CN against
//! the requested host, so this module does not hand-roll a TLS context —
//! see DESIGN.md.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::Request as HttpRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::error::Error;

/// Commands posted onto the transport's write queue. Processed strictly in
/// FIFO order, one at a time.
pub(crate) enum Command {
    Send(Vec<u8>),
    Close,
}

/// A cheap, cloneable handle to a running transport. Safe to call from any
/// thread: every method just posts a command onto the owning task's queue.
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl TransportHandle {
    /// Enqueues a raw frame for transmission. No-op if the transport has
    /// already closed.
    pub fn send_frame(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Command::Send(bytes));
    }

    /// Requests a graceful close. No-op if already closing or closed.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }
}

/// Builds a `TransportHandle` backed by a plain channel, with no socket or
/// task behind it, so the state machine can be exercised without a real
/// connection.
#[cfg(test)]
pub(crate) fn test_handle() -> (TransportHandle, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportHandle { tx }, rx)
}

/// The hook points the transport calls into the protocol layer, given by
/// dependency injection rather than inheritance.
///
/// `UserRequest` is the externally-posted command type (e.g. `queue::Request`)
/// that gets woven into the same single-owner task as the network I/O, so
/// `TtsClient::request`/`close` observe strict FIFO ordering with respect to
/// inbound frames without any lock.
pub trait SessionHooks: Send + 'static {
    type UserRequest: Send + 'static;

    /// Inspect/modify the outgoing upgrade request; return `false` to abort
    /// before any network I/O happens.
    fn on_handshake(&mut self, request: &mut HttpRequest<()>) -> bool {
        let _ = request;
        true
    }

    /// The WebSocket handshake completed; `handle` is now usable to send
    /// frames. `log_id` is the server's `X-Tt-Logid` response header, when
    /// present.
    fn on_open(&mut self, log_id: Option<String>, handle: &TransportHandle);

    /// A binary frame arrived.
    fn on_message(&mut self, data: &[u8], handle: &TransportHandle);

    /// An externally-posted request reached the strand.
    fn on_request(&mut self, request: Self::UserRequest, handle: &TransportHandle);

    /// A close was requested — either `TransportHandle::close()` was
    /// called, or the command channel's sender side was dropped. Invoked
    /// synchronously on the strand before the socket's close handshake
    /// begins, so state reaches its terminal transition before the next
    /// loop iteration can pick up any already-buffered inbound frame.
    fn on_close_request(&mut self) {}

    /// The transport has finished closing, cleanly or otherwise. Always the
    /// last hook invoked.
    fn on_close(&mut self);

    /// A fatal transport-level error occurred. Always followed by exactly
    /// one `on_close`.
    fn on_error(&mut self, err: &Error, handle: &TransportHandle);
}

/// Spawns the transport task and returns a handle to it, plus the sender
/// half of the request channel, immediately; the actual connect happens
/// inside the task.
pub fn spawn<H: SessionHooks>(
    ws_url: String,
    headers: Vec<(&'static str, String)>,
    timeout: Duration,
    hooks: H,
) -> (TransportHandle, mpsc::UnboundedSender<H::UserRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let handle = TransportHandle { tx };
    let handle_for_task = handle.clone();
    tokio::spawn(drive(ws_url, headers, timeout, hooks, rx, req_rx, handle_for_task));
    (handle, req_tx)
}

async fn drive<H: SessionHooks>(
    ws_url: String,
    headers: Vec<(&'static str, String)>,
    timeout: Duration,
    mut hooks: H,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut request_rx: mpsc::UnboundedReceiver<H::UserRequest>,
    handle: TransportHandle,
) {
    let mut request = match ws_url.into_client_request() {
        Ok(req) => req,
        Err(e) => {
            let err = Error::Config(format!("invalid websocket url: {e}"));
            hooks.on_error(&err, &handle);
            hooks.on_close();
            return;
        }
    };

    for (name, value) in &headers {
        let header_value = match value.parse() {
            Ok(v) => v,
            Err(_) => {
                let err = Error::Config(format!("invalid header value for {name}"));
                hooks.on_error(&err, &handle);
                hooks.on_close();
                return;
            }
        };
        request.headers_mut().insert(*name, header_value);
    }

    if !hooks.on_handshake(&mut request) {
        debug!("handshake aborted by hooks");
        hooks.on_close();
        return;
    }

    debug!("connecting");
    let connected = tokio::time::timeout(timeout, connect_async(request)).await;
    let (stream, response) = match connected {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            let err = Error::Transport(e);
            warn!("connect failed: {err}");
            hooks.on_error(&err, &handle);
            hooks.on_close();
            return;
        }
        Err(_) => {
            let err = Error::Config("connect/handshake timed out".to_string());
            warn!("{err}");
            hooks.on_error(&err, &handle);
            hooks.on_close();
            return;
        }
    };

    let log_id = response
        .headers()
        .get("X-Tt-Logid")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    if let Some(ref id) = log_id {
        debug!(log_id = %id, "websocket upgraded");
    }

    let (mut write, mut read) = stream.split();
    hooks.on_open(log_id, &handle);

    let mut requests_closed = false;

    loop {
        tokio::select! {
            biased;

            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Send(bytes)) => {
                        if let Err(e) = write.send(WsMessage::Binary(bytes.into())).await {
                            let err = Error::Transport(e);
                            warn!("write failed: {err}");
                            hooks.on_error(&err, &handle);
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        hooks.on_close_request();
                        let _ = write.close().await;
                        break;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Binary(data))) => {
                        hooks.on_message(&data, &handle);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore text/ping/pong/frame messages; this protocol is binary-only.
                    }
                    Some(Err(e)) => {
                        let err = Error::Transport(e);
                        warn!("read failed: {err}");
                        hooks.on_error(&err, &handle);
                        break;
                    }
                }
            }
            req = request_rx.recv(), if !requests_closed => {
                match req {
                    Some(r) => hooks.on_request(r, &handle),
                    None => requests_closed = true,
                }
            }
        }
    }

    hooks.on_close();
}
