//! Public client facade: wires configuration, the request queue, the
//! transport, and the state machine together and owns the background task.
//!
//! Construction is synchronous and cheap; the expensive work (handshake,
//! read loop) happens on a spawned task reached only through message
//! passing.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::config::{ClientConfig, BIDIRECTIONAL_TTS_PATH};
use crate::event::Event;
use crate::queue::Request;
use crate::session::TtsSession;
use crate::transport::{self, TransportHandle};

type EventCallback = Box<dyn FnMut(Event) + Send + 'static>;

enum ClientState {
    /// Constructed but `run()` has not yet been called: the session lives
    /// here directly, guarded by the client's mutex.
    PreRun(TtsSession<EventCallback>),
    /// `run()` succeeded; all further state mutation happens on the
    /// transport's task, reached only through these two channels.
    Running {
        handle: TransportHandle,
        request_tx: mpsc::UnboundedSender<Request>,
    },
    /// Transient placeholder used only while swapping the enum in `run()`.
    Taken,
}

/// A Volcano bidirectional TTS connection.
///
/// Cheap to construct; `run()` performs no work itself beyond posting to the
/// background task, so it is not async. `request()` and `close()` are safe
/// to call from any thread, including from inside the `on_event` callback.
pub struct TtsClient {
    state: Mutex<ClientState>,
    config: ClientConfig,
}

impl TtsClient {
    /// Creates a client in state `Init`. Call [`TtsClient::run`] to begin
    /// connecting.
    pub fn new(config: ClientConfig, on_event: impl FnMut(Event) + Send + 'static) -> Self {
        let callback: EventCallback = Box::new(on_event);
        let session = TtsSession::new(config.clone(), callback);
        Self {
            state: Mutex::new(ClientState::PreRun(session)),
            config,
        }
    }

    /// Initiates the connection. A no-op (silently ignored `UserMisuse`) if
    /// already run.
    pub fn run(&self) {
        let mut guard = self.state.lock().unwrap();
        let prev = std::mem::replace(&mut *guard, ClientState::Taken);
        *guard = match prev {
            ClientState::PreRun(mut session) => {
                if !session.try_begin_run() {
                    ClientState::PreRun(session)
                } else {
                    let ws_url = format!("{}{}", self.config.ws_url, BIDIRECTIONAL_TTS_PATH);
                    let headers = vec![
                        ("X-Api-App-Key", self.config.app_id.clone()),
                        ("X-Api-Access-Key", self.config.access_key.clone()),
                        ("X-Api-Resource-Id", self.config.resource_id.clone()),
                    ];
                    let (handle, request_tx) =
                        transport::spawn(ws_url, headers, self.config.handshake_timeout, session);
                    ClientState::Running { handle, request_tx }
                }
            }
            other => other,
        };
    }

    /// Appends a request to the queue. A no-op once closed.
    pub fn request(&self, request: Request) {
        let mut guard = self.state.lock().unwrap();
        match &mut *guard {
            ClientState::PreRun(session) => session.push_pending(request),
            ClientState::Running { request_tx, .. } => {
                let _ = request_tx.send(request);
            }
            ClientState::Taken => {}
        }
    }

    /// Forces a disconnect. Legal in any non-terminal state; a second call
    /// is a no-op.
    pub fn close(&self) {
        let guard = self.state.lock().unwrap();
        if let ClientState::Running { handle, .. } = &*guard {
            handle.close();
        }
        // Never-run clients have nothing to close: no `open` was ever
        // emitted, so there is nothing to tear down.
    }
}
