//! The TTS state machine: the 8-state connection lifecycle, the
//! `process_next` dispatch algorithm, and the event-table dispatch from
//! inbound frames.

use tracing::{debug, warn};

use crate::codec::{self, events, Frame, MessageType};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::event::Event;
use crate::payload;
use crate::queue::{Request, RequestQueue};
use crate::transport::{SessionHooks, TransportHandle};

/// The 8-state connection lifecycle. Asterisked states in the written
/// description (`Connecting`, `Creating`, `Deleting`, `Disconnecting`) are
/// transient: each is exited upon a specific server event or I/O completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    Init = 0,
    Connecting = 1,
    Connected = 2,
    Creating = 3,
    SessionReady = 4,
    Deleting = 5,
    Disconnecting = 6,
    Closed = 7,
}

/// Drives the protocol state machine. Owned by exactly one task (the
/// transport's `drive` loop, via [`SessionHooks`]); every method takes
/// `&mut self` and is never called re-entrantly.
pub struct TtsSession<F: FnMut(Event) + Send + 'static> {
    state: ConnState,
    connect_id: String,
    log_id: Option<String>,
    queue: RequestQueue,
    current_session_id: String,
    current_speaker: String,
    config: ClientConfig,
    on_event: F,
}

impl<F: FnMut(Event) + Send + 'static> TtsSession<F> {
    pub fn new(config: ClientConfig, on_event: F) -> Self {
        Self {
            state: ConnState::Init,
            connect_id: String::new(),
            log_id: None,
            queue: RequestQueue::new(),
            current_session_id: String::new(),
            current_speaker: String::new(),
            config,
            on_event,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// `run()`: allowed only in state 0. Returns `false` (a silently
    /// ignored `UserMisuse`) if already run.
    pub fn try_begin_run(&mut self) -> bool {
        if self.state != ConnState::Init {
            debug!(state = ?self.state, "run() ignored: not in Init");
            return false;
        }
        self.state = ConnState::Connecting;
        true
    }

    /// `request(Request)`: append to the queue; legal in any state, though
    /// it only produces wire action once the machine reaches 2 or 4. A
    /// no-op once closed.
    pub fn enqueue(&mut self, request: Request, handle: &TransportHandle) {
        if self.state == ConnState::Closed {
            return;
        }
        self.queue.push(request);
        self.process_next(handle);
    }

    /// Enqueues a request with no transport to derive wire action from yet
    /// (pre-`run()`). The request is picked up by `process_next` once the
    /// connection reaches state 2.
    pub fn push_pending(&mut self, request: Request) {
        if self.state == ConnState::Closed {
            return;
        }
        self.queue.push(request);
    }

    /// `close()`: force disconnect; legal in any non-terminal state.
    /// Idempotent — a second call while already closing/closed is a no-op.
    pub fn force_close(&mut self, handle: &TransportHandle) {
        if matches!(self.state, ConnState::Disconnecting | ConnState::Closed) {
            return;
        }
        self.state = ConnState::Disconnecting;
        handle.close();
    }

    fn emit(&mut self, event: Event) {
        (self.on_event)(event);
    }

    fn fatal(&mut self, message: impl Into<String>, handle: &TransportHandle) {
        let message = message.into();
        warn!(%message, "fatal protocol error");
        self.emit(Event::Error { message });
        self.force_close(handle);
    }

    fn send_frame(&self, frame: &Frame, handle: &TransportHandle) {
        handle.send_frame(codec::serialize(frame));
    }

    /// While the queue is non-empty and state is 2 (`Connected`) or 4
    /// (`SessionReady`), derive and send the next wire action from the
    /// queue head, looping until the state stops being one of those two
    /// or the queue empties.
    fn process_next(&mut self, handle: &TransportHandle) {
        loop {
            if !matches!(self.state, ConnState::Connected | ConnState::SessionReady) {
                return;
            }
            let Some(head) = self.queue.front().cloned() else {
                return;
            };

            match self.state {
                ConnState::Connected => {
                    if !head.session_id.is_empty() {
                        let payload = payload::req_params_payload(
                            events::START_SESSION,
                            &head.speaker,
                            "",
                            self.config.sample_rate,
                        );
                        let frame = Frame::client_session_event(
                            events::START_SESSION,
                            head.session_id.clone(),
                            payload,
                        );
                        self.send_frame(&frame, handle);
                        self.current_session_id = head.session_id.clone();
                        self.current_speaker = head.speaker.clone();
                        self.state = ConnState::Creating;
                        if head.text.is_empty() {
                            self.queue.pop_front();
                        }
                        // Otherwise the head is preserved; it is re-examined
                        // once SessionStarted drives state back to 4.
                        return;
                    } else {
                        self.queue.pop_front();
                    }
                }
                ConnState::SessionReady => {
                    if head.session_id != self.current_session_id {
                        if !self.current_session_id.is_empty() {
                            let frame = Frame::client_session_event(
                                events::FINISH_SESSION,
                                self.current_session_id.clone(),
                                payload::empty(),
                            );
                            self.send_frame(&frame, handle);
                            self.state = ConnState::Deleting;
                        }
                        if head.session_id.is_empty() {
                            self.queue.pop_front();
                        }
                        return;
                    } else {
                        if !head.text.is_empty() {
                            let payload = payload::req_params_payload(
                                events::TASK_REQUEST,
                                &self.current_speaker,
                                &head.text,
                                self.config.sample_rate,
                            );
                            let frame = Frame::client_session_event(
                                events::TASK_REQUEST,
                                self.current_session_id.clone(),
                                payload,
                            );
                            self.send_frame(&frame, handle);
                        }
                        self.queue.pop_front();
                    }
                }
                _ => return,
            }
        }
    }

    fn dispatch_server_frame(&mut self, frame: Frame, handle: &TransportHandle) {
        if frame.msg_type == MessageType::Error {
            self.fatal(
                format!("server error (code={:?})", frame.error_code),
                handle,
            );
            return;
        }

        let Some(event) = frame.event else {
            // Non-event, non-error frame: silently ignore (forward-compat).
            return;
        };

        if matches!(
            event,
            events::CONN_FAILED | events::CONN_FINISHED | events::SESSION_FAILED
        ) {
            self.fatal(format!("protocol error (event={event})"), handle);
            return;
        }

        match event {
            events::CONN_STARTED => {
                if self.state != ConnState::Connecting {
                    return;
                }
                self.connect_id = frame.connect_id.clone().unwrap_or_default();
                let payload = parse_json_payload(&frame.payload);
                self.emit(Event::Open {
                    connect_id: self.connect_id.clone(),
                    payload,
                });
                self.state = ConnState::Connected;
                self.process_next(handle);
            }
            events::SESSION_STARTED => {
                if !self.in_open_range() {
                    return;
                }
                let session_id = frame.session_id.clone().unwrap_or_default();
                let payload = parse_json_payload(&frame.payload);
                self.emit(Event::SessionStarted { session_id, payload });
                self.state = ConnState::SessionReady;
                self.process_next(handle);
            }
            events::SESSION_FINISHED => {
                if !self.in_open_range() {
                    return;
                }
                let session_id = frame.session_id.clone().unwrap_or_default();
                let payload = parse_json_payload(&frame.payload);
                self.emit(Event::SessionFinished { session_id, payload });
                self.current_session_id.clear();
                self.current_speaker.clear();
                self.state = ConnState::Connected;
                self.process_next(handle);
            }
            events::TTS_SENTENCE_START => {
                if !self.in_open_range() {
                    return;
                }
                let session_id = frame.session_id.clone().unwrap_or_default();
                let payload = parse_json_payload(&frame.payload);
                let text = payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.emit(Event::Sentence { session_id, text });
            }
            events::TTS_RESPONSE => {
                if !self.in_open_range() {
                    return;
                }
                let session_id = frame.session_id.clone().unwrap_or_default();
                self.emit(Event::Audio {
                    session_id,
                    data: bytes::Bytes::from(frame.payload),
                });
            }
            _ => {
                // Unknown event: forward-compatible no-op.
            }
        }
    }

    /// States 2..6 exclusive, i.e. `{Connected, Creating, SessionReady, Deleting}` —
    /// the "≥ 2, < 6" legality range shared by `SessionStarted`,
    /// `SessionFinished`, `TTSSentenceStart`, and `TTSResponse`.
    fn in_open_range(&self) -> bool {
        matches!(
            self.state,
            ConnState::Connected | ConnState::Creating | ConnState::SessionReady | ConnState::Deleting
        )
    }
}

fn parse_json_payload(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null)
}

impl<F: FnMut(Event) + Send + 'static> SessionHooks for TtsSession<F> {
    type UserRequest = Request;

    fn on_open(&mut self, log_id: Option<String>, handle: &TransportHandle) {
        self.log_id = log_id;
        debug!(log_id = ?self.log_id, "websocket open; sending StartConnection");
        let frame = Frame::client_connection_event(events::START_CONN, payload::empty());
        self.send_frame(&frame, handle);
    }

    fn on_message(&mut self, data: &[u8], handle: &TransportHandle) {
        if matches!(self.state, ConnState::Disconnecting | ConnState::Closed) {
            return;
        }
        match codec::parse(data) {
            Ok(frame) => {
                debug!(event = ?frame.event, msg_type = ?frame.msg_type, "received frame");
                self.dispatch_server_frame(frame, handle);
            }
            Err(Error::MalformedFrame(msg)) => {
                self.fatal(format!("malformed frame: {msg}"), handle);
            }
            Err(other) => {
                self.fatal(other.to_string(), handle);
            }
        }
    }

    fn on_request(&mut self, request: Request, handle: &TransportHandle) {
        self.enqueue(request, handle);
    }

    fn on_close_request(&mut self) {
        if matches!(self.state, ConnState::Disconnecting | ConnState::Closed) {
            return;
        }
        debug!(state = ?self.state, "close requested; suppressing further events");
        self.state = ConnState::Disconnecting;
    }

    fn on_close(&mut self) {
        let was_closing = self.state == ConnState::Disconnecting;
        self.state = ConnState::Closed;
        let connect_id = std::mem::take(&mut self.connect_id);
        debug!(%connect_id, was_closing, "transport closed");
        self.emit(Event::Close { connect_id });
    }

    fn on_error(&mut self, err: &Error, handle: &TransportHandle) {
        if self.state == ConnState::Disconnecting {
            // Cancellation from our own close() is not a user-visible error.
            return;
        }
        self.fatal(err.to_string(), handle);
    }
}
