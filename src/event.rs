//! The uniform, user-visible event stream.

use bytes::Bytes;

/// A single user-visible occurrence.
///
/// Guarantees: events are delivered in order, on the session's owning task,
/// and never re-entrantly with respect to a single inbound-frame dispatch.
#[derive(Debug, Clone)]
pub enum Event {
    /// Connection ready; `connect_id` is latched from the server's
    /// `ConnStarted` event and never changes afterward.
    Open {
        connect_id: String,
        payload: serde_json::Value,
    },
    /// Surfaced for observability; not required by callers that only care
    /// about audio/sentence output.
    SessionStarted {
        session_id: String,
        payload: serde_json::Value,
    },
    /// Surfaced for observability.
    SessionFinished {
        session_id: String,
        payload: serde_json::Value,
    },
    /// Sentence-boundary metadata.
    Sentence { session_id: String, text: String },
    /// PCM16LE @ 16 kHz mono audio bytes.
    Audio { session_id: String, data: Bytes },
    /// Connection terminated, cleanly or otherwise. Always the last event
    /// delivered for a connection, aside from a possible preceding `Error`.
    Close { connect_id: String },
    /// Any fatal or malformed-frame condition. Always followed by exactly
    /// one `Close`.
    Error { message: String },
}
