//! Error types for the Volcano bidirectional TTS client.

use thiserror::Error;

/// Result type alias for TTS client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Volcano bidirectional TTS operations.
///
/// Programmer misuse (calling `request`/`close` after the client has
/// already closed) has no variant here; it is silently ignored at the
/// call site rather than surfaced as an error.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket transport failure: resolve/connect/handshake/read/write/close.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// TLS verification or SNI failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// The binary wire frame was truncated or structurally inconsistent.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A server-side fatal event (`ConnFailed`, `ConnFinished`, `SessionFailed`)
    /// or an `Error`-typed frame.
    #[error("protocol error (event={event}): {message}")]
    Protocol { event: i32, message: String },

    /// Underlying I/O failure (name resolution, socket).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
