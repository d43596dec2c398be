//! The FIFO of pending user intents driving the TTS state machine.

use std::collections::VecDeque;

/// A user intent. `session_id` and `text` emptiness jointly select one of
/// three interpretations: start or continue a session, or end one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Non-empty to address a session; empty as an end-current-session
    /// sentinel.
    pub session_id: String,
    /// Text fragment to synthesize; empty to only (re)start a session.
    pub text: String,
    /// Voice to bind at session start. Ignored once a session is bound to a
    /// voice (first non-empty speaker wins for that session).
    pub speaker: String,
}

impl Request {
    /// A sentinel request that ends whichever session is currently active.
    pub fn end_session() -> Self {
        Self {
            session_id: String::new(),
            text: String::new(),
            speaker: String::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.session_id.is_empty()
    }
}

/// FIFO of pending requests. Enqueue is O(1); dequeue only happens from
/// `TtsSession::process_next`, never directly from I/O completions.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: VecDeque<Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        self.inner.push_back(request);
    }

    pub fn front(&self) -> Option<&Request> {
        self.inner.front()
    }

    pub fn pop_front(&mut self) -> Option<Request> {
        self.inner.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
