//! Binary wire codec for the Volcano bidirectional TTS protocol.
//!
//! Frame grammar (all integers big-endian):
//!
//! ```text
//! byte 0:  (version<<4)|header_size_in_32bit_words   — always 0x11
//! byte 1:  msg_type | msg_flag
//! byte 2:  (serialization<<4)|compression            — always 0x10 (JSON, none)
//! byte 3:  reserved                                  — 0x00
//! [u32 error_code]     present iff msg_type == Error
//! [u32 event]          present iff msg_flag == WithEvent
//! [LP session_id]      present with event, unless event is connection-only
//! [LP connect_id]      present only with a connection-level server event
//! LP payload           always present
//! ```
//!
//! `LP` = a 4-byte big-endian length prefix followed by exactly that many
//! bytes.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Message type, already shifted into the header's high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    FullClient,
    AudioOnlyClient,
    FullServer,
    AudioOnlyServer,
    FrontEndResultServer,
    Error,
    /// Any value not in the set above, carried through unchanged for
    /// forward compatibility.
    Unknown(u8),
}

impl MessageType {
    fn to_byte(self) -> u8 {
        match self {
            MessageType::FullClient => 0x10,
            MessageType::AudioOnlyClient => 0x20,
            MessageType::FullServer => 0x90,
            MessageType::AudioOnlyServer => 0xB0,
            MessageType::FrontEndResultServer => 0xC0,
            MessageType::Error => 0xF0,
            MessageType::Unknown(b) => b & 0xF0,
        }
    }

    fn from_nibble(b: u8) -> Self {
        match b & 0xF0 {
            0x10 => MessageType::FullClient,
            0x20 => MessageType::AudioOnlyClient,
            0x90 => MessageType::FullServer,
            0xB0 => MessageType::AudioOnlyServer,
            0xC0 => MessageType::FrontEndResultServer,
            0xF0 => MessageType::Error,
            other => MessageType::Unknown(other),
        }
    }
}

/// Message flag, occupying the header's low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFlag {
    NoSeq,
    PositiveSeq,
    LastNoSeq,
    NegativeSeq,
    WithEvent,
    Unknown(u8),
}

impl MessageFlag {
    fn to_nibble(self) -> u8 {
        match self {
            MessageFlag::NoSeq => 0,
            MessageFlag::PositiveSeq => 1,
            MessageFlag::LastNoSeq => 2,
            MessageFlag::NegativeSeq => 3,
            MessageFlag::WithEvent => 4,
            MessageFlag::Unknown(n) => n & 0x0F,
        }
    }

    fn from_nibble(n: u8) -> Self {
        match n & 0x0F {
            0 => MessageFlag::NoSeq,
            1 => MessageFlag::PositiveSeq,
            2 => MessageFlag::LastNoSeq,
            3 => MessageFlag::NegativeSeq,
            4 => MessageFlag::WithEvent,
            other => MessageFlag::Unknown(other),
        }
    }
}

/// Protocol event codes carried in the frame header.
pub mod events {
    pub const NONE: i32 = 0;
    pub const START_CONN: i32 = 1;
    pub const FINISH_CONN: i32 = 2;
    pub const CONN_STARTED: i32 = 50;
    pub const CONN_FAILED: i32 = 51;
    pub const CONN_FINISHED: i32 = 52;
    pub const START_SESSION: i32 = 100;
    pub const FINISH_SESSION: i32 = 102;
    pub const SESSION_STARTED: i32 = 150;
    pub const SESSION_FINISHED: i32 = 152;
    pub const SESSION_FAILED: i32 = 153;
    pub const TASK_REQUEST: i32 = 200;
    pub const TTS_SENTENCE_START: i32 = 350;
    pub const TTS_SENTENCE_END: i32 = 351;
    pub const TTS_RESPONSE: i32 = 352;
}

/// True for events that carry neither `session_id` nor a session context —
/// connection-lifecycle events.
fn is_connection_only_event(event: i32) -> bool {
    matches!(
        event,
        events::START_CONN | events::FINISH_CONN | events::CONN_STARTED
            | events::CONN_FAILED
            | events::CONN_FINISHED
    )
}

/// True for the subset of connection-lifecycle events that also carry a
/// `connect_id`.
fn has_connect_id(event: i32) -> bool {
    matches!(
        event,
        events::CONN_STARTED | events::CONN_FAILED | events::CONN_FINISHED
    )
}

/// A single binary wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub msg_flag: MessageFlag,
    /// Present iff `msg_flag == WithEvent`.
    pub event: Option<i32>,
    /// Present iff `msg_type == Error`.
    pub error_code: Option<u32>,
    pub session_id: Option<String>,
    pub connect_id: Option<String>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a connection-scope client frame (`StartConnection`,
    /// `FinishConnection`): no session_id, no connect_id.
    pub fn client_connection_event(event: i32, payload: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::FullClient,
            msg_flag: MessageFlag::WithEvent,
            event: Some(event),
            error_code: None,
            session_id: None,
            connect_id: None,
            payload,
        }
    }

    /// Builds a session-scope client frame (`StartSession`, `TaskRequest`,
    /// `FinishSession`).
    pub fn client_session_event(event: i32, session_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::FullClient,
            msg_flag: MessageFlag::WithEvent,
            event: Some(event),
            error_code: None,
            session_id: Some(session_id.into()),
            connect_id: None,
            payload,
        }
    }
}

/// Serializes a frame to its wire representation.
///
/// # Panics
///
/// Panics if `msg_flag == WithEvent` but `event` is `None` — callers must
/// never construct that combination.
pub fn serialize(frame: &Frame) -> Vec<u8> {
    if frame.msg_flag == MessageFlag::WithEvent {
        assert!(
            frame.event.is_some(),
            "serialize: WithEvent frame missing its event field"
        );
    }

    let mut buf = BytesMut::with_capacity(16 + frame.payload.len());

    // Header.
    buf.put_u8(0x11); // version=1, header_size=1 (4 bytes)
    buf.put_u8(frame.msg_type.to_byte() | frame.msg_flag.to_nibble());
    buf.put_u8(0x10); // serialization=JSON, compression=none
    buf.put_u8(0x00); // reserved

    if let Some(code) = frame.error_code {
        buf.put_u32(code);
    }

    if let Some(event) = frame.event {
        buf.put_u32(event as u32);

        if !is_connection_only_event(event) {
            let session_id = frame.session_id.as_deref().unwrap_or("");
            put_lp_string(&mut buf, session_id.as_bytes());
        }

        if has_connect_id(event) {
            let connect_id = frame.connect_id.as_deref().unwrap_or("");
            put_lp_string(&mut buf, connect_id.as_bytes());
        }
    }

    put_lp_string(&mut buf, &frame.payload);

    buf.to_vec()
}

fn put_lp_string(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Length-safe cursor: never reads past the end of `data`, and every read
/// returns `MalformedFrame` instead of panicking on truncation.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::MalformedFrame("truncated header byte".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let end = self
            .pos
            .checked_add(4)
            .ok_or_else(|| Error::MalformedFrame("length overflow".to_string()))?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::MalformedFrame("truncated u32 field".to_string()))?;
        self.pos = end;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| Error::MalformedFrame("length overflow".to_string()))?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::MalformedFrame("truncated payload".to_string()))?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_lp_string(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.read_exact(len)?.to_vec())
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| Error::MalformedFrame("length overflow".to_string()))?;
        if end > self.data.len() {
            return Err(Error::MalformedFrame("truncated header extension".to_string()));
        }
        self.pos = end;
        Ok(())
    }
}

/// Parses a wire frame. Length-safe: consumes at most `data.len()` bytes and
/// never reads past a declared length prefix.
pub fn parse(data: &[u8]) -> Result<Frame> {
    let mut cur = Cursor::new(data);

    let version_and_size = cur.read_u8()?;
    let type_and_flag = cur.read_u8()?;
    let _ser_and_comp = cur.read_u8()?;
    let _reserved = cur.read_u8()?;

    let msg_type = MessageType::from_nibble(type_and_flag);
    let msg_flag = MessageFlag::from_nibble(type_and_flag);

    let header_words = (version_and_size & 0x0F) as usize;
    if header_words > 1 {
        cur.skip((header_words - 1) * 4)?;
    }

    let error_code = if msg_type == MessageType::Error {
        Some(cur.read_u32()?)
    } else {
        None
    };

    let mut event = None;
    let mut session_id = None;
    let mut connect_id = None;

    if msg_flag == MessageFlag::WithEvent {
        let raw_event = cur.read_u32()? as i32;
        event = Some(raw_event);

        if !is_connection_only_event(raw_event) {
            let bytes = cur.read_lp_string()?;
            session_id = Some(String::from_utf8_lossy(&bytes).into_owned());
        }

        if has_connect_id(raw_event) {
            let bytes = cur.read_lp_string()?;
            connect_id = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    let payload = cur.read_lp_string()?;

    Ok(Frame {
        msg_type,
        msg_flag,
        event,
        error_code,
        session_id,
        connect_id,
        payload,
    })
}
