//! Message — the value type that flows from the router to a connection.
//!
//! DESIGN
//! ======
//! Messages are immutable once built. The router creates them, a
//! connection's outbound queue carries them, and the transport writer
//! encodes them as `{"data": "<payload>"}` JSON text right before the
//! socket write.
//!
//! Inbound frames carry no envelope: a frame is one UTF-8 text payload.
//! `decode_frame` is the only validation, so a malformed frame never
//! reaches the echo transform.

use serde::Serialize;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Payload of the one-time notification sent on connect.
pub const WELCOME_TEXT: &str = "Connected to server!";

/// Prefix prepended by the echo transform.
pub const ECHO_PREFIX: &str = "Echo: ";

/// Largest inbound frame accepted, in bytes.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

// =============================================================================
// TYPES
// =============================================================================

/// What produced a message. Carried for logging; not part of the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Welcome,
    Echo,
    Raw,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Echo => "echo",
            Self::Raw => "raw",
        }
    }
}

/// One outbound message. Fields are private so nothing mutates it after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    payload: String,
}

/// Outbound wire envelope.
#[derive(Serialize)]
struct WireFrame<'a> {
    data: &'a str,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code attached to log lines.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Inbound frame could not be turned into a text payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid utf-8 (at byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },
}

impl ErrorCode for DecodeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUtf8 { .. } => "E_DECODE_UTF8",
            Self::TooLarge { .. } => "E_DECODE_TOO_LARGE",
        }
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Message {
    /// The connect notification.
    #[must_use]
    pub fn welcome() -> Self {
        Self { kind: MessageKind::Welcome, payload: WELCOME_TEXT.to_owned() }
    }

    /// An echo reply for `payload`.
    #[must_use]
    pub fn echo(payload: &str) -> Self {
        Self { kind: MessageKind::Echo, payload: echo(payload) }
    }

    /// A message whose payload is sent as-is.
    pub fn raw(payload: impl Into<String>) -> Self {
        Self { kind: MessageKind::Raw, payload: payload.into() }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Encode as the outbound JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for string payloads.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireFrame { data: &self.payload })
    }
}

// =============================================================================
// TRANSFORM + DECODE
// =============================================================================

/// The echo transform. Pure: same input, same output.
#[must_use]
pub fn echo(payload: &str) -> String {
    let mut out = String::with_capacity(ECHO_PREFIX.len() + payload.len());
    out.push_str(ECHO_PREFIX);
    out.push_str(payload);
    out
}

/// Validate raw inbound bytes as a text payload.
///
/// # Errors
///
/// `TooLarge` above [`MAX_FRAME_BYTES`], `InvalidUtf8` otherwise when the
/// bytes are not UTF-8.
pub fn decode_frame(bytes: &[u8]) -> Result<&str, DecodeError> {
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(DecodeError::TooLarge { len: bytes.len(), max: MAX_FRAME_BYTES });
    }
    std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 { valid_up_to: e.valid_up_to() })
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
