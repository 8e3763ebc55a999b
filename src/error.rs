//! Error types for the SmartLight agent.
//!
//! One enum per path. All variants are `Copy` so they can travel through
//! the session state machine and logging paths without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Publish path
// ---------------------------------------------------------------------------

/// Why a payload never reached the publish queue. Producers log and drop;
/// nothing on this path blocks or retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The arena had no contiguous run large enough for the payload.
    OutOfMemory,
    /// The queue already held its maximum number of descriptors.
    QueueFull,
    /// The consumer has shut the queue down.
    QueueClosed,
    /// The payload could not be serialised.
    Encode,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "arena out of memory"),
            Self::QueueFull => write!(f, "publish queue full"),
            Self::QueueClosed => write!(f, "publish queue closed"),
            Self::Encode => write!(f, "payload encoding failed"),
        }
    }
}

/// Returned by a dequeue once the queue has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish queue closed")
    }
}

impl From<QueueClosed> for PublishError {
    fn from(_: QueueClosed) -> Self {
        Self::QueueClosed
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Broker connection failures. The `i32` payloads carry the platform error
/// code when one exists (ESP-IDF `esp_err_t`), `0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Connect(i32),
    Session(i32),
    Publish(i32),
    Subscribe(i32),
    /// An operation that needs an open transport was called without one.
    NotConnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(code) => write!(f, "connect failed ({code})"),
            Self::Session(code) => write!(f, "session request failed ({code})"),
            Self::Publish(code) => write!(f, "publish failed ({code})"),
            Self::Subscribe(code) => write!(f, "subscribe failed ({code})"),
            Self::NotConnected => write!(f, "transport not connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The payload matched a known method but failed structural decoding.
    MalformedMessage,
    /// No handler is registered for the method name.
    UnknownCommand,
    /// The command addressed a channel the output bank does not have.
    InvalidChannel(u8),
    /// A reply could not be queued.
    Reply(PublishError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage => write!(f, "malformed message"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::InvalidChannel(ch) => write!(f, "invalid channel {ch}"),
            Self::Reply(e) => write!(f, "reply dropped: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport callbacks
// ---------------------------------------------------------------------------

/// Returned to the transport when a callback refuses a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    /// The packet type is not valid for this callback.
    UnexpectedPacket(u8),
    /// The inbound payload exceeds the command buffer.
    PayloadTooLarge(usize),
    /// The inbound command channel is full.
    InboundFull,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedPacket(kind) => write!(f, "unexpected packet type {kind}"),
            Self::PayloadTooLarge(len) => write!(f, "payload too large ({len} bytes)"),
            Self::InboundFull => write!(f, "inbound command channel full"),
        }
    }
}
