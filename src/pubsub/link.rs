//! Callback sink between a transport's event task and the session loop.
//!
//! A transport reports broker events by calling the `on_*` methods from
//! whatever context its client library runs in. The link turns them into
//! state the session loop can observe:
//!
//! ```text
//!   transport task                          session loop
//!  ───────────────                         ──────────────
//!   on_connect ───────▶ established flag ──▶ SessionConnecting polls
//!   on_disconnect ────▶ severed signal ────▶ Connected → Disconnecting
//!   on_publish_received ▶ inbound channel ─▶ Connected dispatches
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::Vec;
use log::{debug, error, info, warn};

use super::queue::QoS;
use super::transport::PacketType;
use crate::config::{INBOUND_DEPTH, INBOUND_PAYLOAD_MAX, RPC_REQUEST_PREFIX};
use crate::error::CallbackError;

/// A command payload received on the RPC request topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    /// Trailing id of `v1/devices/me/rpc/request/{id}`, when present.
    pub request_id: Option<u32>,
    pub payload: Vec<u8, INBOUND_PAYLOAD_MAX>,
}

pub struct SessionLink {
    established: AtomicBool,
    severed: Signal<CriticalSectionRawMutex, ()>,
    inbound: Channel<CriticalSectionRawMutex, InboundCommand, INBOUND_DEPTH>,
}

impl Default for SessionLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLink {
    pub const fn new() -> Self {
        Self {
            established: AtomicBool::new(false),
            severed: Signal::new(),
            inbound: Channel::new(),
        }
    }

    // ── Observed by the session loop ─────────────────────────────

    /// True once the broker accepted the session (CONNACK).
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Forget the previous session before a new CONNECT.
    pub fn begin_session(&self) {
        self.established.store(false, Ordering::Release);
        self.severed.reset();
    }

    /// Take the session as live: drop any loss reported before this point
    /// and report whether the broker still holds the session. A loss after
    /// this call latches for the `Connected` loop.
    pub fn confirm_session(&self) -> bool {
        self.severed.reset();
        self.is_established()
    }

    pub async fn severed(&self) {
        self.severed.wait().await;
    }

    pub async fn next_command(&self) -> InboundCommand {
        self.inbound.receive().await
    }

    pub fn try_next_command(&self) -> Option<InboundCommand> {
        self.inbound.try_receive().ok()
    }

    // ── Called by the transport ──────────────────────────────────

    pub fn on_connect(&self) {
        info!("link: session accepted by broker");
        self.established.store(true, Ordering::Release);
    }

    /// Only the loss of an accepted session severs the link. A refused or
    /// timed-out CONNECT reports here too and must not latch.
    pub fn on_disconnect(&self) {
        if self.established.swap(false, Ordering::AcqRel) {
            warn!("link: session lost");
            self.severed.signal(());
        } else {
            debug!("link: disconnect before the session was accepted");
        }
    }

    /// A packet the client could not parse.
    pub fn on_malformed(&self, packet_type: u8) {
        error!("link: malformed packet (type {packet_type})");
    }

    /// Completion of an outbound publish. Anything but PUBACK, PUBREC or
    /// PUBCOMP is refused.
    pub fn on_publish_ack(&self, packet_id: u16, kind: PacketType) -> Result<(), CallbackError> {
        if !kind.is_publish_ack() {
            error!("link: unexpected {kind:?} for publish {packet_id}");
            return Err(CallbackError::UnexpectedPacket(kind as u8));
        }
        debug!("link: {kind:?} for packet {packet_id}");
        Ok(())
    }

    pub fn on_subscribe_ack(&self, packet_id: u16, granted: &[QoS]) -> Result<(), CallbackError> {
        info!("link: SUBACK for packet {packet_id}, granted {granted:?}");
        Ok(())
    }

    pub fn on_unsubscribe_ack(&self, packet_id: u16) -> Result<(), CallbackError> {
        info!("link: UNSUBACK for packet {packet_id}");
        Ok(())
    }

    /// An inbound PUBLISH. The payload is copied into the command channel;
    /// a full channel or an oversized payload drops it.
    pub fn on_publish_received(
        &self,
        packet_id: u16,
        kind: PacketType,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), CallbackError> {
        if kind != PacketType::Publish {
            error!("link: unexpected {kind:?} on receive path (packet {packet_id})");
            return Err(CallbackError::UnexpectedPacket(kind as u8));
        }

        let payload = Vec::from_slice(payload).map_err(|()| {
            warn!("link: {} B command on {topic} exceeds buffer, dropped", payload.len());
            CallbackError::PayloadTooLarge(payload.len())
        })?;

        let command = InboundCommand {
            request_id: request_id(topic),
            payload,
        };
        self.inbound.try_send(command).map_err(|_| {
            warn!("link: command channel full, dropped message on {topic}");
            CallbackError::InboundFull
        })
    }
}

/// Parse the trailing request id from an RPC request topic.
pub fn request_id(topic: &str) -> Option<u32> {
    topic.strip_prefix(RPC_REQUEST_PREFIX)?.parse().ok()
}
