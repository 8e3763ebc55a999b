//! Bounded publish queue.
//!
//! Producers (sensor worker, heartbeat, command replies) push descriptors
//! with [`PublishQueue::try_enqueue`], which never blocks. The session loop
//! is the single consumer and awaits [`PublishQueue::dequeue`].
//!
//! ```text
//! ┌──────────┐ try_enqueue  ┌───────────────────┐  dequeue  ┌──────────────┐
//! │ sensors  │─────────────▶│                   │──────────▶│ session loop │
//! │ heartbeat│─────────────▶│ Channel<_, _, 20> │           │ (transmit +  │
//! │ rpc reply│─────────────▶│                   │           │   release)   │
//! └──────────┘              └───────────────────┘           └──────────────┘
//! ```
//!
//! A rejected enqueue hands the descriptor back inside [`EnqueueError`] so
//! the caller can release its arena block.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use futures_lite::future;

use super::arena::ArenaBlock;
use crate::config::{
    ATTRIBUTES_TOPIC, PUBLISH_QUEUE_DEPTH, RPC_RESPONSE_PREFIX, TELEMETRY_TOPIC,
};
use crate::error::{PublishError, QueueClosed};

/// MQTT quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Destination of a queued payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Attributes,
    Telemetry,
    /// Reply to the RPC request with this id.
    RpcResponse(u32),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributes => f.write_str(ATTRIBUTES_TOPIC),
            Self::Telemetry => f.write_str(TELEMETRY_TOPIC),
            Self::RpcResponse(id) => write!(f, "{RPC_RESPONSE_PREFIX}{id}"),
        }
    }
}

/// A payload waiting for transmission. Owns its arena block until the
/// session loop releases it.
#[derive(Debug)]
pub struct PublishDescriptor {
    pub block: ArenaBlock,
    pub topic: Topic,
    pub qos: QoS,
    pub packet_id: u16,
}

/// A descriptor the queue refused, returned so its block can be released.
#[derive(Debug)]
pub struct EnqueueError {
    pub reason: PublishError,
    pub descriptor: PublishDescriptor,
}

pub struct PublishQueue {
    channel: Channel<CriticalSectionRawMutex, PublishDescriptor, PUBLISH_QUEUE_DEPTH>,
    closed: AtomicBool,
    close_signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for PublishQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            closed: AtomicBool::new(false),
            close_signal: Signal::new(),
        }
    }

    /// Append without blocking. A full or closed queue leaves its contents
    /// untouched and returns the descriptor.
    pub fn try_enqueue(&self, descriptor: PublishDescriptor) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError {
                reason: PublishError::QueueClosed,
                descriptor,
            });
        }
        self.channel.try_send(descriptor).map_err(|e| match e {
            TrySendError::Full(descriptor) => EnqueueError {
                reason: PublishError::QueueFull,
                descriptor,
            },
        })
    }

    /// Wait for the oldest descriptor. Resolves to [`QueueClosed`] once
    /// [`close`](Self::close) has been called, even while entries remain.
    pub async fn dequeue(&self) -> Result<PublishDescriptor, QueueClosed> {
        if self.is_closed() {
            return Err(QueueClosed);
        }
        future::or(async { Ok(self.channel.receive().await) }, async {
            self.close_signal.wait().await;
            Err(QueueClosed)
        })
        .await
    }

    /// Take the oldest descriptor if one is waiting, closed or not.
    pub fn try_dequeue(&self) -> Option<PublishDescriptor> {
        self.channel.try_receive().ok()
    }

    /// Reject further enqueues and wake the consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_signal.signal(());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    pub const fn capacity(&self) -> usize {
        PUBLISH_QUEUE_DEPTH
    }
}
