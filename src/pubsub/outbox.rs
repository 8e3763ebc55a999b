//! Publish entry point shared by every producer.
//!
//! The [`Outbox`] pairs the payload arena with the publish queue. It is
//! created once (usually in a `static`) and handed to each producer and to the
//! session loop by reference.
//!
//! Publishing is allocate → copy → enqueue and never blocks. Whatever goes
//! wrong, the block is released before returning, so arena occupancy is the
//! same afterwards as before.

use log::{debug, warn};
use serde::Serialize;

use super::arena::Arena;
use super::queue::{PublishDescriptor, PublishQueue, QoS, Topic};
use crate::adapters::entropy;
use crate::error::PublishError;

pub struct Outbox {
    pub arena: Arena,
    pub queue: PublishQueue,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            queue: PublishQueue::new(),
        }
    }

    /// Copy `payload` into the arena and queue it for `topic`.
    pub fn publish(&self, topic: Topic, qos: QoS, payload: &[u8]) -> Result<(), PublishError> {
        let mut block = self.arena.allocate(payload.len()).inspect_err(|_| {
            warn!("outbox: no arena space for {} B to {topic}, dropped", payload.len());
        })?;
        self.arena.bytes_mut(&mut block).copy_from_slice(payload);

        let descriptor = PublishDescriptor {
            block,
            topic,
            qos,
            packet_id: entropy::packet_id(),
        };
        let packet_id = descriptor.packet_id;

        match self.queue.try_enqueue(descriptor) {
            Ok(()) if self.queue.is_closed() => {
                // Closed between the check and the send: a shutdown drain
                // may already have run, so nothing else will free this.
                let discarded = self.drain();
                warn!("outbox: queue closed while queuing to {topic}, reclaimed {discarded}");
                Err(PublishError::QueueClosed)
            }
            Ok(()) => {
                debug!("outbox: queued {} B to {topic} (id {packet_id})", payload.len());
                Ok(())
            }
            Err(rejected) => {
                self.arena.release(rejected.descriptor.block);
                warn!("outbox: {} to {topic}, dropped", rejected.reason);
                Err(rejected.reason)
            }
        }
    }

    /// Serialise `value` as JSON and publish it at QoS 0.
    pub fn publish_json<T: Serialize>(&self, topic: Topic, value: &T) -> Result<(), PublishError> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            warn!("outbox: encoding for {topic} failed: {e}");
            PublishError::Encode
        })?;
        self.publish(topic, QoS::AtMostOnce, &bytes)
    }

    /// Close the queue and release everything still waiting in it.
    /// Returns the number of descriptors discarded.
    pub fn shutdown(&self) -> usize {
        self.queue.close();
        let discarded = self.drain();
        if discarded > 0 {
            warn!("outbox: discarded {discarded} unsent payload(s) at shutdown");
        }
        discarded
    }

    fn drain(&self) -> usize {
        let mut discarded = 0;
        while let Some(descriptor) = self.queue.try_dequeue() {
            self.arena.release(descriptor.block);
            discarded += 1;
        }
        discarded
    }
}
