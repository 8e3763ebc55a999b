//! Publish/subscribe core.
//!
//! ```text
//!  producers ──▶ Outbox ─┬─ Arena (payload bytes)
//!                        └─ PublishQueue (descriptors) ──▶ session loop ──▶ MqttTransport
//!
//!  MqttTransport callbacks ──▶ SessionLink ──▶ session loop ──▶ dispatch
//! ```

pub mod arena;
pub mod dispatch;
pub mod link;
pub mod outbox;
pub mod payload;
pub mod queue;
pub mod transport;
