//! SmartLight classroom agent.
//!
//! Mirrors four push-button sensors onto four lights and reports every
//! change to an MQTT broker, while accepting remote light commands. The
//! pieces:
//!
//! * [`pubsub`]: payload arena, bounded publish queue, inbound command
//!   dispatch and the transport seam.
//! * [`fsm`]: the connection/session state machine that owns the transport.
//! * [`app`]: deferred sensor handling, heartbeat and the I/O port traits.
//! * [`adapters`] / [`drivers`]: GPIO, MQTT client, Wi-Fi and identity.
//!
//! ESP-IDF code is behind `#[cfg(target_os = "espidf")]` inside each
//! module; everything else builds and tests on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod pubsub;
