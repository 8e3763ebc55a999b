//! Agent logic above the pubsub core: sensor change handling, the
//! periodic heartbeat, and the port traits hardware is reached through.

pub mod heartbeat;
pub mod ports;
pub mod sensors;
