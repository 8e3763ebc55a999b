//! Periodic attributes report.
//!
//! Every `heartbeat_interval_secs` the main context publishes firmware
//! version, serial number and uptime to the attributes topic. It goes
//! through the same outbox as telemetry, so a full queue drops it.

use core::time::Duration;

use log::debug;

use crate::config::AgentConfig;
use crate::error::PublishError;
use crate::pubsub::outbox::Outbox;
use crate::pubsub::payload::Attributes;
use crate::pubsub::queue::Topic;

pub struct Heartbeat<'a> {
    outbox: &'a Outbox,
    firmware_version: &'a str,
    serial_number: &'a str,
    interval: Duration,
}

impl<'a> Heartbeat<'a> {
    pub fn new(outbox: &'a Outbox, config: &AgentConfig, serial_number: &'a str) -> Self {
        Self {
            outbox,
            firmware_version: config.firmware_version,
            serial_number,
            interval: Duration::from_secs(u64::from(config.heartbeat_interval_secs)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn beat(&self, uptime_secs: u64) -> Result<(), PublishError> {
        debug!("heartbeat: uptime {uptime_secs}s");
        self.outbox.publish_json(
            Topic::Attributes,
            &Attributes {
                firmware_version: self.firmware_version,
                serial_number: self.serial_number,
                uptime: uptime_secs,
            },
        )
    }
}
