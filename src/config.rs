//! Agent configuration.
//!
//! Everything tunable lives here as compile-time defaults: broker endpoint,
//! retry ceilings and delays for each connection phase, heartbeat period,
//! topic names, pool sizes, and the sensor channel table.

use core::net::Ipv4Addr;

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
/// Wildcard subscription for server-side RPC requests.
pub const RPC_REQUEST_TOPIC: &str = "v1/devices/me/rpc/request/+";
/// Prefix of a concrete request topic; the request id follows it.
pub const RPC_REQUEST_PREFIX: &str = "v1/devices/me/rpc/request/";
/// Prefix of the reply topic for a request id.
pub const RPC_RESPONSE_PREFIX: &str = "v1/devices/me/rpc/response/";

// ---------------------------------------------------------------------------
// Pool sizing
// ---------------------------------------------------------------------------

/// Maximum number of descriptors waiting for the publish loop.
pub const PUBLISH_QUEUE_DEPTH: usize = 20;
/// Arena allocation granule in bytes.
pub const ARENA_UNIT_BYTES: usize = 64;
/// Arena size in units (48 × 64 B = 3 KiB).
pub const ARENA_UNITS: usize = 48;
/// Inbound commands buffered between the receive callback and the loop.
pub const INBOUND_DEPTH: usize = 4;
/// Largest inbound command payload accepted.
pub const INBOUND_PAYLOAD_MAX: usize = 256;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

pub const CHANNEL_COUNT: usize = 4;

/// One row of the sensor table: the telemetry key, the label published for
/// each logical level, and the output level driven when the input asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: &'static str,
    pub asserted_label: &'static str,
    pub released_label: &'static str,
    pub output_when_asserted: bool,
}

impl ChannelSpec {
    pub fn label(&self, asserted: bool) -> &'static str {
        if asserted {
            self.asserted_label
        } else {
            self.released_label
        }
    }

    /// Output level mirrored for an input level.
    pub fn output_level(&self, asserted: bool) -> bool {
        if asserted {
            self.output_when_asserted
        } else {
            !self.output_when_asserted
        }
    }
}

/// Input channel `i` drives output channel `i`.
pub const CHANNELS: [ChannelSpec; CHANNEL_COUNT] = [
    ChannelSpec {
        name: "Door",
        asserted_label: "Open",
        released_label: "Close",
        output_when_asserted: true,
    },
    ChannelSpec {
        name: "Student",
        asserted_label: "Absent",
        released_label: "Present",
        output_when_asserted: false,
    },
    ChannelSpec {
        name: "Projector",
        asserted_label: "On",
        released_label: "Off",
        output_when_asserted: true,
    },
    ChannelSpec {
        name: "Board",
        asserted_label: "Writing",
        released_label: "NoWrite",
        output_when_asserted: true,
    },
];

// ---------------------------------------------------------------------------
// Runtime parameters
// ---------------------------------------------------------------------------

/// Ceiling and pacing for one connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before the phase gives up.
    pub attempts: u16,
    /// Sleep between attempts (ms).
    pub delay_ms: u32,
    /// Sleep only after every Nth failure; `1` sleeps after each one.
    pub backoff_every: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    // --- Broker ---
    pub broker_addr: Ipv4Addr,
    pub broker_port: u16,
    /// Socket-level timeout the transport adapter applies to connect (ms).
    pub net_init_timeout_ms: u32,

    // --- Connection phases ---
    pub transport_connect: RetryPolicy,
    pub session_connect: RetryPolicy,
    /// Wait between DISCONNECT and closing the socket (ms).
    pub drain_delay_ms: u32,

    // --- Reporting ---
    pub heartbeat_interval_secs: u32,
    pub firmware_version: &'static str,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            // Broker
            broker_addr: Ipv4Addr::new(192, 168, 1, 10),
            broker_port: 1883,
            net_init_timeout_ms: 10_000,

            // Connection phases
            transport_connect: RetryPolicy {
                attempts: 100,
                delay_ms: 1_500,
                backoff_every: 5,
            },
            session_connect: RetryPolicy {
                attempts: 20,
                delay_ms: 1_000,
                backoff_every: 1,
            },
            drain_delay_ms: 500,

            // Reporting
            heartbeat_interval_secs: 15,
            firmware_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = AgentConfig::default();
        assert!(c.transport_connect.attempts > 0);
        assert!(c.session_connect.attempts > 0);
        assert!(c.transport_connect.backoff_every > 0);
        assert!(c.session_connect.backoff_every > 0);
        assert!(c.heartbeat_interval_secs > 0);
        assert!(!c.firmware_version.is_empty());
    }

    #[test]
    fn session_wait_fits_inside_heartbeat() {
        let c = AgentConfig::default();
        assert!(c.session_connect.delay_ms < c.heartbeat_interval_secs * 1000);
    }

    #[test]
    fn channel_table_is_complete() {
        for spec in &CHANNELS {
            assert!(!spec.name.is_empty());
            assert_ne!(spec.asserted_label, spec.released_label);
        }
    }

    #[test]
    fn student_channel_inverts_output() {
        let student = &CHANNELS[1];
        assert_eq!(student.label(true), "Absent");
        assert!(!student.output_level(true));
        assert!(student.output_level(false));

        let door = &CHANNELS[0];
        assert_eq!(door.label(false), "Close");
        assert!(door.output_level(true));
    }

    #[test]
    fn arena_fits_a_full_queue_of_small_payloads() {
        assert!(ARENA_UNITS >= PUBLISH_QUEUE_DEPTH);
        assert!(ARENA_UNITS <= 64, "occupancy bitmap is a u64");
    }

    #[test]
    fn request_prefix_matches_subscription() {
        assert!(RPC_REQUEST_TOPIC.starts_with(RPC_REQUEST_PREFIX));
    }
}
