//! Mock transport, pins and delay for integration tests.
//!
//! The transport records every call so tests can assert on the exact wire
//! sequence without a broker. Session acceptance is simulated by calling
//! the link's `on_connect` callback from inside `establish_session`, the
//! way the real client's event task would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use smartlight::app::ports::{InputPort, OutputPort};
use smartlight::config::{AgentConfig, CHANNEL_COUNT, RetryPolicy};
use smartlight::error::TransportError;
use smartlight::pubsub::link::SessionLink;
use smartlight::pubsub::queue::QoS;
use smartlight::pubsub::transport::{MqttTransport, OutboundMessage};

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Close,
    Session { credential: String },
    Publish { topic: String, payload: String },
    Subscribe { topic: String },
    Disconnect,
}

pub struct MockTransport {
    pub calls: Vec<Call>,
    link: &'static SessionLink,
    /// Connect attempts that fail before one succeeds.
    pub connect_failures: u32,
    /// Whether the broker accepts the session.
    pub accept_session: bool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(link: &'static SessionLink) -> Self {
        Self {
            calls: Vec::new(),
            link,
            connect_failures: 0,
            accept_session: true,
        }
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| matches(c)).count()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Publish { topic, payload } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }
}

impl MqttTransport for MockTransport {
    type Error = TransportError;

    fn connect(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Connect);
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(TransportError::Connect(-1));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Close);
        Ok(())
    }

    fn establish_session(&mut self, credential: &str, _clean_session: bool) -> Result<(), TransportError> {
        self.calls.push(Call::Session {
            credential: credential.to_string(),
        });
        if self.accept_session {
            self.link.on_connect();
        }
        Ok(())
    }

    fn publish(&mut self, message: &OutboundMessage<'_>) -> Result<(), TransportError> {
        self.calls.push(Call::Publish {
            topic: message.topic.to_string(),
            payload: String::from_utf8_lossy(message.payload).into_owned(),
        });
        Ok(())
    }

    fn subscribe(&mut self, _packet_id: u16, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        self.calls.push(Call::Subscribe { topic: topic.to_string() });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Disconnect);
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
    pub slept_ms: Vec<u32>,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms.push(ms);
    }
}

// ── Pins ──────────────────────────────────────────────────────

/// Sensor levels another thread can flip.
pub struct MockInputs {
    pub levels: &'static [AtomicBool; CHANNEL_COUNT],
}

#[allow(dead_code)]
impl MockInputs {
    pub fn set(&self, index: usize, level: bool) {
        self.levels[index].store(level, Ordering::Release);
    }
}

impl InputPort for MockInputs {
    fn read_channel(&mut self, index: usize) -> bool {
        self.levels[index].load(Ordering::Acquire)
    }
}

/// Output bank that remembers every write.
#[derive(Debug, Default)]
pub struct MockOutputs {
    pub levels: [bool; CHANNEL_COUNT],
    pub writes: Vec<(usize, bool)>,
}

impl OutputPort for MockOutputs {
    fn set_channel(&mut self, index: usize, on: bool) {
        if let Some(level) = self.levels.get_mut(index) {
            *level = on;
            self.writes.push((index, on));
        }
    }

    fn get_channel(&self, index: usize) -> bool {
        self.levels.get(index).copied().unwrap_or(false)
    }

    fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }
}

// ── Helpers ───────────────────────────────────────────────────

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Config with short waits so threaded tests finish quickly.
pub fn fast_config() -> AgentConfig {
    AgentConfig {
        transport_connect: RetryPolicy {
            attempts: 100,
            delay_ms: 1,
            backoff_every: 5,
        },
        session_connect: RetryPolicy {
            attempts: 20,
            delay_ms: 1,
            backoff_every: 1,
        },
        drain_delay_ms: 1,
        ..AgentConfig::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
