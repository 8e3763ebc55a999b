//! Deferred sensor-change handling.
//!
//! The GPIO interrupt does nothing but [`SensorSignal::notify_from_isr`]
//! and a task wake-up. The sensor worker does the real work outside
//! interrupt context: diff every channel against its previous level, mirror
//! changes onto the outputs, and publish one telemetry message per change.
//!
//! ```text
//!  edge ──▶ ISR ──pending──▶ SensorSignal ──take──▶ SensorHandler::process
//!                                                      │ read · diff
//!                                                      ├─▶ OutputPort
//!                                                      └─▶ Outbox (telemetry)
//! ```
//!
//! Several edges before the worker runs collapse into one wake-up; the
//! diff then sees only the net change.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info};

use super::ports::{InputPort, OutputPort};
use crate::config::{CHANNEL_COUNT, ChannelSpec};
use crate::pubsub::outbox::Outbox;
use crate::pubsub::payload::Telemetry;
use crate::pubsub::queue::Topic;

/// Interrupt-to-worker wake-up.
///
/// The pending flag is a plain atomic so the ISR never takes a lock. Task
/// context wakers go through [`SensorSignal::notify`], which also wakes an
/// async [`SensorSignal::wait`]; an ISR pairs `notify_from_isr` with an RTOS
/// task notification instead.
pub struct SensorSignal {
    pending: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for SensorSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Mark the sensors dirty. Lock-free; safe from an ISR.
    pub fn notify_from_isr(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Mark the sensors dirty and wake a waiting worker.
    pub fn notify(&self) {
        self.notify_from_isr();
        self.wake.signal(());
    }

    pub async fn wait(&self) {
        loop {
            if self.take_pending() {
                return;
            }
            self.wake.wait().await;
        }
    }

    /// Consume a pending notification without waiting.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

/// Last observed level of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorState {
    pub previous: [bool; CHANNEL_COUNT],
}

pub struct SensorHandler<'a> {
    channels: &'a [ChannelSpec; CHANNEL_COUNT],
    outbox: &'a Outbox,
    state: SensorState,
}

impl<'a> SensorHandler<'a> {
    /// Build a handler whose baseline is the inputs' current levels, so
    /// nothing is reported for the state the device boots into.
    pub fn new<I: InputPort>(
        channels: &'a [ChannelSpec; CHANNEL_COUNT],
        outbox: &'a Outbox,
        inputs: &mut I,
    ) -> Self {
        let mut state = SensorState::default();
        for (index, level) in state.previous.iter_mut().enumerate() {
            *level = inputs.read_channel(index);
        }
        info!("sensors: baseline {:?}", state.previous);
        Self {
            channels,
            outbox,
            state,
        }
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    /// Diff, actuate and report every channel. Returns how many changed.
    ///
    /// The previous level is updated even when the telemetry is dropped, so
    /// a lost message is never re-sent for the same edge.
    pub fn process<I: InputPort, O: OutputPort>(&mut self, inputs: &mut I, outputs: &mut O) -> usize {
        let mut changed = 0;
        for (index, spec) in self.channels.iter().enumerate() {
            let level = inputs.read_channel(index);
            if level == self.state.previous[index] {
                continue;
            }
            changed += 1;

            let telemetry = Telemetry {
                key: spec.name,
                value: spec.label(level),
            };
            outputs.set_channel(index, spec.output_level(level));
            // Dropped telemetry is logged by the outbox.
            let _ = self.outbox.publish_json(Topic::Telemetry, &telemetry);
            debug!("sensors: {} -> {}", spec.name, telemetry.value);

            self.state.previous[index] = level;
        }
        changed
    }

    /// Worker loop for task-context notifiers: sleep until notified, then
    /// process.
    pub fn run<I: InputPort, O: OutputPort>(mut self, signal: &SensorSignal, inputs: &mut I, outputs: &mut O) -> ! {
        loop {
            future::block_on(signal.wait());
            self.process(inputs, outputs);
        }
    }
}
