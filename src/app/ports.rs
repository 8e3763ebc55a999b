//! Port traits: the boundary between agent logic and the pins.
//!
//! ```text
//!   GpioBank / mocks ──▶ InputPort / OutputPort ──▶ sensors, dispatcher
//! ```
//!
//! Channels are addressed by index and carry *logical* levels. Electrical
//! polarity (the board is active-low on both banks) is the adapter's concern.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

// ───────────────────────────────────────────────────────────────
// Sensor inputs (hardware → agent)
// ───────────────────────────────────────────────────────────────

pub trait InputPort {
    /// `true` when the channel's input is asserted.
    fn read_channel(&mut self, index: usize) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Light outputs (agent → hardware)
// ───────────────────────────────────────────────────────────────

pub trait OutputPort {
    /// Drive an output. Indices past `channel_count()` are ignored.
    fn set_channel(&mut self, index: usize, on: bool);

    /// Last level driven on an output; `false` for unknown indices.
    fn get_channel(&self, index: usize) -> bool;

    fn channel_count(&self) -> usize;
}

impl<T: OutputPort + ?Sized> OutputPort for &mut T {
    fn set_channel(&mut self, index: usize, on: bool) {
        (**self).set_channel(index, on);
    }

    fn get_channel(&self, index: usize) -> bool {
        (**self).get_channel(index)
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }
}

// ───────────────────────────────────────────────────────────────
// Shared outputs
// ───────────────────────────────────────────────────────────────

/// An output bank written from two contexts: the sensor worker mirrors
/// inputs onto it and the session loop applies remote commands. Each access
/// runs inside a critical section, so a write is never torn.
pub struct SharedOutputs<O> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<O>>,
}

impl<O> SharedOutputs<O> {
    pub const fn new(outputs: O) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(outputs)),
        }
    }

    /// Run `f` with exclusive access to the wrapped bank.
    pub fn with<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<O: OutputPort> OutputPort for &SharedOutputs<O> {
    fn set_channel(&mut self, index: usize, on: bool) {
        self.with(|o| o.set_channel(index, on));
    }

    fn get_channel(&self, index: usize) -> bool {
        self.inner.lock(|cell| cell.borrow().get_channel(index))
    }

    fn channel_count(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().channel_count())
    }
}
