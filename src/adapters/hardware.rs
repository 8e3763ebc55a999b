//! GPIO adapter: the board's pin banks behind the port traits.
//!
//! A [`GpioBank`] maps channel indices to pins and hides the electrical
//! polarity. Both banks on this board are active-low, so a logical `true`
//! is a low pin. On non-espidf targets the pins are the simulated ones in
//! [`hw_init`](crate::drivers::hw_init).

use log::trace;

use crate::app::ports::{InputPort, OutputPort};
use crate::config::CHANNEL_COUNT;
use crate::drivers::hw_init::{gpio_read, gpio_write};
use crate::pins;

pub struct GpioBank {
    pins: [i32; CHANNEL_COUNT],
    active_low: bool,
    /// Last logical level driven per channel.
    driven: [bool; CHANNEL_COUNT],
}

impl GpioBank {
    pub const fn new(pins: [i32; CHANNEL_COUNT], active_low: bool) -> Self {
        Self {
            pins,
            active_low,
            driven: [false; CHANNEL_COUNT],
        }
    }

    /// The four push-button inputs.
    pub const fn sensors() -> Self {
        Self::new(pins::SENSOR_GPIOS, true)
    }

    /// The four LED outputs, initially off.
    pub const fn lights() -> Self {
        Self::new(pins::LIGHT_GPIOS, true)
    }

    fn to_logical(&self, high: bool) -> bool {
        high != self.active_low
    }

    fn to_electrical(&self, on: bool) -> bool {
        on != self.active_low
    }
}

impl InputPort for GpioBank {
    fn read_channel(&mut self, index: usize) -> bool {
        self.pins.get(index).is_some_and(|&pin| self.to_logical(gpio_read(pin)))
    }
}

impl OutputPort for GpioBank {
    fn set_channel(&mut self, index: usize, on: bool) {
        let Some(&pin) = self.pins.get(index) else {
            return;
        };
        gpio_write(pin, self.to_electrical(on));
        self.driven[index] = on;
        trace!("gpio: channel {index} (GPIO{pin}) -> {on}");
    }

    fn get_channel(&self, index: usize) -> bool {
        self.driven.get(index).copied().unwrap_or(false)
    }

    fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }
}
