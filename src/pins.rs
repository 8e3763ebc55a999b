//! GPIO assignments for the SmartLight classroom board.
//!
//! Single source of truth for pin numbers. Both banks are active-low: buttons
//! pull to ground when pressed, LEDs sink current through the pin.

use crate::config::CHANNEL_COUNT;

// ---------------------------------------------------------------------------
// Sensor inputs (momentary push-buttons, internal pull-up)
// ---------------------------------------------------------------------------

/// Door, Student, Projector, Board, in channel order.
pub const SENSOR_GPIOS: [i32; CHANNEL_COUNT] = [4, 5, 6, 7];

// ---------------------------------------------------------------------------
// Light outputs
// ---------------------------------------------------------------------------

/// One LED per sensor channel, same order.
pub const LIGHT_GPIOS: [i32; CHANNEL_COUNT] = [10, 11, 12, 13];
