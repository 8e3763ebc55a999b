//! The board's simulated pins behind the GPIO adapter.
//!
//! Everything touching the board's own pin numbers lives in one test so
//! nothing else in this binary races on the shared pin table.

#![cfg(not(target_os = "espidf"))]

use heapless::Vec;
use smartlight::adapters::hardware::GpioBank;
use smartlight::app::ports::{OutputPort, SharedOutputs};
use smartlight::app::sensors::SensorHandler;
use smartlight::config::CHANNELS;
use smartlight::drivers::hw_init::{self, gpio_read, sim_set_level};
use smartlight::pins::{LIGHT_GPIOS, SENSOR_GPIOS};
use smartlight::pubsub::dispatch::{CommandContext, dispatch};
use smartlight::pubsub::link::InboundCommand;
use smartlight::pubsub::outbox::Outbox;

fn telemetry(outbox: &Outbox) -> std::vec::Vec<String> {
    let mut out = std::vec::Vec::new();
    while let Some(d) = outbox.queue.try_dequeue() {
        out.push(String::from_utf8_lossy(outbox.arena.bytes(&d.block)).into_owned());
        outbox.arena.release(d.block);
    }
    out
}

#[test]
fn board_pins_follow_buttons_and_remote_commands() {
    hw_init::init_peripherals().unwrap();
    let outbox = Outbox::new();
    let lights = SharedOutputs::new(GpioBank::lights());
    let mut inputs = GpioBank::sensors();

    // All buttons released (pulled high): nothing asserted at boot.
    let mut handler = SensorHandler::new(&CHANNELS, &outbox, &mut inputs);
    assert_eq!(handler.state().previous, [false; 4]);

    // Press the projector button: pin goes low, its LED pin goes low (lit).
    sim_set_level(SENSOR_GPIOS[2], false);
    assert_eq!(handler.process(&mut inputs, &mut &lights), 1);
    assert!(!gpio_read(LIGHT_GPIOS[2]));
    assert_eq!(telemetry(&outbox), [r#"{"Projector":"On"}"#]);

    // Student present (button pressed) turns its light off.
    sim_set_level(SENSOR_GPIOS[1], false);
    handler.process(&mut inputs, &mut &lights);
    assert!(gpio_read(LIGHT_GPIOS[1]));
    assert_eq!(telemetry(&outbox), [r#"{"Student":"Absent"}"#]);

    // Remote command on the same bank.
    let command = InboundCommand {
        request_id: Some(5),
        payload: Vec::from_slice(br#"{"method":"set-output","params":{"ledno":0,"value":true}}"#).unwrap(),
    };
    let mut outputs = &lights;
    let mut ctx = CommandContext {
        outputs: &mut outputs,
        outbox: &outbox,
        request_id: command.request_id,
    };
    dispatch(&command, &mut ctx).unwrap();
    assert!(!gpio_read(LIGHT_GPIOS[0]));
    assert!((&lights).get_channel(0));

    // Release everything.
    for pin in SENSOR_GPIOS {
        sim_set_level(pin, true);
    }
    assert_eq!(handler.process(&mut inputs, &mut &lights), 2);
    assert_eq!(outbox.arena.used_units(), 2);
    outbox.shutdown();
}
