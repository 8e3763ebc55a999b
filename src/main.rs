//! SmartLight firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  GPIO ISR ── pending + task notify ──▶ sensor worker (core 1)    │
//! │                                         │ diff · lights · enqueue│
//! │                                         ▼                        │
//! │  main (heartbeat) ── enqueue ──▶ OUTBOX (arena + queue)          │
//! │                                         │                        │
//! │                                         ▼                        │
//! │  session thread (core 0): SessionMachine ◀── LINK ◀── esp-mqtt   │
//! │                           │ transmit / dispatch                  │
//! │                           └──▶ LIGHTS (remote set-output)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::ffi::c_void;
use core::num::NonZeroU32;
use core::time::Duration;

use anyhow::{Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{BLOCK, FreeRtos};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::notification::{Notification, Notifier};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{debug, error, info};

use smartlight::adapters::device_id;
use smartlight::adapters::hardware::GpioBank;
use smartlight::adapters::mqtt::EspMqttTransport;
use smartlight::adapters::time::UptimeClock;
use smartlight::adapters::wifi::{self, WifiCredentials};
use smartlight::app::heartbeat::Heartbeat;
use smartlight::app::ports::SharedOutputs;
use smartlight::app::sensors::{SensorHandler, SensorSignal};
use smartlight::config::{AgentConfig, CHANNELS};
use smartlight::drivers::hw_init;
use smartlight::drivers::task_pin::{Core, TaskSpec, spawn_task};
use smartlight::fsm::context::SessionContext;
use smartlight::fsm::{SessionMachine, SessionState};
use smartlight::pubsub::link::SessionLink;
use smartlight::pubsub::outbox::Outbox;

// ── Shared state ──────────────────────────────────────────────

static OUTBOX: Outbox = Outbox::new();
static LINK: SessionLink = SessionLink::new();
static SENSOR_SIGNAL: SensorSignal = SensorSignal::new();
static LIGHTS: SharedOutputs<GpioBank> = SharedOutputs::new(GpioBank::lights());

const SENSOR_TASK: TaskSpec = TaskSpec {
    name: c"sensors",
    core: Core::App,
    priority: 10,
    stack_kb: 6,
};

const SESSION_TASK: TaskSpec = TaskSpec {
    name: c"session",
    core: Core::Pro,
    priority: 7,
    stack_kb: 12,
};

// ── Sensor interrupt ──────────────────────────────────────────

/// Any-edge handler shared by all four sensor pins. `arg` is the sensor
/// worker's leaked [`Notifier`].
unsafe extern "C" fn sensor_gpio_isr(arg: *mut c_void) {
    SENSOR_SIGNAL.notify_from_isr();
    // SAFETY: `arg` was produced by `Arc::into_raw` in `sensor_worker` and
    // is never released.
    let notifier = unsafe { &*arg.cast_const().cast::<Notifier>() };
    // SAFETY: notify_and_yield is the ISR-context notification path.
    let _ = unsafe { notifier.notify_and_yield(NonZeroU32::MIN) };
}

fn sensor_worker() {
    let notification = Notification::new();
    let mut inputs = GpioBank::sensors();
    let mut lights = &LIGHTS;
    let mut handler = SensorHandler::new(&CHANNELS, &OUTBOX, &mut inputs);

    let notifier = std::sync::Arc::into_raw(notification.notifier());
    if let Err(e) = hw_init::install_sensor_isr(sensor_gpio_isr, notifier.cast_mut().cast()) {
        error!("sensors: {e}; changes will not be reported");
        return;
    }

    loop {
        let _ = notification.wait(BLOCK);
        if SENSOR_SIGNAL.take_pending() {
            handler.process(&mut inputs, &mut lights);
        }
    }
}

// ── Session thread ────────────────────────────────────────────

fn session_worker(config: AgentConfig, credential: device_id::AccessToken) {
    let transport = EspMqttTransport::new(&config, &LINK);
    let ctx = SessionContext::new(transport, FreeRtos, &LIGHTS, &LINK, &OUTBOX, config, credential.as_str());
    let mut machine = SessionMachine::new(ctx);
    machine.run();

    let stats = machine.context().stats;
    error!(
        "session: {:?}; published {}, commands {} handled / {} rejected",
        SessionState::Terminated,
        stats.published,
        stats.commands_handled,
        stats.commands_rejected
    );
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let config = AgentConfig::default();
    info!("SmartLight v{} starting", config.firmware_version);

    hw_init::init_peripherals().context("GPIO init")?;

    let mac = device_id::read_mac();
    let credential = device_id::access_token(&mac);
    let serial = device_id::serial_number(&mac);
    info!("identity: serial {serial}");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let credentials = WifiCredentials::from_build_env().context("Wi-Fi credentials")?;
    // Kept alive for the lifetime of the firmware.
    let _wifi = wifi::bring_up(
        peripherals.modem,
        sysloop,
        nvs,
        &credentials,
        Duration::from_millis(u64::from(config.net_init_timeout_ms)),
    )
    .context("network bring-up")?;

    spawn_task(SENSOR_TASK, sensor_worker)?;
    spawn_task(SESSION_TASK, move || session_worker(config, credential))?;

    let clock = UptimeClock::new();
    let heartbeat = Heartbeat::new(&OUTBOX, &config, &serial);
    loop {
        std::thread::sleep(heartbeat.interval());
        if let Err(e) = heartbeat.beat(clock.uptime_secs()) {
            debug!("heartbeat: {e}");
        }
    }
}
