//! One-shot GPIO initialization and raw pin access.
//!
//! Sensor inputs are pulled up and interrupt on any edge; light outputs
//! start high, which is "off" for the active-low LED drivers. Called once
//! from `main()` before any worker is spawned.
//!
//! Off target, pin levels live in an in-memory table so the adapters above
//! this layer can be exercised by host tests.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrAddFailed { pin: i32, rc: i32 },
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={rc})"),
            Self::IsrAddFailed { pin, rc } => write!(f, "GPIO{pin} ISR registration failed (rc={rc})"),
        }
    }
}

impl std::error::Error for HwInitError {}

/// Signature of a per-pin GPIO interrupt handler.
pub type GpioIsr = unsafe extern "C" fn(arg: *mut core::ffi::c_void);

// ── Peripheral init ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    let sensor_mask = pins::SENSOR_GPIOS.iter().fold(0u64, |m, &p| m | (1u64 << p));
    let sensors = gpio_config_t {
        pin_bit_mask: sensor_mask,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
    };
    // SAFETY: called once from main() before any worker exists.
    let ret = unsafe { gpio_config(&sensors) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    let light_mask = pins::LIGHT_GPIOS.iter().fold(0u64, |m, &p| m | (1u64 << p));
    let lights = gpio_config_t {
        pin_bit_mask: light_mask,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: as above.
    let ret = unsafe { gpio_config(&lights) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    for &pin in &pins::LIGHT_GPIOS {
        gpio_write(pin, true);
    }

    info!("hw_init: {} sensor inputs, {} light outputs", pins::SENSOR_GPIOS.len(), pins::LIGHT_GPIOS.len());
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── Pin access ────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: register read on a configured input; safe from any context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: register write on a configured output. Each light pin has a
    // single writer (the shared output bank).
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, Ordering};

    pub const PIN_COUNT: usize = 49;

    #[allow(clippy::declare_interior_mutable_const)]
    const HIGH: AtomicBool = AtomicBool::new(true);
    /// Idle level is high (pull-ups, LEDs off).
    static LEVELS: [AtomicBool; PIN_COUNT] = [HIGH; PIN_COUNT];

    pub fn read(pin: i32) -> bool {
        slot(pin).is_some_and(|l| l.load(Ordering::Acquire))
    }

    pub fn write(pin: i32, high: bool) {
        if let Some(level) = slot(pin) {
            level.store(high, Ordering::Release);
        }
    }

    fn slot(pin: i32) -> Option<&'static AtomicBool> {
        usize::try_from(pin).ok().and_then(|p| LEVELS.get(p))
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(pin: i32) -> bool {
    sim::read(pin)
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(pin: i32, high: bool) {
    sim::write(pin, high);
}

/// Drive a simulated input pin, as a sensor would.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_level(pin: i32, high: bool) {
    sim::write(pin, high);
}

// ── GPIO ISR service ──────────────────────────────────────────

/// Install the per-pin ISR service and attach `isr` to every sensor input.
///
/// `arg` is handed to the handler unchanged, so it must stay valid for as
/// long as the interrupts are enabled.
#[cfg(target_os = "espidf")]
pub fn install_sensor_isr(isr: GpioIsr, arg: *mut core::ffi::c_void) -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service tolerates a second call
    // (ESP_ERR_INVALID_STATE). The handler contract is on the caller.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        for &pin in &pins::SENSOR_GPIOS {
            let rc = gpio_isr_handler_add(pin, Some(isr), arg);
            if rc != ESP_OK as i32 {
                return Err(HwInitError::IsrAddFailed { pin, rc });
            }
            gpio_intr_enable(pin);
        }
    }
    info!("hw_init: sensor ISR attached to {:?}", pins::SENSOR_GPIOS);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install_sensor_isr(_isr: GpioIsr, _arg: *mut core::ffi::c_void) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn sim_pins_idle_high() {
        assert!(gpio_read(40));
    }

    #[test]
    fn sim_write_is_read_back() {
        gpio_write(41, false);
        assert!(!gpio_read(41));
        sim_set_level(41, true);
        assert!(gpio_read(41));
    }

    #[test]
    fn out_of_range_pin_reads_low_and_ignores_writes() {
        gpio_write(200, true);
        assert!(!gpio_read(200));
        assert!(!gpio_read(-1));
    }

    #[test]
    fn error_names_the_pin() {
        let e = HwInitError::IsrAddFailed { pin: 5, rc: -1 };
        assert_eq!(e.to_string(), "GPIO5 ISR registration failed (rc=-1)");
    }
}
