//! Monotonic uptime for the heartbeat.
//!
//! - **`target_os = "espidf"`** reads `esp_timer_get_time()`, which counts
//!   microseconds since boot.
//! - Elsewhere the clock starts at construction, using `std::time::Instant`.

pub struct UptimeClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_ms() / 1_000
    }

    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        // SAFETY: reads the free-running high-resolution timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
