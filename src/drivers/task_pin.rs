//! Core-pinned worker threads.
//!
//! `std::thread` on ESP-IDF is pthreads over FreeRTOS tasks.
//! `esp_pthread_set_cfg()` sets thread-local configuration for the *next*
//! `pthread_create()` from the calling thread, so configure and spawn must
//! not be interleaved with other spawns on the same thread.
//!
//! Off target, core and priority are ignored.

use core::ffi::CStr;
use std::io;
use std::thread::JoinHandle;

use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU, shared with the Wi-Fi and lwIP tasks.
    Pro = 0,
    App = 1,
}

/// Placement and sizing of one worker task.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static CStr,
    pub core: Core,
    /// FreeRTOS priority.
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.to_str().unwrap_or("worker")
    }
}

#[cfg(target_os = "espidf")]
pub fn spawn_task<F, R>(spec: TaskSpec, f: F) -> io::Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    use esp_idf_svc::sys::{ESP_OK, esp_create_default_pthread_config, esp_pthread_set_cfg};

    // SAFETY: the config is copied by esp_pthread_set_cfg and the name
    // pointer is 'static.
    let ret = unsafe {
        let mut cfg = esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as _;
        cfg.thread_name = spec.name.as_ptr();
        esp_pthread_set_cfg(&cfg)
    };
    if ret != ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed (rc={ret})")));
    }

    info!(
        "task: spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );
    std::thread::Builder::new().name(spec.display_name().into()).spawn(f)
}

#[cfg(not(target_os = "espidf"))]
pub fn spawn_task<F, R>(spec: TaskSpec, f: F) -> io::Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    info!("task(sim): spawning '{}' (stack={}KB)", spec.display_name(), spec.stack_kb);
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}
