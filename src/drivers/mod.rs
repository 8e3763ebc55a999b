//! GPIO bring-up, raw pin access and worker-task placement.

pub mod hw_init;
pub mod task_pin;
