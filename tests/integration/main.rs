//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below exercises one path through the agent against mock
//! adapters. Everything runs on the host with no hardware.

mod gpio_tests;
mod mock_hw;
mod pipeline_tests;
mod session_tests;
