//! Random MQTT packet identifiers.
//!
//! ESP-IDF draws from the hardware RNG; the host build hashes a fresh
//! `RandomState`, which is plenty for test traffic.

/// A random packet id in `1..=u16::MAX`. Zero is reserved by MQTT.
pub fn packet_id() -> u16 {
    match random_u16() {
        0 => 1,
        id => id,
    }
}

#[cfg(target_os = "espidf")]
fn random_u16() -> u16 {
    // SAFETY: esp_random reads the hardware RNG register; no arguments.
    (unsafe { esp_idf_svc::sys::esp_random() }) as u16
}

#[cfg(not(target_os = "espidf"))]
fn random_u16() -> u16 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    RandomState::new().hash_one(0u8) as u16
}
