//! Device identity derived from the ESP32 factory MAC address.
//!
//! The broker credential is the MAC rendered as a colon-separated address
//! (`AA:BB:CC:DD:EE:FF`), the form the provisioning sheet records for each
//! classroom board. The serial number reported in the heartbeat is the short
//! `SL-XXYYZZ` form built from the last three bytes.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// `AA:BB:CC:DD:EE:FF` (17 chars).
pub type AccessToken = heapless::String<24>;

/// `SL-XXYYZZ` (9 chars).
pub type SerialNumber = heapless::String<16>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Credential presented at session establishment.
pub fn access_token(mac: &MacAddress) -> AccessToken {
    let mut token = AccessToken::new();
    for (i, byte) in mac.iter().enumerate() {
        let sep = if i == 0 { "" } else { ":" };
        let _ = write!(token, "{sep}{byte:02X}");
    }
    token
}

pub fn serial_number(mac: &MacAddress) -> SerialNumber {
    let mut serial = SerialNumber::new();
    let _ = write!(serial, "SL-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    serial
}
