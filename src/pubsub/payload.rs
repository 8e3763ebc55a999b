//! JSON payload shapes sent to the broker.

use core::fmt::Display;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A single sensor change: `{"<name>":"<label>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

impl Serialize for Telemetry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key, self.value)?;
        map.end()
    }
}

/// Heartbeat attributes. Uptime goes out as a decimal string, which is what
/// the dashboard widgets bind to.
#[derive(Debug, Clone, Serialize)]
pub struct Attributes<'a> {
    pub firmware_version: &'a str,
    pub serial_number: &'a str,
    #[serde(serialize_with = "as_decimal_string")]
    pub uptime: u64,
}

/// Reply to an output read-back request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputReport {
    pub ledno: u8,
    pub value: bool,
}

fn as_decimal_string<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
