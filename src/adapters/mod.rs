//! Adapters: platform implementations behind the agent's seams.
//!
//! | Adapter     | Provides                      | Backed by                     |
//! |-------------|-------------------------------|-------------------------------|
//! | `hardware`  | InputPort, OutputPort         | GPIO (sim table off target)   |
//! | `mqtt`      | MqttTransport                 | esp-mqtt client (espidf only) |
//! | `wifi`      | station bring-up              | ESP-IDF Wi-Fi STA             |
//! | `device_id` | MAC, access token, serial     | eFuse MAC                     |
//! | `entropy`   | packet ids                    | hardware RNG                  |
//! | `time`      | uptime                        | esp_timer                     |

pub mod device_id;
pub mod entropy;
pub mod hardware;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod time;
pub mod wifi;
