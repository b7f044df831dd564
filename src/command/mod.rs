// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device commands.
//!
//! Host writes arrive as `(path, value)`. The bridge maps the path to a
//! device and a [`CommandKind`], which turns the value into a
//! [`DeviceCommand`]; the command renders the device parameters to send.
//!
//! | Path key | Kind | Parameters |
//! |----------|------|------------|
//! | `state` (switch, light) | [`CommandKind::Power`] | `{"switch": "on"}` |
//! | `state` (bank outlet) | [`CommandKind::OutletPower`] | `{"switches": [{"switch": "on", "outlet": n}]}` |
//! | `mode` | [`CommandKind::Mode`] | `{"mode": 1..12}` |
//! | `dimmingLevel` | [`CommandKind::DimmingLevel`] | `{"bright": 1..100}` |
//! | `preset` | [`CommandKind::Preset`] | colour, `switch: on`, brightness |
//! | `colorR` and friends | [`CommandKind::Param`] | `{"<key>": n}` |
//!
//! # Examples
//!
//! ```
//! use ewelink_bridge::command::CommandKind;
//! use ewelink_bridge::config::DeviceSettings;
//! use serde_json::json;
//!
//! let command = CommandKind::DimmingLevel
//!     .parse(&json!(0.42), &DeviceSettings::default())
//!     .unwrap();
//! assert_eq!(serde_json::to_value(command.to_params()).unwrap(), json!({ "bright": 42 }));
//! ```

mod correlator;
mod ticket;

use serde_json::{Map, Value, json};

pub use correlator::CommandCorrelator;
pub use ticket::{CommandCompletion, CommandOutcome, CommandState, CommandTicket};

use crate::config::{DeviceSettings, Preset};
use crate::error::Error;
use crate::types::{Brightness, LightMode, PowerState};

/// Light parameters written through unchanged.
pub const LIGHT_PARAM_KEYS: [&str; 6] = [
    "colorR",
    "colorG",
    "colorB",
    "speed",
    "sensitive",
    "light_type",
];

/// Preset value that names no preset.
pub const UNKNOWN_PRESET: &str = "Unknown";

/// What a writable path controls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Power of a switch or light.
    Power,
    /// Power of one bank outlet.
    OutletPower(u8),
    /// Light effect mode, by name.
    Mode,
    /// Light brightness as a 0-1 level.
    DimmingLevel,
    /// Light colour preset, by name.
    Preset,
    /// A numeric light parameter from [`LIGHT_PARAM_KEYS`].
    Param(&'static str),
}

impl CommandKind {
    /// Converts a host value into a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the value does not fit the kind,
    /// including unknown mode or preset names.
    pub fn parse(&self, value: &Value, settings: &DeviceSettings) -> Result<DeviceCommand, Error> {
        match self {
            Self::Power => Ok(DeviceCommand::Power(PowerState::from_host_value(value))),
            Self::OutletPower(outlet) => Ok(DeviceCommand::OutletPower {
                outlet: *outlet,
                power: PowerState::from_host_value(value),
            }),
            Self::Mode => {
                let name = value.as_str().ok_or_else(|| invalid(value))?;
                Ok(DeviceCommand::Mode(LightMode::from_name(name)?))
            }
            Self::DimmingLevel => {
                let level = value.as_f64().ok_or_else(|| invalid(value))?;
                Ok(DeviceCommand::Brightness(Brightness::from_level(level)))
            }
            Self::Preset => {
                let name = value.as_str().ok_or_else(|| invalid(value))?;
                if name == UNKNOWN_PRESET {
                    return Err(invalid(value));
                }
                settings
                    .presets
                    .iter()
                    .find(|preset| preset.name == name)
                    .cloned()
                    .map(DeviceCommand::Preset)
                    .ok_or_else(|| invalid(value))
            }
            Self::Param(key) => {
                let number = value
                    .as_u64()
                    .or_else(|| {
                        value
                            .as_f64()
                            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                            // Whole, non-negative; checked above.
                            .map(|f| {
                                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                                let n = f as u64;
                                n
                            })
                    })
                    .ok_or_else(|| invalid(value))?;
                if key.starts_with("color") && number > 255 {
                    return Err(invalid(value));
                }
                Ok(DeviceCommand::Param { key, value: number })
            }
        }
    }
}

fn invalid(value: &Value) -> Error {
    match value {
        Value::String(s) => Error::InvalidValue(s.clone()),
        other => Error::InvalidValue(other.to_string()),
    }
}

/// A command ready to be sent to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Switch a relay or the light on or off.
    Power(PowerState),
    /// Switch one bank outlet.
    OutletPower {
        /// Outlet number.
        outlet: u8,
        /// Target state.
        power: PowerState,
    },
    /// Set the light effect mode.
    Mode(LightMode),
    /// Set the light brightness.
    Brightness(Brightness),
    /// Apply a colour preset; also switches the light on.
    Preset(Preset),
    /// Write one numeric light parameter.
    Param {
        /// Parameter name.
        key: &'static str,
        /// Value.
        value: u64,
    },
}

impl DeviceCommand {
    /// Renders the device parameters.
    #[must_use]
    pub fn to_params(&self) -> Map<String, Value> {
        let value = match self {
            Self::Power(power) => json!({ "switch": power.as_str() }),
            Self::OutletPower { outlet, power } => {
                json!({ "switches": [{ "switch": power.as_str(), "outlet": outlet }] })
            }
            Self::Mode(mode) => json!({ "mode": mode.code() }),
            Self::Brightness(brightness) => json!({ "bright": brightness.percent() }),
            Self::Preset(preset) => {
                let mut params = json!({
                    "colorR": preset.red,
                    "colorG": preset.green,
                    "colorB": preset.blue,
                    "switch": PowerState::On.as_str(),
                });
                if !preset.is_brightness_agnostic() {
                    params["bright"] = json!(preset.bright);
                }
                params
            }
            Self::Param { key, value } => json!({ *key: value }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Returns true for power commands.
    #[must_use]
    pub fn is_power(&self) -> bool {
        matches!(self, Self::Power(_) | Self::OutletPower { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_presets() -> DeviceSettings {
        DeviceSettings {
            presets: vec![
                Preset {
                    name: "Red".to_string(),
                    red: 255,
                    green: 0,
                    blue: 0,
                    bright: 0,
                },
                Preset {
                    name: "Reading".to_string(),
                    red: 255,
                    green: 240,
                    blue: 200,
                    bright: 80,
                },
            ],
            ..DeviceSettings::default()
        }
    }

    fn params(command: &DeviceCommand) -> Value {
        Value::Object(command.to_params())
    }

    #[test]
    fn power_values() {
        let settings = DeviceSettings::default();
        let on = CommandKind::Power.parse(&json!(1), &settings).unwrap();
        assert_eq!(params(&on), json!({ "switch": "on" }));
        assert!(on.is_power());

        let off = CommandKind::Power.parse(&json!("off"), &settings).unwrap();
        assert_eq!(params(&off), json!({ "switch": "off" }));
    }

    #[test]
    fn outlet_power() {
        let command = CommandKind::OutletPower(2)
            .parse(&json!(true), &DeviceSettings::default())
            .unwrap();
        assert_eq!(
            params(&command),
            json!({ "switches": [{ "switch": "on", "outlet": 2 }] })
        );
        assert!(command.is_power());
    }

    #[test]
    fn mode_by_name() {
        let settings = DeviceSettings::default();
        let command = CommandKind::Mode.parse(&json!("DIY Pulse"), &settings).unwrap();
        assert_eq!(params(&command), json!({ "mode": 5 }));
        assert!(!command.is_power());

        let err = CommandKind::Mode.parse(&json!("Disco"), &settings).unwrap_err();
        assert_eq!(err.to_string(), "invalid value Disco");
    }

    #[test]
    fn dimming_level_zero_becomes_one() {
        let settings = DeviceSettings::default();
        let command = CommandKind::DimmingLevel.parse(&json!(0), &settings).unwrap();
        assert_eq!(params(&command), json!({ "bright": 1 }));
        assert!(CommandKind::DimmingLevel.parse(&json!("half"), &settings).is_err());
    }

    #[test]
    fn preset_with_and_without_brightness() {
        let settings = with_presets();
        let red = CommandKind::Preset.parse(&json!("Red"), &settings).unwrap();
        assert_eq!(
            params(&red),
            json!({ "colorR": 255, "colorG": 0, "colorB": 0, "switch": "on" })
        );

        let reading = CommandKind::Preset.parse(&json!("Reading"), &settings).unwrap();
        assert_eq!(
            params(&reading),
            json!({ "colorR": 255, "colorG": 240, "colorB": 200, "switch": "on", "bright": 80 })
        );
    }

    #[test]
    fn preset_unknown_or_missing() {
        let settings = with_presets();
        let err = CommandKind::Preset.parse(&json!("Unknown"), &settings).unwrap_err();
        assert_eq!(err.to_string(), "invalid value Unknown");

        let err = CommandKind::Preset.parse(&json!("Blue"), &settings).unwrap_err();
        assert_eq!(err.to_string(), "invalid value Blue");
    }

    #[test]
    fn numeric_params() {
        let settings = DeviceSettings::default();
        let command = CommandKind::Param("colorG").parse(&json!(128), &settings).unwrap();
        assert_eq!(params(&command), json!({ "colorG": 128 }));

        let command = CommandKind::Param("speed").parse(&json!(60.0), &settings).unwrap();
        assert_eq!(params(&command), json!({ "speed": 60 }));

        assert!(CommandKind::Param("colorR").parse(&json!(300), &settings).is_err());
        assert!(CommandKind::Param("speed").parse(&json!(-1), &settings).is_err());
        assert!(CommandKind::Param("sensitive").parse(&json!(2.5), &settings).is_err());
    }
}
