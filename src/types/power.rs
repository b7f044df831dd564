// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state of a switch, outlet or light.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::Error;

/// On/off state as reported in the `switch` parameter.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::types::PowerState;
///
/// assert_eq!(PowerState::On.as_str(), "on");
/// assert_eq!(PowerState::Off.as_num(), 0);
/// assert_eq!("on".parse::<PowerState>().unwrap(), PowerState::On);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// Power is off.
    Off,
    /// Power is on.
    On,
}

impl PowerState {
    /// Returns the parameter string used by the devices.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }

    /// Returns the numeric value published to the host.
    #[must_use]
    pub const fn as_num(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    /// Reads a device parameter value (`"on"` / `"off"`).
    ///
    /// Anything other than `"on"` counts as off, matching how the devices
    /// report a relay that is not energised.
    #[must_use]
    pub fn from_param(value: &Value) -> Self {
        Self::from(value.as_str() == Some("on"))
    }

    /// Interprets a value written by the host.
    ///
    /// Accepts `1`, `true`, `"on"` and `"true"` as on; every other value is off.
    #[must_use]
    pub fn from_host_value(value: &Value) -> Self {
        let on = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() == Some(1.0),
            Value::String(s) => s == "on" || s == "true",
            _ => false,
        };
        Self::from(on)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" | "false" => Ok(Self::Off),
            "on" | "1" | "true" => Ok(Self::On),
            _ => Err(Error::InvalidValue(s.to_string())),
        }
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn host_values_that_mean_on() {
        for value in [json!(1), json!(true), json!("on"), json!("true"), json!(1.0)] {
            assert_eq!(PowerState::from_host_value(&value), PowerState::On, "{value}");
        }
    }

    #[test]
    fn host_values_that_mean_off() {
        for value in [json!(0), json!(false), json!("off"), json!(2), json!(null), json!("ON")] {
            assert_eq!(PowerState::from_host_value(&value), PowerState::Off, "{value}");
        }
    }

    #[test]
    fn param_parsing() {
        assert_eq!(PowerState::from_param(&json!("on")), PowerState::On);
        assert_eq!(PowerState::from_param(&json!("off")), PowerState::Off);
        assert_eq!(PowerState::from_param(&json!(1)), PowerState::Off);
    }

    #[test]
    fn from_str_rejects_garbage() {
        assert!("maybe".parse::<PowerState>().is_err());
        assert_eq!("OFF".parse::<PowerState>().unwrap(), PowerState::Off);
    }
}
