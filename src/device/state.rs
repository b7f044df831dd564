// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed views over the raw `params` object of a device.
//!
//! The views are read-only snapshots; fields the device has not reported
//! are `None`.

use serde_json::{Map, Value};

use crate::types::{Brightness, LightMode, PowerState};

/// State of a single relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchState {
    /// Relay state.
    pub power: PowerState,
}

impl SwitchState {
    pub(crate) fn from_params(params: &Map<String, Value>) -> Self {
        Self {
            power: params
                .get("switch")
                .map_or(PowerState::Off, PowerState::from_param),
        }
    }
}

/// State of one bank outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutletState {
    /// Outlet number.
    pub outlet: u8,
    /// Relay state.
    pub power: PowerState,
}

/// State of a multi-outlet bank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BankState {
    /// Outlets in reporting order.
    pub outlets: Vec<OutletState>,
}

impl BankState {
    pub(crate) fn from_params(params: &Map<String, Value>) -> Self {
        Self::from_switches(params.get("switches"))
    }

    /// Reads a `switches` array, skipping entries without an outlet number.
    #[must_use]
    pub fn from_switches(switches: Option<&Value>) -> Self {
        let outlets = switches
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let outlet = u8::try_from(entry.get("outlet")?.as_u64()?).ok()?;
                        let power = entry
                            .get("switch")
                            .map_or(PowerState::Off, PowerState::from_param);
                        Some(OutletState { outlet, power })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { outlets }
    }

    /// Returns the state of one outlet.
    #[must_use]
    pub fn outlet(&self, outlet: u8) -> Option<PowerState> {
        self.outlets
            .iter()
            .find(|o| o.outlet == outlet)
            .map(|o| o.power)
    }
}

/// State of the L1 light strip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightState {
    /// Power.
    pub power: Option<PowerState>,
    /// Effect mode.
    pub mode: Option<LightMode>,
    /// Red component.
    pub red: Option<u8>,
    /// Green component.
    pub green: Option<u8>,
    /// Blue component.
    pub blue: Option<u8>,
    /// Brightness.
    pub brightness: Option<Brightness>,
    /// Effect speed.
    pub speed: Option<Value>,
    /// Music sync sensitivity.
    pub sensitive: Option<Value>,
    /// Light type reported by the strip.
    pub light_type: Option<Value>,
}

impl LightState {
    pub(crate) fn from_params(params: &Map<String, Value>) -> Self {
        let channel = |key: &str| {
            params
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok())
        };
        Self {
            power: params.get("switch").map(PowerState::from_param),
            mode: params
                .get("mode")
                .and_then(Value::as_u64)
                .and_then(LightMode::from_code),
            red: channel("colorR"),
            green: channel("colorG"),
            blue: channel("colorB"),
            brightness: params
                .get("bright")
                .and_then(Value::as_u64)
                .map(Brightness::new),
            speed: params.get("speed").cloned(),
            sensitive: params.get("sensitive").cloned(),
            light_type: params.get("light_type").cloned(),
        }
    }

    /// Returns the colour if all three components are known.
    #[must_use]
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        Some((self.red?, self.green?, self.blue?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn switch_view() {
        assert_eq!(
            SwitchState::from_params(&params(json!({ "switch": "on" }))).power,
            PowerState::On
        );
        assert_eq!(
            SwitchState::from_params(&params(json!({}))).power,
            PowerState::Off
        );
    }

    #[test]
    fn bank_view_skips_bad_entries() {
        let bank = BankState::from_params(&params(json!({
            "switches": [
                { "switch": "on", "outlet": 0 },
                { "switch": "on" },
                { "switch": "off", "outlet": 2 }
            ]
        })));
        assert_eq!(bank.outlets.len(), 2);
        assert_eq!(bank.outlet(0), Some(PowerState::On));
        assert_eq!(bank.outlet(2), Some(PowerState::Off));
        assert_eq!(bank.outlet(1), None);
    }

    #[test]
    fn light_view() {
        let light = LightState::from_params(&params(json!({
            "switch": "on",
            "mode": 2,
            "colorR": 255,
            "colorG": 128,
            "colorB": 0,
            "bright": 65,
            "speed": 50,
            "light_type": 1
        })));
        assert_eq!(light.power, Some(PowerState::On));
        assert_eq!(light.mode.map(|m| m.name()), Some("Colorful Gradient"));
        assert_eq!(light.rgb(), Some((255, 128, 0)));
        assert_eq!(light.brightness.map(|b| b.percent()), Some(65));
        assert_eq!(light.speed, Some(json!(50)));
        assert!(light.sensitive.is_none());
    }

    #[test]
    fn light_view_ignores_unknown_mode() {
        let light = LightState::from_params(&params(json!({ "mode": 40 })));
        assert!(light.mode.is_none());
        assert!(light.rgb().is_none());
    }
}
