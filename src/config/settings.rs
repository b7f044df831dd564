// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plugin settings as stored by the host.
//!
//! The host persists the settings as one JSON object. Per-device sections
//! live under `"Device ID <id>"` keys and per-outlet sections under
//! `"Channel <n>"` keys inside them. Those string keys are resolved once,
//! here, into maps keyed by device id and outlet number.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

use super::AuthInfo;

const DEVICE_KEY_PREFIX: &str = "Device ID ";
const OUTLET_KEY_PREFIX: &str = "Channel ";

/// A snapshot of the plugin settings.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::config::BridgeSettings;
/// use serde_json::json;
///
/// let settings = BridgeSettings::from_value(&json!({
///     "lanMode": false,
///     "Device ID 1000abc": {
///         "enabled": true,
///         "bankPath": "galley",
///         "Channel 1": { "enabled": false }
///     }
/// }))
/// .unwrap();
///
/// assert!(!settings.lan_mode);
/// assert!(settings.is_device_enabled("1000abc"));
/// assert!(!settings.is_outlet_enabled("1000abc", 1));
/// assert!(settings.is_outlet_enabled("1000abc", 0));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeSettings {
    /// Raw `authInfo` text, parsed on demand by [`Self::auth_info`].
    auth_info: Option<String>,
    /// Whether LAN transport may be used.
    pub lan_mode: bool,
    /// Family (home) whose devices are listed.
    pub family: Option<String>,
    devices: HashMap<String, DeviceSettings>,
    fallback: DeviceSettings,
}

impl BridgeSettings {
    /// Parses a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is not an object or a device
    /// or outlet section cannot be interpreted.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut devices = HashMap::new();
        for (key, section) in raw.rest {
            let Some(device_id) = key.strip_prefix(DEVICE_KEY_PREFIX) else {
                continue;
            };
            let settings = DeviceSettings::from_section(&key, section)?;
            devices.insert(device_id.to_string(), settings);
        }

        Ok(Self {
            auth_info: raw.auth_info.filter(|s| !s.trim().is_empty()),
            lan_mode: raw.lan_mode,
            family: raw.family.filter(|s| !s.is_empty()),
            devices,
            fallback: DeviceSettings::default(),
        })
    }

    /// Parses the embedded authentication info.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingAuthInfo`] when absent and
    /// [`ConfigError::MalformedAuthInfo`] when it cannot be parsed.
    pub fn auth_info(&self) -> Result<AuthInfo, ConfigError> {
        let raw = self
            .auth_info
            .as_deref()
            .ok_or(ConfigError::MissingAuthInfo)?;
        AuthInfo::parse(raw)
    }

    /// Replaces the embedded authentication info, e.g. after a token refresh.
    pub fn set_auth_info(&mut self, auth: &AuthInfo) {
        self.auth_info = Some(auth.to_json_pretty());
    }

    /// Returns the settings for a device, or the defaults if it has none.
    #[must_use]
    pub fn device(&self, device_id: &str) -> &DeviceSettings {
        self.devices.get(device_id).unwrap_or(&self.fallback)
    }

    /// Returns the settings for one outlet of a bank, if configured.
    #[must_use]
    pub fn outlet(&self, device_id: &str, outlet: u8) -> Option<&OutletSettings> {
        self.devices
            .get(device_id)
            .and_then(|device| device.outlets.get(&outlet))
    }

    /// Returns whether the device is enabled (default: enabled).
    #[must_use]
    pub fn is_device_enabled(&self, device_id: &str) -> bool {
        self.device(device_id).enabled
    }

    /// Returns whether one outlet of a bank is enabled (default: enabled).
    #[must_use]
    pub fn is_outlet_enabled(&self, device_id: &str, outlet: u8) -> bool {
        self.outlet(device_id, outlet).is_none_or(|o| o.enabled)
    }

    /// Adds or replaces the section of one device.
    #[must_use]
    pub fn with_device(mut self, device_id: impl Into<String>, settings: DeviceSettings) -> Self {
        self.devices.insert(device_id.into(), settings);
        self
    }

    /// Sets the raw authentication info text.
    #[must_use]
    pub fn with_auth_info(mut self, raw: impl Into<String>) -> Self {
        self.auth_info = Some(raw.into());
        self
    }

    /// Enables or disables LAN transport.
    #[must_use]
    pub fn with_lan_mode(mut self, enabled: bool) -> Self {
        self.lan_mode = enabled;
        self
    }
}

/// Settings of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Whether the device is published and controllable.
    pub enabled: bool,
    /// Display name for metadata; defaults to the device name.
    pub display_name: Option<String>,
    /// Abbreviated name for metadata.
    pub abbrev: Option<String>,
    /// Path segment for single switches and lights.
    pub switch_path: Option<String>,
    /// Path segment for the bank of a multi-outlet device.
    pub bank_path: Option<String>,
    /// Always use the cloud for this device, even in LAN mode.
    pub force_cloud_mode: bool,
    /// Named colour presets (lights only).
    pub presets: Vec<Preset>,
    /// Per-outlet sections keyed by outlet number.
    pub outlets: BTreeMap<u8, OutletSettings>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            display_name: None,
            abbrev: None,
            switch_path: None,
            bank_path: None,
            force_cloud_mode: false,
            presets: Vec::new(),
            outlets: BTreeMap::new(),
        }
    }
}

impl DeviceSettings {
    fn from_section(key: &str, section: Value) -> Result<Self, ConfigError> {
        let raw: RawDeviceSettings =
            serde_json::from_value(section).map_err(|e| ConfigError::InvalidKey {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let mut outlets = BTreeMap::new();
        for (outlet_key, outlet_section) in raw.rest {
            let Some(number) = outlet_key.strip_prefix(OUTLET_KEY_PREFIX) else {
                continue;
            };
            let outlet: u8 = number.trim().parse().map_err(|_| ConfigError::InvalidKey {
                key: format!("{key} / {outlet_key}"),
                message: "outlet is not a number".to_string(),
            })?;
            let settings: RawOutletSettings = serde_json::from_value(outlet_section)
                .map_err(|e| ConfigError::InvalidKey {
                    key: format!("{key} / {outlet_key}"),
                    message: e.to_string(),
                })?;
            outlets.insert(outlet, settings.into());
        }

        Ok(Self {
            enabled: raw.enabled.unwrap_or(true),
            display_name: non_empty(raw.display_name),
            abbrev: non_empty(raw.abbrev),
            switch_path: non_empty(raw.switch_path),
            bank_path: non_empty(raw.bank_path),
            force_cloud_mode: raw.force_cloud_mode,
            presets: raw.presets,
            outlets,
        })
    }
}

/// Settings of one outlet of a multi-outlet device.
#[derive(Debug, Clone, PartialEq)]
pub struct OutletSettings {
    /// Whether the outlet is published and controllable.
    pub enabled: bool,
    /// Display name for metadata.
    pub display_name: Option<String>,
    /// Abbreviated name for metadata.
    pub abbrev: Option<String>,
    /// Path segment for the outlet.
    pub switch_path: Option<String>,
}

impl Default for OutletSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            display_name: None,
            abbrev: None,
            switch_path: None,
        }
    }
}

/// A named light colour preset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Preset {
    /// Preset name published to the host.
    pub name: String,
    /// Red component.
    #[serde(rename = "colorR", default = "full_channel")]
    pub red: u8,
    /// Green component.
    #[serde(rename = "colorG", default = "full_channel")]
    pub green: u8,
    /// Blue component.
    #[serde(rename = "colorB", default = "full_channel")]
    pub blue: u8,
    /// Brightness 1-100; 0 keeps the current brightness and matches any.
    #[serde(default = "full_brightness")]
    pub bright: u8,
}

impl Preset {
    /// Returns true if the preset ignores brightness.
    #[must_use]
    pub fn is_brightness_agnostic(&self) -> bool {
        self.bright == 0
    }
}

fn full_channel() -> u8 {
    255
}

fn full_brightness() -> u8 {
    100
}

fn default_true() -> bool {
    true
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    auth_info: Option<String>,
    #[serde(default = "default_true")]
    lan_mode: bool,
    family: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeviceSettings {
    enabled: Option<bool>,
    display_name: Option<String>,
    abbrev: Option<String>,
    switch_path: Option<String>,
    bank_path: Option<String>,
    #[serde(default)]
    force_cloud_mode: bool,
    #[serde(default)]
    presets: Vec<Preset>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutletSettings {
    enabled: Option<bool>,
    display_name: Option<String>,
    abbrev: Option<String>,
    switch_path: Option<String>,
}

impl From<RawOutletSettings> for OutletSettings {
    fn from(raw: RawOutletSettings) -> Self {
        Self {
            enabled: raw.enabled.unwrap_or(true),
            display_name: non_empty(raw.display_name),
            abbrev: non_empty(raw.abbrev),
            switch_path: non_empty(raw.switch_path),
        }
    }
}
