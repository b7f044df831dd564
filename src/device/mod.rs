// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! eWeLink devices and the registry that holds them.
//!
//! A [`Device`] is kept in the shape the cloud listing returns it, so the
//! device cache is a plain array of listing entries. Its `params` object is
//! the merged device state: LAN advertisements and cloud pushes are merged
//! into it field by field.
//!
//! What a device can do is decided once by [`Device::capability`]:
//!
//! | Capability | Detected by |
//! |------------|-------------|
//! | [`Capability::Light`] | UIID 59 (L1 light strip) |
//! | [`Capability::Bank`] | `params.switches` array |
//! | [`Capability::Switch`] | `params.switch` value |
//!
//! Devices with none of these (sensors, cameras) are kept in the registry
//! but never published.

mod registry;
mod state;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use registry::DeviceRegistry;
pub use state::{BankState, LightState, OutletState, SwitchState};

/// UIID of the L1 dimmable colour light strip.
pub const L1_LIGHT_UIID: u32 = 59;

/// UIIDs of hardware that only accepts commands through the cloud.
pub const CLOUD_ONLY_UIIDS: &[u32] = &[L1_LIGHT_UIID];

/// A device as listed by the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Vendor device id.
    #[serde(rename = "deviceid")]
    pub id: String,
    /// Name given in the vendor app.
    #[serde(default)]
    pub name: String,
    /// Per-device secret; its MD5 is the LAN payload key.
    #[serde(rename = "devicekey", default)]
    pub device_key: String,
    /// API key of the owning account.
    #[serde(default)]
    pub apikey: String,
    /// Hardware description.
    #[serde(default)]
    pub extra: DeviceExtra,
    /// User tags, including outlet names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<DeviceTags>,
    /// Merged device state.
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Hardware description of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceExtra {
    /// Hardware model identifier.
    #[serde(default)]
    pub uiid: u32,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// User tags of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTags {
    /// Outlet names keyed by outlet number as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ck_channel_name: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// What kind of points a device publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// A single relay.
    Switch,
    /// A multi-outlet bank; the outlets are listed in reporting order.
    Bank {
        /// Outlet numbers.
        outlets: Vec<u8>,
    },
    /// The L1 dimmable colour light strip.
    Light,
}

impl Device {
    /// Creates a device with empty state.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, uiid: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_key: String::new(),
            apikey: String::new(),
            extra: DeviceExtra {
                uiid,
                other: Map::new(),
            },
            tags: None,
            params: Map::new(),
            other: Map::new(),
        }
    }

    /// Sets the device key.
    #[must_use]
    pub fn with_device_key(mut self, key: impl Into<String>) -> Self {
        self.device_key = key.into();
        self
    }

    /// Sets the owner API key.
    #[must_use]
    pub fn with_apikey(mut self, apikey: impl Into<String>) -> Self {
        self.apikey = apikey.into();
        self
    }

    /// Replaces the device state.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.params = map;
        }
        self
    }

    /// Sets the vendor name of one outlet.
    #[must_use]
    pub fn with_outlet_name(mut self, outlet: u8, name: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(DeviceTags::default)
            .ck_channel_name
            .get_or_insert_with(BTreeMap::new)
            .insert(outlet.to_string(), name.into());
        self
    }

    /// Hardware model identifier.
    #[must_use]
    pub fn uiid(&self) -> u32 {
        self.extra.uiid
    }

    /// Returns true for hardware that cannot be driven over the LAN.
    #[must_use]
    pub fn is_cloud_only(&self) -> bool {
        CLOUD_ONLY_UIIDS.contains(&self.extra.uiid)
    }

    /// Classifies the device, or returns `None` if it has no switchable point.
    #[must_use]
    pub fn capability(&self) -> Option<Capability> {
        if let Some(Value::Array(switches)) = self.params.get("switches") {
            let outlets = switches
                .iter()
                .filter_map(|entry| entry.get("outlet")?.as_u64())
                .filter_map(|outlet| u8::try_from(outlet).ok())
                .collect();
            return Some(Capability::Bank { outlets });
        }
        if !self.params.contains_key("switch") {
            return None;
        }
        if self.extra.uiid == L1_LIGHT_UIID {
            Some(Capability::Light)
        } else {
            Some(Capability::Switch)
        }
    }

    /// Vendor name of an outlet, if the user named it in the app.
    #[must_use]
    pub fn outlet_name(&self, outlet: u8) -> Option<&str> {
        self.tags
            .as_ref()?
            .ck_channel_name
            .as_ref()?
            .get(&outlet.to_string())
            .map(String::as_str)
    }

    /// Shallow-merges a state fragment: each top-level key of the fragment
    /// replaces the stored value.
    pub fn merge_params(&mut self, fragment: &Map<String, Value>) {
        for (key, value) in fragment {
            self.params.insert(key.clone(), value.clone());
        }
    }

    /// Typed view of a single switch.
    #[must_use]
    pub fn switch_state(&self) -> SwitchState {
        SwitchState::from_params(&self.params)
    }

    /// Typed view of a bank.
    #[must_use]
    pub fn bank_state(&self) -> BankState {
        BankState::from_params(&self.params)
    }

    /// Typed view of a light.
    #[must_use]
    pub fn light_state(&self) -> LightState {
        LightState::from_params(&self.params)
    }
}
