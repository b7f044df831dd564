// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The set of known devices.

use std::path::Path;

use crate::error::Result;
use crate::persist;

use super::Device;

/// Known devices in cloud listing order.
///
/// The registry is populated from the cloud listing at start-up, or from the
/// device cache when the cloud cannot be reached.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `devices`.
    #[must_use]
    pub fn from_devices(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// Loads the device cache.
    ///
    /// A missing or unreadable cache yields an empty registry.
    #[must_use]
    pub fn load_cache(path: &Path) -> Self {
        let devices: Vec<Device> = persist::load_json(path).unwrap_or_default();
        tracing::debug!(count = devices.len(), "Loaded device cache");
        Self { devices }
    }

    /// Writes the registry to the device cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn save_cache(&self, path: &Path) -> Result<()> {
        persist::save_json(path, &self.devices)
    }

    /// Replaces every device with a fresh listing.
    ///
    /// Devices missing from the listing are dropped; their ids are returned.
    pub fn replace_all(&mut self, devices: Vec<Device>) -> Vec<String> {
        let dropped: Vec<String> = self
            .devices
            .iter()
            .filter(|old| !devices.iter().any(|new| new.id == old.id))
            .map(|old| old.id.clone())
            .collect();
        for id in &dropped {
            tracing::info!(device_id = %id, "Device no longer listed, dropping");
        }
        self.devices = devices;
        dropped
    }

    /// Returns a device by id.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    /// Returns a mutable device by id.
    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == device_id)
    }

    /// Iterates over the devices in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no device is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// API key of the account, taken from the first device.
    #[must_use]
    pub fn user_apikey(&self) -> Option<&str> {
        self.devices
            .first()
            .map(|d| d.apikey.as_str())
            .filter(|key| !key.is_empty())
    }
}
