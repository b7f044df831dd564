// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Writable paths and what they control.

use std::collections::BTreeMap;

use crate::command::{CommandKind, LIGHT_PARAM_KEYS};
use crate::config::BridgeSettings;
use crate::config::paths::{outlet_path, switch_path};
use crate::device::{Capability, DeviceRegistry};

/// Target of a writable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Device the path belongs to.
    pub device_id: String,
    /// What writing the path does.
    pub kind: CommandKind,
}

/// Every writable path of the enabled devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<String, Route>,
}

impl RouteTable {
    /// Builds the table for the devices in `registry`.
    ///
    /// Disabled devices and outlets get no routes; devices without a
    /// switchable point are skipped.
    #[must_use]
    pub fn build(registry: &DeviceRegistry, settings: &BridgeSettings) -> Self {
        let mut table = Self::default();

        for device in registry.iter() {
            if !settings.is_device_enabled(&device.id) {
                continue;
            }
            let mut add = |path: String, kind: CommandKind| {
                table.routes.insert(
                    path,
                    Route {
                        device_id: device.id.clone(),
                        kind,
                    },
                );
            };

            match device.capability() {
                Some(Capability::Switch) => {
                    add(switch_path(device, settings, Some("state")), CommandKind::Power);
                }
                Some(Capability::Light) => {
                    add(switch_path(device, settings, Some("state")), CommandKind::Power);
                    add(switch_path(device, settings, Some("mode")), CommandKind::Mode);
                    add(
                        switch_path(device, settings, Some("dimmingLevel")),
                        CommandKind::DimmingLevel,
                    );
                    if !settings.device(&device.id).presets.is_empty() {
                        add(switch_path(device, settings, Some("preset")), CommandKind::Preset);
                    }
                    for key in LIGHT_PARAM_KEYS {
                        add(switch_path(device, settings, Some(key)), CommandKind::Param(key));
                    }
                }
                Some(Capability::Bank { outlets }) => {
                    for outlet in outlets {
                        if settings.is_outlet_enabled(&device.id, outlet) {
                            add(
                                outlet_path(device, settings, outlet, Some("state")),
                                CommandKind::OutletPower(outlet),
                            );
                        }
                    }
                }
                None => {}
            }
        }

        tracing::debug!(count = table.routes.len(), "Built command routes");
        table
    }

    /// Looks up a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    /// Iterates over the paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no path is writable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
