// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Merging state fragments and computing what to publish.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::config::paths::{outlet_path, switch_path};
use crate::config::{BridgeSettings, Preset};
use crate::device::{Capability, Device, LightState};
use crate::types::{LightMode, PowerState};

use super::delta::{Delta, PathValue};

/// Light parameters published under their own key.
const PASSTHROUGH_KEYS: [&str; 6] = [
    "colorR",
    "colorG",
    "colorB",
    "speed",
    "sensitive",
    "light_type",
];

/// Turns state fragments into host deltas.
///
/// Remembers which paths already had their metadata published; the gate
/// lives as long as the publisher. Points that appear later (a bank outlet
/// enabled after start, a device first listed without state) get their
/// metadata with their first values.
#[derive(Debug, Default)]
pub struct DeltaPublisher {
    meta_sent: HashSet<String>,
}

impl DeltaPublisher {
    /// Creates a publisher with no metadata sent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if metadata was published for `path`.
    #[must_use]
    pub fn meta_sent(&self, path: &str) -> bool {
        self.meta_sent.contains(path)
    }

    /// Forgets every metadata gate.
    pub fn reset(&mut self) {
        self.meta_sent.clear();
    }

    /// Merges `fragment` into the device and returns the deltas to publish,
    /// metadata first.
    ///
    /// The merge always happens. Deltas are only produced for enabled
    /// devices, and values only for enabled outlets.
    pub fn apply_update(
        &mut self,
        device: &mut Device,
        fragment: &Map<String, Value>,
        settings: &BridgeSettings,
    ) -> Vec<Delta> {
        device.merge_params(fragment);

        if !settings.is_device_enabled(&device.id) {
            tracing::trace!(device = %device.id, "Device disabled, state merged silently");
            return Vec::new();
        }

        let mut deltas = Vec::new();
        let meta: Vec<PathValue> = meta_for(device, settings)
            .into_iter()
            .filter(|entry| !self.meta_sent.contains(&entry.path))
            .collect();
        if !meta.is_empty() {
            tracing::debug!(device = %device.id, entries = meta.len(), "Publishing metadata");
            self.meta_sent
                .extend(meta.iter().map(|entry| entry.path.clone()));
            deltas.push(Delta::meta(meta));
        }

        let values = values_for(device, fragment, settings);
        if !values.is_empty() {
            deltas.push(Delta::values(values));
        }
        deltas
    }
}

fn meta_for(device: &Device, settings: &BridgeSettings) -> Vec<PathValue> {
    let device_settings = settings.device(&device.id);
    let mut meta = Vec::new();

    match device.capability() {
        Some(Capability::Bank { outlets }) => {
            for outlet in outlets {
                if !settings.is_outlet_enabled(&device.id, outlet) {
                    continue;
                }
                let outlet_settings = settings.outlet(&device.id, outlet);
                let mut value = Map::new();
                value.insert(
                    "displayName".to_string(),
                    json!(
                        outlet_settings
                            .and_then(|o| o.display_name.clone())
                            .unwrap_or_else(|| device.name.clone())
                    ),
                );
                if let Some(abbrev) = outlet_settings.and_then(|o| o.abbrev.clone()) {
                    value.insert("abbrev".to_string(), json!(abbrev));
                }
                value.insert("order".to_string(), json!(outlet));

                meta.push(PathValue::new(
                    outlet_path(device, settings, outlet, Some("state")),
                    Value::Object(value.clone()),
                ));
                meta.push(PathValue::new(
                    outlet_path(device, settings, outlet, None),
                    Value::Object(value),
                ));
            }
        }
        Some(capability @ (Capability::Switch | Capability::Light)) => {
            let display_name = device_settings
                .display_name
                .clone()
                .unwrap_or_else(|| device.name.clone());
            let mut value = Map::new();

            if capability == Capability::Light {
                value.insert("type".to_string(), json!("dimmer"));
                value.insert("canDimWhenOff".to_string(), json!(true));
                meta.push(PathValue::new(
                    switch_path(device, settings, Some("mode")),
                    enumeration(LightMode::NAMES.iter().copied()),
                ));
                if !device_settings.presets.is_empty() {
                    let mut preset_meta =
                        enumeration(device_settings.presets.iter().map(|p| p.name.as_str()));
                    preset_meta["displayName"] = json!(display_name);
                    meta.push(PathValue::new(
                        switch_path(device, settings, Some("preset")),
                        preset_meta,
                    ));
                }
            }

            value.insert("displayName".to_string(), json!(display_name));
            if let Some(abbrev) = &device_settings.abbrev {
                value.insert("abbrev".to_string(), json!(abbrev));
            }
            meta.push(PathValue::new(
                switch_path(device, settings, Some("state")),
                Value::Object(value.clone()),
            ));
            meta.push(PathValue::new(
                switch_path(device, settings, None),
                Value::Object(value),
            ));
        }
        None => {}
    }

    meta
}

fn enumeration<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Value {
    let possible: Vec<Value> = names
        .clone()
        .map(|name| json!({ "title": name, "value": name }))
        .collect();
    let names: Vec<&str> = names.collect();
    json!({ "enum": names, "possibleValues": possible })
}

fn values_for(
    device: &Device,
    fragment: &Map<String, Value>,
    settings: &BridgeSettings,
) -> Vec<PathValue> {
    let mut values = Vec::new();

    if fragment.contains_key("switches") {
        let merged = device.bank_state();
        let reported = crate::device::BankState::from_switches(fragment.get("switches"));
        for outlet in reported.outlets.iter().map(|o| o.outlet) {
            if !settings.is_outlet_enabled(&device.id, outlet) {
                continue;
            }
            let power = merged.outlet(outlet).unwrap_or(PowerState::Off);
            values.push(PathValue::new(
                outlet_path(device, settings, outlet, Some("state")),
                power.as_num(),
            ));
            values.push(PathValue::new(
                outlet_path(device, settings, outlet, Some("order")),
                outlet,
            ));
        }
        return values;
    }

    if fragment.contains_key("switch") {
        values.push(PathValue::new(
            switch_path(device, settings, Some("state")),
            device.switch_state().power.as_num(),
        ));
    }

    if device.capability() == Some(Capability::Light) {
        light_values(device, fragment, settings, &mut values);
    }

    values
}

fn light_values(
    device: &Device,
    fragment: &Map<String, Value>,
    settings: &BridgeSettings,
    values: &mut Vec<PathValue>,
) {
    let state = device.light_state();

    if fragment.contains_key("mode")
        && let Some(mode) = state.mode
    {
        values.push(PathValue::new(
            switch_path(device, settings, Some("mode")),
            mode.name(),
        ));
    }

    for key in PASSTHROUGH_KEYS {
        if fragment.contains_key(key)
            && let Some(value) = device.params.get(key)
        {
            values.push(PathValue::new(
                switch_path(device, settings, Some(key)),
                value.clone(),
            ));
        }
    }

    if fragment.contains_key("bright")
        && let Some(brightness) = state.brightness
    {
        values.push(PathValue::new(
            switch_path(device, settings, Some("dimmingLevel")),
            brightness.level(),
        ));
    }

    let presets = &settings.device(&device.id).presets;
    if !presets.is_empty() {
        let name = matching_preset(presets, &state).map_or("Unknown", |p| p.name.as_str());
        values.push(PathValue::new(
            switch_path(device, settings, Some("preset")),
            name,
        ));
    }
}

/// First preset whose colour, and brightness unless it ignores brightness,
/// equals the light state.
fn matching_preset<'a>(presets: &'a [Preset], state: &LightState) -> Option<&'a Preset> {
    let rgb = state.rgb()?;
    presets.iter().find(|preset| {
        rgb == (preset.red, preset.green, preset.blue)
            && (preset.is_brightness_agnostic()
                || state.brightness.map(|b| b.percent()) == Some(preset.bright))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{DeviceSettings, OutletSettings};
    use crate::device::L1_LIGHT_UIID;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn switch_on_publishes_state_after_meta() {
        let mut device = Device::new("A1", "Anchor Light", 1).with_params(json!({ "switch": "off" }));
        let settings = BridgeSettings::default();
        let mut publisher = DeltaPublisher::new();

        let deltas =
            publisher.apply_update(&mut device, &object(json!({ "switch": "on" })), &settings);
        assert_eq!(deltas.len(), 2);
        assert!(deltas[0].is_meta());
        assert_eq!(
            deltas[0]
                .iter_meta()
                .find(|m| m.path == "electrical.switches.anchorLight.state")
                .map(|m| m.value.clone()),
            Some(json!({ "displayName": "Anchor Light" }))
        );
        assert_eq!(
            deltas[1].value_of("electrical.switches.anchorLight.state"),
            Some(&json!(1))
        );

        let deltas =
            publisher.apply_update(&mut device, &object(json!({ "switch": "off" })), &settings);
        assert_eq!(deltas.len(), 1);
        assert_eq!(
            deltas[0].value_of("electrical.switches.anchorLight.state"),
            Some(&json!(0))
        );
    }

    #[test]
    fn brightness_becomes_dimming_level() {
        let mut device = Device::new("L1", "Saloon", L1_LIGHT_UIID)
            .with_params(json!({ "switch": "on", "bright": 100 }));
        let settings = BridgeSettings::default();
        let mut publisher = DeltaPublisher::new();

        let deltas = publisher.apply_update(&mut device, &object(json!({ "bright": 50 })), &settings);
        let values = deltas.last().unwrap();
        assert_eq!(
            values.value_of("electrical.switches.saloon.dimmingLevel"),
            Some(&json!(0.5))
        );
        assert!(values.value_of("electrical.switches.saloon.state").is_none());
    }

    #[test]
    fn light_meta_has_dimmer_and_mode_enum() {
        let mut device =
            Device::new("L1", "Saloon", L1_LIGHT_UIID).with_params(json!({ "switch": "on" }));
        let mut publisher = DeltaPublisher::new();
        let deltas = publisher.apply_update(&mut device, &Map::new(), &BridgeSettings::default());

        let meta = &deltas[0];
        let node = meta
            .iter_meta()
            .find(|m| m.path == "electrical.switches.saloon")
            .unwrap();
        assert_eq!(node.value["type"], json!("dimmer"));
        assert_eq!(node.value["canDimWhenOff"], json!(true));
        let mode = meta
            .iter_meta()
            .find(|m| m.path == "electrical.switches.saloon.mode")
            .unwrap();
        assert_eq!(mode.value["enum"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn light_mode_and_colour() {
        let mut device =
            Device::new("L1", "Saloon", L1_LIGHT_UIID).with_params(json!({ "switch": "on" }));
        let mut publisher = DeltaPublisher::new();
        let deltas = publisher.apply_update(
            &mut device,
            &object(json!({ "mode": 2, "colorR": 10, "speed": 50 })),
            &BridgeSettings::default(),
        );
        let values = deltas.last().unwrap();
        assert_eq!(
            values.value_of("electrical.switches.saloon.mode"),
            Some(&json!("Colorful Gradient"))
        );
        assert_eq!(values.value_of("electrical.switches.saloon.colorR"), Some(&json!(10)));
        assert_eq!(values.value_of("electrical.switches.saloon.speed"), Some(&json!(50)));
        assert!(values.value_of("electrical.switches.saloon.colorG").is_none());
    }

    fn warm_settings() -> BridgeSettings {
        BridgeSettings::default().with_device(
            "L1",
            DeviceSettings {
                presets: vec![Preset {
                    name: "Warm".to_string(),
                    red: 255,
                    green: 200,
                    blue: 150,
                    bright: 80,
                }],
                ..DeviceSettings::default()
            },
        )
    }

    #[test]
    fn preset_matches_or_unknown() {
        let settings = warm_settings();
        let mut device = Device::new("L1", "Saloon", L1_LIGHT_UIID).with_params(json!({
            "switch": "on", "colorR": 255, "colorG": 200, "colorB": 150, "bright": 70
        }));
        let mut publisher = DeltaPublisher::new();

        let deltas = publisher.apply_update(&mut device, &object(json!({ "bright": 80 })), &settings);
        assert_eq!(
            deltas.last().unwrap().value_of("electrical.switches.saloon.preset"),
            Some(&json!("Warm"))
        );

        let deltas = publisher.apply_update(&mut device, &object(json!({ "colorB": 149 })), &settings);
        assert_eq!(
            deltas[0].value_of("electrical.switches.saloon.preset"),
            Some(&json!("Unknown"))
        );
    }

    #[test]
    fn disabled_outlet_excluded() {
        let settings = BridgeSettings::default().with_device(
            "B1",
            DeviceSettings {
                outlets: [(
                    2,
                    OutletSettings {
                        enabled: false,
                        ..OutletSettings::default()
                    },
                )]
                .into_iter()
                .collect(),
                ..DeviceSettings::default()
            },
        );
        let mut device = Device::new("B1", "Panel", 4).with_params(json!({
            "switches": [{ "outlet": 1, "switch": "off" }, { "outlet": 2, "switch": "off" }]
        }));
        let mut publisher = DeltaPublisher::new();

        let deltas = publisher.apply_update(
            &mut device,
            &object(json!({
                "switches": [{ "outlet": 1, "switch": "on" }, { "outlet": 2, "switch": "on" }]
            })),
            &settings,
        );
        let meta = &deltas[0];
        assert!(meta.iter_meta().all(|m| !m.path.starts_with("electrical.switches.panel.2")));
        let values = &deltas[1];
        assert_eq!(values.value_of("electrical.switches.panel.1.state"), Some(&json!(1)));
        assert_eq!(values.value_of("electrical.switches.panel.1.order"), Some(&json!(1)));
        assert_eq!(values.iter_values().count(), 2);
        assert_eq!(device.bank_state().outlet(2), Some(PowerState::On));
    }

    #[test]
    fn disabled_device_merges_silently() {
        let settings = BridgeSettings::default().with_device(
            "A1",
            DeviceSettings {
                enabled: false,
                ..DeviceSettings::default()
            },
        );
        let mut device = Device::new("A1", "Anchor", 1).with_params(json!({ "switch": "off" }));
        let mut publisher = DeltaPublisher::new();

        let deltas =
            publisher.apply_update(&mut device, &object(json!({ "switch": "on" })), &settings);
        assert!(deltas.is_empty());
        assert!(!publisher.meta_sent("electrical.switches.anchor.state"));
        assert_eq!(device.switch_state().power, PowerState::On);
    }

    #[test]
    fn meta_follows_first_classifiable_state() {
        let settings = BridgeSettings::default();
        let mut device = Device::new("A1", "Anchor", 1);
        let mut publisher = DeltaPublisher::new();

        assert!(publisher.apply_update(&mut device, &Map::new(), &settings).is_empty());

        let deltas =
            publisher.apply_update(&mut device, &object(json!({ "switch": "on" })), &settings);
        assert_eq!(deltas.len(), 2);
        assert!(deltas[0].is_meta());
        assert!(publisher.meta_sent("electrical.switches.anchor.state"));
        assert_eq!(
            deltas[1].value_of("electrical.switches.anchor.state"),
            Some(&json!(1))
        );
    }

    #[test]
    fn outlet_enabled_later_gets_meta() {
        let disabled = BridgeSettings::default().with_device(
            "B1",
            DeviceSettings {
                outlets: [(
                    2,
                    OutletSettings {
                        enabled: false,
                        ..OutletSettings::default()
                    },
                )]
                .into_iter()
                .collect(),
                ..DeviceSettings::default()
            },
        );
        let mut device = Device::new("B1", "Panel", 4).with_params(json!({
            "switches": [{ "outlet": 1, "switch": "off" }, { "outlet": 2, "switch": "off" }]
        }));
        let mut publisher = DeltaPublisher::new();
        publisher.apply_update(&mut device, &Map::new(), &disabled);
        assert!(!publisher.meta_sent("electrical.switches.panel.2.state"));

        let fragment = object(json!({ "switches": [{ "outlet": 2, "switch": "on" }] }));
        let deltas = publisher.apply_update(&mut device, &fragment, &BridgeSettings::default());

        assert_eq!(deltas.len(), 2);
        assert!(deltas[0].iter_meta().all(|m| m.path.starts_with("electrical.switches.panel.2")));
        assert_eq!(
            deltas[1].value_of("electrical.switches.panel.2.state"),
            Some(&json!(1))
        );
    }

    #[test]
    fn nothing_to_publish() {
        let settings = BridgeSettings::default();
        let mut device = Device::new("A1", "Anchor", 1).with_params(json!({ "switch": "off" }));
        let mut publisher = DeltaPublisher::new();
        publisher.apply_update(&mut device, &Map::new(), &settings);

        let deltas = publisher.apply_update(&mut device, &object(json!({ "rssi": -60 })), &settings);
        assert!(deltas.is_empty());
    }
}
