// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host path naming.
//!
//! Points live under `electrical.switches`:
//!
//! - switch or light: `electrical.switches.<switchPath | camelCase(name)>.<key>`
//! - bank outlet: `electrical.switches.<bankPath | camelCase(name)>.<outlet segment>.<key>`
//!
//! The outlet segment is the outlet's `switchPath`, else the camel-cased
//! vendor outlet name, else the outlet number.

use crate::device::Device;

use super::BridgeSettings;

/// Root of every published path.
pub const ROOT: &str = "electrical.switches";

/// Path of a switch or light point. `None` names the device node itself.
#[must_use]
pub fn switch_path(device: &Device, settings: &BridgeSettings, key: Option<&str>) -> String {
    let segment = settings
        .device(&device.id)
        .switch_path
        .clone()
        .unwrap_or_else(|| camel_case(&device.name));
    join(&[ROOT, &segment], key)
}

/// Path of a bank outlet point. `None` names the outlet node itself.
#[must_use]
pub fn outlet_path(
    device: &Device,
    settings: &BridgeSettings,
    outlet: u8,
    key: Option<&str>,
) -> String {
    let bank = settings
        .device(&device.id)
        .bank_path
        .clone()
        .unwrap_or_else(|| camel_case(&device.name));
    let outlet_segment = settings
        .outlet(&device.id, outlet)
        .and_then(|o| o.switch_path.clone())
        .or_else(|| device.outlet_name(outlet).map(camel_case))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| outlet.to_string());
    join(&[ROOT, &bank, &outlet_segment], key)
}

fn join(segments: &[&str], key: Option<&str>) -> String {
    let mut path = segments.join(".");
    if let Some(key) = key {
        path.push('.');
        path.push_str(key);
    }
    path
}

/// Converts a display name to lower camel case.
///
/// Words are split at every non-alphanumeric character and at lower-to-upper
/// case changes.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::config::paths::camel_case;
///
/// assert_eq!(camel_case("Deck Lights"), "deckLights");
/// assert_eq!(camel_case("bilge-pump 2"), "bilgePump2");
/// assert_eq!(camel_case("NAV lights"), "navLights");
/// assert_eq!(camel_case("anchorLight"), "anchorLight");
/// ```
#[must_use]
pub fn camel_case(input: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in input.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
