// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publishing device state to the host.
//!
//! Every state fragment, whether pushed by the cloud or read from a LAN
//! advertisement, goes through [`DeltaPublisher::apply_update`]. It merges
//! the fragment into the device and returns the [`Delta`]s to publish:
//! metadata once per point, then the values the fragment touched.
//!
//! # Examples
//!
//! ```
//! use ewelink_bridge::config::BridgeSettings;
//! use ewelink_bridge::device::Device;
//! use ewelink_bridge::state::DeltaPublisher;
//! use serde_json::json;
//!
//! let mut device = Device::new("1000a1", "Deck", 1).with_params(json!({ "switch": "off" }));
//! let fragment = json!({ "switch": "on" }).as_object().cloned().unwrap();
//!
//! let mut publisher = DeltaPublisher::new();
//! let deltas = publisher.apply_update(&mut device, &fragment, &BridgeSettings::default());
//!
//! assert!(deltas[0].is_meta());
//! assert_eq!(deltas[1].value_of("electrical.switches.deck.state"), Some(&json!(1)));
//! ```

mod delta;
mod publisher;

pub use delta::{Delta, PathValue, Update};
pub use publisher::DeltaPublisher;
