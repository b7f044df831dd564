// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the device views, commands and the publisher.
//!
//! - [`PowerState`] - on/off for switches, outlets and lights
//! - [`LightMode`] - the twelve light strip effect modes
//! - [`Brightness`] - light brightness percentage and its host dimming level

mod light;
mod power;

pub use light::{Brightness, LightMode};
pub use power::PowerState;
