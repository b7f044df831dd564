// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! - [`BridgeSettings`] - the user settings persisted by the host
//! - [`AuthInfo`] - cloud credentials embedded in the settings
//! - [`BridgeOptions`] - runtime tunables such as timeouts and cache files
//! - [`paths`] - host path naming derived from the settings

mod auth;
mod options;
pub mod paths;
mod settings;

pub use auth::{AuthInfo, DEFAULT_ACCESS_TTL_MS, DEFAULT_REFRESH_TTL_MS, TokenGrant};
pub use options::{BridgeOptions, DEFAULT_APP_ID, ReconnectionPolicy};
pub use settings::{BridgeSettings, DeviceSettings, OutletSettings, Preset};
