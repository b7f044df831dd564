// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The vessel-data host the bridge publishes into.

use crate::config::AuthInfo;
use crate::state::Delta;

/// Services the host provides to the bridge.
///
/// Calls are made from bridge tasks and must not block for long.
pub trait Host: Send + Sync {
    /// Publishes a value or metadata delta.
    fn publish(&self, delta: Delta);

    /// Shows an error to the user (plugin status line).
    fn report_error(&self, message: &str);

    /// Shows a status message to the user.
    fn report_status(&self, message: &str);

    /// Announces that the bridge accepts writes on `path`.
    fn register_command_path(&self, path: &str);

    /// Persists renewed credentials into the plugin settings.
    fn save_auth_info(&self, auth: &AuthInfo);
}
