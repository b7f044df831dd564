// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud credentials and their renewal.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::AuthInfo;
use crate::host::Host;

use super::api::CloudApi;

/// What the socket connector needs to open an authenticated socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Account region.
    pub region: String,
    /// Current access token.
    pub access_token: String,
    /// Account API key.
    pub apikey: String,
    /// Application id.
    pub app_id: String,
}

/// Current credentials, shared by the REST calls and the socket.
pub struct CloudSession {
    api: Arc<dyn CloudApi>,
    host: Arc<dyn Host>,
    auth: Mutex<AuthInfo>,
    apikey: Mutex<Option<String>>,
    app_id: String,
}

impl CloudSession {
    /// Creates a session from the configured credentials.
    #[must_use]
    pub fn new(
        api: Arc<dyn CloudApi>,
        host: Arc<dyn Host>,
        auth: AuthInfo,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            host,
            auth: Mutex::new(auth),
            apikey: Mutex::new(None),
            app_id: app_id.into(),
        }
    }

    /// REST client.
    #[must_use]
    pub fn api(&self) -> &Arc<dyn CloudApi> {
        &self.api
    }

    /// Snapshot of the credentials.
    #[must_use]
    pub fn auth(&self) -> AuthInfo {
        self.auth.lock().clone()
    }

    /// Sets the account API key (learnt from the device listing).
    pub fn set_apikey(&self, apikey: Option<String>) {
        *self.apikey.lock() = apikey;
    }

    /// Returns socket credentials, or `None` while the API key is unknown.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let apikey = self.apikey.lock().clone()?;
        let auth = self.auth.lock();
        Some(Session {
            region: auth.region.clone(),
            access_token: auth.access_token.clone(),
            apikey,
            app_id: self.app_id.clone(),
        })
    }

    /// Renews the access token if it has expired.
    ///
    /// The renewed credentials are handed to the host for persistence. On
    /// failure the error is reported and the old token is kept.
    ///
    /// Returns true if the token was renewed.
    pub async fn refresh_if_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        let mut auth = self.auth();
        if !auth.is_access_expired(now) {
            return false;
        }

        tracing::info!(region = %auth.region, "Access token expired, refreshing");
        match self.api.refresh_token(&auth).await {
            Ok(grant) => {
                auth.apply_grant(grant, now);
                *self.auth.lock() = auth.clone();
                self.host.save_auth_info(&auth);
                tracing::info!("Access token renewed");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to refresh access token");
                self.host
                    .report_error(&format!("error refreshing token: {e}"));
                false
            }
        }
    }
}

impl std::fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSession")
            .field("region", &self.auth.lock().region)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}
