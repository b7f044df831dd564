// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge: device synchronization between eWeLink and the host.
//!
//! A [`Bridge`] is wired once with its collaborators and then started and
//! stopped as the host enables and disables it. Starting:
//!
//! 1. parses the settings (a configuration error is reported and nothing is
//!    opened),
//! 2. renews the access token if needed and lists families and devices,
//!    falling back to the device cache when the cloud is unreachable,
//! 3. registers a command path for every enabled point and publishes the
//!    cached state,
//! 4. opens the cloud socket once the account API key is known and, in LAN
//!    mode, starts listening for advertisements.
//!
//! Host writes go through [`Bridge::put`], which answers with a
//! [`CommandTicket`].

mod context;
mod routes;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub use routes::{Route, RouteTable};

use crate::command::{CommandOutcome, CommandTicket};
use crate::config::{BridgeOptions, BridgeSettings};
use crate::device::{Device, DeviceRegistry};
use crate::error::{ConfigError, Error, Result};
use crate::host::Host;
#[cfg(feature = "mdns")]
use crate::protocol::MdnsDiscovery;
use crate::protocol::{
    ChannelDriver, CloudApi, CloudSession, ConnectionState, CoolkitApi, Discovery, Family,
    LanChannel, LanClient, SocketConnector, WsConnector, ZeroconfClient,
};

use context::Context;

const INBOUND_CAPACITY: usize = 64;

/// Builder for [`Bridge`].
///
/// Only the host is required; the other collaborators default to the real
/// cloud, LAN and mDNS implementations.
#[derive(Default)]
pub struct BridgeBuilder {
    host: Option<Arc<dyn Host>>,
    api: Option<Arc<dyn CloudApi>>,
    connector: Option<Arc<dyn SocketConnector>>,
    lan_client: Option<Arc<dyn LanClient>>,
    discovery: Option<Arc<dyn Discovery>>,
    options: Option<BridgeOptions>,
}

impl BridgeBuilder {
    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the cloud REST client.
    #[must_use]
    pub fn with_cloud_api(mut self, api: Arc<dyn CloudApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the cloud socket connector.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the LAN command client.
    #[must_use]
    pub fn with_lan_client(mut self, client: Arc<dyn LanClient>) -> Self {
        self.lan_client = Some(client);
        self
    }

    /// Sets the advertisement source.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Builds the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] without a host, or the error of a
    /// default HTTP client that cannot be created.
    pub fn build(self) -> Result<Bridge> {
        let host = self
            .host
            .ok_or_else(|| ConfigError::Invalid("a host is required".to_string()))?;
        let options = self.options.unwrap_or_else(|| BridgeOptions::new("."));

        let api: Arc<dyn CloudApi> = match self.api {
            Some(api) => api,
            None => Arc::new(CoolkitApi::new()?.with_app_id(options.app_id.clone())),
        };
        let connector: Arc<dyn SocketConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::new()?),
        };
        let lan_client: Arc<dyn LanClient> = match self.lan_client {
            Some(client) => client,
            None => Arc::new(ZeroconfClient::new()?),
        };
        #[cfg(feature = "mdns")]
        let discovery = self
            .discovery
            .or_else(|| Some(Arc::new(MdnsDiscovery::new()) as Arc<dyn Discovery>));
        #[cfg(not(feature = "mdns"))]
        let discovery = self.discovery;

        Ok(Bridge {
            host,
            api,
            connector,
            lan_client,
            discovery,
            options,
            context: Mutex::new(None),
        })
    }
}

/// Synchronizes eWeLink devices with the host.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use ewelink_bridge::config::{AuthInfo, BridgeOptions};
/// use ewelink_bridge::host::Host;
/// use ewelink_bridge::state::Delta;
/// use ewelink_bridge::Bridge;
/// use serde_json::json;
///
/// struct Stdout;
///
/// impl Host for Stdout {
///     fn publish(&self, delta: Delta) {
///         println!("{}", serde_json::to_string(&delta).unwrap());
///     }
///     fn report_error(&self, message: &str) {
///         eprintln!("error: {message}");
///     }
///     fn report_status(&self, message: &str) {
///         eprintln!("{message}");
///     }
///     fn register_command_path(&self, _path: &str) {}
///     fn save_auth_info(&self, _auth: &AuthInfo) {}
/// }
///
/// #[tokio::main]
/// async fn main() -> ewelink_bridge::Result<()> {
///     let bridge = Bridge::builder()
///         .with_host(Arc::new(Stdout))
///         .with_options(BridgeOptions::new("/var/lib/ewelink"))
///         .build()?;
///
///     bridge.start(&json!({ "authInfo": "{...}" })).await?;
///     let outcome = bridge
///         .put("electrical.switches.deckLights.state", &json!(1))
///         .outcome()
///         .await;
///     println!("{}", outcome.status_code);
///     bridge.stop().await;
///     Ok(())
/// }
/// ```
pub struct Bridge {
    host: Arc<dyn Host>,
    api: Arc<dyn CloudApi>,
    connector: Arc<dyn SocketConnector>,
    lan_client: Arc<dyn LanClient>,
    discovery: Option<Arc<dyn Discovery>>,
    options: BridgeOptions,
    context: Mutex<Option<Arc<Context>>>,
}

impl Bridge {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    fn context(&self) -> Option<Arc<Context>> {
        self.context.lock().clone()
    }

    /// Returns true between a successful [`start`](Self::start) and
    /// [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.context.lock().is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the bridge with a settings document, stopping a previous run
    /// first.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings or the authentication info
    /// are invalid; the error is also reported to the host.
    pub async fn start(&self, settings: &Value) -> Result<()> {
        self.stop().await;

        let (settings, auth) =
            match BridgeSettings::from_value(settings).and_then(|s| s.auth_info().map(|a| (s, a)))
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid settings, bridge not started");
                    self.host.report_error(&e.to_string());
                    return Err(e.into());
                }
            };

        let device_cache = self.options.device_cache_path();
        let mut registry = DeviceRegistry::load_cache(&device_cache);

        let session = Arc::new(CloudSession::new(
            Arc::clone(&self.api),
            Arc::clone(&self.host),
            auth,
            self.options.app_id.clone(),
        ));
        session.refresh_if_expired().await;
        let auth = session.auth();

        let families = match self.api.families(&auth).await {
            Ok(families) => families,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list families");
                Vec::new()
            }
        };

        match self.api.list_devices(&auth, settings.family.as_deref()).await {
            Ok(devices) => {
                let dropped = registry.replace_all(devices);
                if !dropped.is_empty() {
                    tracing::info!(dropped = ?dropped, "Devices no longer listed");
                }
                if let Err(e) = registry.save_cache(&device_cache) {
                    tracing::error!(path = %device_cache.display(), error = %e, "Failed to save device cache");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, cached = registry.len(), "Failed to list devices, using cache");
                self.host
                    .report_error(&format!("unable to get devices: {e}"));
            }
        }
        session.set_apikey(registry.user_apikey().map(str::to_string));

        let lan_mode = settings.lan_mode;
        let device_count = registry.len();
        let lan = LanChannel::with_cache(Arc::clone(&self.lan_client), self.options.lan_cache_path());
        let context = Arc::new(Context::new(
            Arc::clone(&self.host),
            self.options.clone(),
            settings,
            registry,
            lan,
            Arc::clone(&session),
            families,
        ));

        context.rebuild_routes();
        context.publish_all();
        *self.context.lock() = Some(Arc::clone(&context));

        if session.session().is_some() {
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
            let driver = ChannelDriver {
                session,
                connector: Arc::clone(&self.connector),
                host: Arc::clone(&self.host),
                reconnection: self.options.reconnection.clone(),
                ping_interval: self.options.ping_interval,
                inbound: inbound_tx,
            };
            context.spawn(Arc::clone(&context.cloud).run(driver, context.cancel.child_token()));
            context.spawn(Arc::clone(&context).run_cloud_inbound(inbound_rx));
        } else {
            tracing::warn!("No account API key known, cloud connection not started");
        }

        if lan_mode && let Some(discovery) = &self.discovery {
            match discovery.start(context.cancel.child_token()) {
                Ok(records) => context.spawn(Arc::clone(&context).run_discovery(records)),
                Err(e) => {
                    tracing::error!(error = %e, "LAN discovery not started");
                    self.host
                        .report_error(&format!("unable to start LAN discovery: {e}"));
                }
            }
        }

        tracing::info!(devices = device_count, lan_mode, "Bridge started");
        self.host
            .report_status(&format!("Started with {device_count} devices"));
        Ok(())
    }

    /// Stops every task, closes the cloud socket and drops all state.
    ///
    /// Pending commands resolve as failed.
    pub async fn stop(&self) {
        let context = self.context.lock().take();
        if let Some(context) = context {
            context.shutdown().await;
            tracing::info!("Bridge stopped");
        }
    }

    /// Applies new settings to the running bridge.
    ///
    /// Routes are rebuilt and re-registered; credentials and family changes
    /// take effect on the next start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings and
    /// [`Error::NotRunning`] if the bridge is stopped.
    pub fn update_settings(&self, settings: &Value) -> Result<()> {
        let context = self.context().ok_or(Error::NotRunning)?;
        let settings = BridgeSettings::from_value(settings).inspect_err(|e| {
            self.host.report_error(&e.to_string());
        })?;
        *context.settings.write() = settings;
        context.rebuild_routes();
        tracing::info!("Settings updated");
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Writes `value` to `path`.
    ///
    /// Returns at once; the ticket resolves when the device or the cloud
    /// answers, the command times out, or the bridge stops. Failures that
    /// are known immediately (unknown path, invalid value, bridge stopped)
    /// come back as an already resolved 400 ticket.
    ///
    /// Must be called within a tokio runtime.
    pub fn put(&self, path: &str, value: &Value) -> CommandTicket {
        let Some(context) = self.context() else {
            return CommandTicket::completed(CommandOutcome::from_error(&Error::NotRunning));
        };
        match context.prepare(path, value) {
            Ok(dispatch) => {
                tracing::debug!(path, transport = ?dispatch.transport, "Dispatching command");
                context.dispatch(dispatch)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "Command rejected");
                CommandTicket::completed(CommandOutcome::from_error(&e))
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Families of the account, as listed at start.
    #[must_use]
    pub fn families(&self) -> Vec<Family> {
        self.context()
            .map(|context| context.families.clone())
            .unwrap_or_default()
    }

    /// Snapshot of a device.
    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.context()?.registry.lock().get(device_id).cloned()
    }

    /// Every writable path.
    #[must_use]
    pub fn command_paths(&self) -> Vec<String> {
        self.context()
            .map(|context| context.routes.read().paths().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Number of cloud commands waiting for an acknowledgement.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.context()
            .map_or(0, |context| context.correlator.len())
    }

    /// State of the cloud connection.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.context()
            .map_or(ConnectionState::Disconnected, |context| context.cloud.state())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("options", &self.options)
            .field("context", &self.context.lock())
            .finish_non_exhaustive()
    }
}
