// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State of a running bridge.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::{
    CommandCompletion, CommandCorrelator, CommandOutcome, CommandTicket, DeviceCommand,
};
use crate::config::{BridgeOptions, BridgeSettings};
use crate::device::{Device, DeviceRegistry};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::protocol::{
    CloudChannel, CloudMessage, CloudSession, CommandFrame, ConnectionState, DiscoveryRecord,
    Family, LanChannel, SequenceGenerator, Transport, crypto, select_transport,
};
use crate::state::DeltaPublisher;

use super::routes::RouteTable;

/// A validated host write, ready to send.
#[derive(Debug)]
pub(super) struct Dispatch {
    pub device: Device,
    pub command: DeviceCommand,
    pub transport: Transport,
}

/// Everything owned between `start` and `stop`.
///
/// Locks are taken in the order settings, registry, publisher and are never
/// held across an await.
pub(super) struct Context {
    pub host: Arc<dyn Host>,
    pub options: BridgeOptions,
    pub settings: RwLock<BridgeSettings>,
    pub registry: Mutex<DeviceRegistry>,
    pub publisher: Mutex<DeltaPublisher>,
    pub routes: RwLock<RouteTable>,
    pub lan: LanChannel,
    pub session: Arc<CloudSession>,
    pub cloud: Arc<CloudChannel>,
    pub correlator: Arc<CommandCorrelator>,
    pub sequences: SequenceGenerator,
    pub families: Vec<Family>,
    pub cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Arc<dyn Host>,
        options: BridgeOptions,
        settings: BridgeSettings,
        registry: DeviceRegistry,
        lan: LanChannel,
        session: Arc<CloudSession>,
        families: Vec<Family>,
    ) -> Self {
        Self {
            host,
            options,
            settings: RwLock::new(settings),
            registry: Mutex::new(registry),
            publisher: Mutex::new(DeltaPublisher::new()),
            routes: RwLock::new(RouteTable::default()),
            lan,
            session,
            cloud: CloudChannel::new(),
            correlator: Arc::new(CommandCorrelator::new()),
            sequences: SequenceGenerator::new(),
            families,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a task that is awaited on shutdown.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(tokio::spawn(future));
    }

    /// Cancels every task, abandons pending commands and waits for the
    /// tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.correlator.clear();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Bridge task ended abnormally");
            }
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Rebuilds the route table and announces every writable path.
    pub fn rebuild_routes(&self) {
        let table = {
            let settings = self.settings.read();
            let registry = self.registry.lock();
            RouteTable::build(&registry, &settings)
        };
        for path in table.paths() {
            self.host.register_command_path(path);
        }
        *self.routes.write() = table;
    }

    /// Publishes the full state of every device.
    pub fn publish_all(&self) {
        let deltas = {
            let settings = self.settings.read();
            let mut registry = self.registry.lock();
            let mut publisher = self.publisher.lock();
            let ids: Vec<String> = registry.iter().map(|d| d.id.clone()).collect();
            let mut deltas = Vec::new();
            for id in ids {
                if let Some(device) = registry.get_mut(&id) {
                    let params = device.params.clone();
                    deltas.extend(publisher.apply_update(device, &params, &settings));
                }
            }
            deltas
        };
        for delta in deltas {
            self.host.publish(delta);
        }
    }

    /// Merges a fragment into a device and publishes the result.
    ///
    /// Returns false if the device is unknown.
    pub fn apply_fragment(&self, device_id: &str, fragment: &Map<String, Value>) -> bool {
        let deltas = {
            let settings = self.settings.read();
            let mut registry = self.registry.lock();
            let Some(device) = registry.get_mut(device_id) else {
                return false;
            };
            self.publisher
                .lock()
                .apply_update(device, fragment, &settings)
        };
        for delta in deltas {
            self.host.publish(delta);
        }
        true
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handles cloud frames until cancelled or the channel closes.
    pub async fn run_cloud_inbound(self: Arc<Self>, mut inbound: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                frame = inbound.recv() => {
                    let Some(text) = frame else {
                        break;
                    };
                    self.handle_cloud_text(&text).await;
                }
            }
        }
        tracing::debug!("Cloud inbound handler stopped");
    }

    pub async fn handle_cloud_text(&self, text: &str) {
        let message = match CloudMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable cloud frame");
                return;
            }
        };

        match message {
            CloudMessage::State { device_id, params } => {
                tracing::debug!(device = %device_id, "Cloud state update");
                if !self.apply_fragment(&device_id, &params) {
                    tracing::error!(device = %device_id, "State update for unknown device");
                }
            }
            CloudMessage::Ack {
                sequence,
                error,
                reason,
            } => {
                let outcome = CommandOutcome::from_ack(error, reason.as_deref());
                let Some(frame) = self.correlator.resolve(&sequence, outcome) else {
                    tracing::debug!(sequence = %sequence, "Acknowledgement without pending command");
                    return;
                };
                if frame.is_power_only() {
                    return;
                }
                let query = frame.to_query(self.sequences.next());
                if let Err(e) = self.cloud.send(query.to_text()).await {
                    tracing::warn!(device = %frame.deviceid, error = %e, "Follow-up query not sent");
                }
            }
            CloudMessage::Pong | CloudMessage::Other => {
                tracing::trace!("Ignoring cloud frame");
            }
        }
    }

    /// Handles LAN advertisements until cancelled or discovery stops.
    pub async fn run_discovery(self: Arc<Self>, mut records: mpsc::Receiver<DiscoveryRecord>) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                record = records.recv() => {
                    let Some(record) = record else {
                        break;
                    };
                    self.handle_discovery(&record);
                }
            }
        }
        tracing::debug!("Discovery handler stopped");
    }

    pub fn handle_discovery(&self, record: &DiscoveryRecord) {
        let device_key = self
            .registry
            .lock()
            .get(&record.device_id)
            .map(|d| d.device_key.clone());
        let Some(device_key) = device_key else {
            tracing::debug!(device = %record.device_id, "Advertisement from unknown device dropped");
            return;
        };

        self.lan.record_endpoint(record);
        if record.encrypted_payload.is_empty() {
            tracing::debug!(device = %record.device_id, ip = %record.ip, "Advertisement without state");
            return;
        }

        match crypto::decrypt_params(&record.encrypted_payload, &device_key, &record.iv) {
            Ok(params) => {
                tracing::debug!(device = %record.device_id, ip = %record.ip, "LAN state update");
                self.apply_fragment(&record.device_id, &params);
            }
            Err(e) => {
                tracing::error!(device = %record.device_id, error = %e, "Failed to decrypt advertisement");
                self.host.report_error("unable to decrypt mdns data");
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Resolves a host write to a device, a command and a transport.
    pub fn prepare(&self, path: &str, value: &Value) -> Result<Dispatch> {
        let route = self
            .routes
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::UnknownPath(path.to_string()))?;

        let settings = self.settings.read();
        let device = self
            .registry
            .lock()
            .get(&route.device_id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(route.device_id.clone()))?;
        let device_settings = settings.device(&device.id);

        let command = route.kind.parse(value, device_settings)?;
        let transport = select_transport(
            &device,
            device_settings,
            settings.lan_mode,
            self.lan.has_endpoint(&device.id),
        );
        Ok(Dispatch {
            device,
            command,
            transport,
        })
    }

    /// Sends a prepared command in the background.
    pub fn dispatch(self: &Arc<Self>, dispatch: Dispatch) -> CommandTicket {
        let (completion, ticket) = CommandTicket::pending();
        let context = Arc::clone(self);
        tokio::spawn(async move {
            match dispatch.transport {
                Transport::Lan => context.send_lan(&dispatch, completion).await,
                Transport::Cloud => context.send_cloud(&dispatch, completion).await,
            }
        });
        ticket
    }

    async fn send_lan(&self, dispatch: &Dispatch, completion: CommandCompletion) {
        let device = &dispatch.device;
        tracing::debug!(device = %device.id, command = ?dispatch.command, "Sending LAN command");
        let outcome = match self
            .lan
            .send_command(device, &dispatch.command.to_params())
            .await
        {
            Ok(()) => CommandOutcome::success(),
            Err(e) => {
                tracing::warn!(device = %device.id, error = %e, "LAN command failed");
                CommandOutcome::from_error(&e)
            }
        };
        let _ = completion.send(outcome);
    }

    async fn send_cloud(&self, dispatch: &Dispatch, completion: CommandCompletion) {
        let device = &dispatch.device;
        let Some(session) = self.session.session() else {
            let _ = completion.send(CommandOutcome::from_error(&Error::NotConnected));
            return;
        };
        if self.cloud.state() != ConnectionState::Connected {
            tracing::debug!(device = %device.id, state = %self.cloud.state(), "Cloud command while not connected");
            let _ = completion.send(CommandOutcome::from_error(&Error::NotConnected));
            return;
        }

        let frame = CommandFrame::update(
            &session.apikey,
            &device.id,
            dispatch.command.to_params(),
            self.sequences.next(),
        );
        let sequence = frame.sequence.clone();
        let text = frame.to_text();
        if self.correlator.register(frame, completion).is_err() {
            return;
        }

        tracing::debug!(device = %device.id, sequence = %sequence, command = ?dispatch.command, "Sending cloud command");
        match self.cloud.send(text).await {
            Ok(()) => self.correlator.arm_timeout(
                sequence,
                self.options.command_timeout,
                self.cancel.child_token(),
            ),
            Err(e) => {
                tracing::warn!(device = %device.id, error = %e, "Cloud command not sent");
                self.correlator
                    .resolve(&sequence, CommandOutcome::from_error(&e));
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("devices", &self.registry.lock().len())
            .field("cloud", &self.cloud.state())
            .field("pending", &self.correlator.len())
            .finish_non_exhaustive()
    }
}
