// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LAN advertisement discovery.
//!
//! Devices in LAN mode advertise `_ewelink._tcp` over mDNS. The TXT record
//! carries the device id, the IV and the encrypted state, split over
//! `data1`..`data4`. A [`Discovery`] implementation turns advertisements
//! into [`DiscoveryRecord`]s; the bridge decrypts them.

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ParseError};

/// mDNS service type advertised by eWeLink devices.
pub const SERVICE_TYPE: &str = "_ewelink._tcp.local.";

/// One advertisement from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Vendor device id.
    pub device_id: String,
    /// Address the device answers on.
    pub ip: IpAddr,
    /// Zeroconf HTTP port.
    pub port: u16,
    /// Base64 IV of the payload.
    pub iv: String,
    /// Base64 encrypted state fragment; empty when the device sent none.
    pub encrypted_payload: String,
}

impl DiscoveryRecord {
    /// Builds a record from TXT properties.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] if `id` or `iv` is missing or
    /// empty.
    pub fn from_txt(
        txt: &HashMap<String, String>,
        ip: IpAddr,
        port: u16,
    ) -> Result<Self, ParseError> {
        let field = |name: &str| {
            txt.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ParseError::MissingField(name.to_string()))
        };

        let device_id = field("id")?;
        let iv = field("iv")?;
        let encrypted_payload: String = ["data1", "data2", "data3", "data4"]
            .iter()
            .filter_map(|part| txt.get(*part))
            .map(String::as_str)
            .collect();

        Ok(Self {
            device_id,
            ip,
            port,
            iv,
            encrypted_payload,
        })
    }
}

/// Source of LAN advertisements.
///
/// `start` returns a channel that yields records until `cancel` fires or
/// the source fails.
pub trait Discovery: Send + Sync {
    /// Starts listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be started.
    fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<DiscoveryRecord>, Error>;
}

#[cfg(feature = "mdns")]
pub use mdns::MdnsDiscovery;

#[cfg(feature = "mdns")]
mod mdns {
    use std::net::IpAddr;
    use std::time::Duration;

    use mdns_sd::{ServiceDaemon, ServiceEvent};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{Discovery, DiscoveryRecord, SERVICE_TYPE};
    use crate::error::{Error, ProtocolError};

    const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Discovery over multicast DNS.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MdnsDiscovery;

    impl MdnsDiscovery {
        /// Creates the mDNS discovery source.
        #[must_use]
        pub fn new() -> Self {
            Self
        }
    }

    impl Discovery for MdnsDiscovery {
        fn start(
            &self,
            cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<DiscoveryRecord>, Error> {
            let daemon = ServiceDaemon::new()
                .map_err(|e| ProtocolError::ConnectionFailed(format!("mDNS daemon: {e}")))?;
            let receiver = daemon
                .browse(SERVICE_TYPE)
                .map_err(|e| ProtocolError::ConnectionFailed(format!("mDNS browse: {e}")))?;
            let (tx, rx) = mpsc::channel(32);

            tracing::info!(service = SERVICE_TYPE, "Browsing for LAN devices");

            tokio::task::spawn_blocking(move || {
                while !cancel.is_cancelled() {
                    let Ok(event) = receiver.recv_timeout(POLL_INTERVAL) else {
                        continue;
                    };
                    let ServiceEvent::ServiceResolved(resolved) = event else {
                        continue;
                    };
                    if !resolved.is_valid() {
                        continue;
                    }
                    let Some(ip) = resolved.get_addresses_v4().into_iter().next() else {
                        tracing::warn!(service = %resolved.fullname, "Advertisement without IPv4 address");
                        continue;
                    };
                    let txt = resolved.txt_properties.clone().into_property_map_str();
                    match DiscoveryRecord::from_txt(&txt, IpAddr::V4(ip), resolved.port) {
                        Ok(record) => {
                            tracing::debug!(device_id = %record.device_id, ip = %record.ip, "LAN advertisement");
                            if tx.blocking_send(record).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(service = %resolved.fullname, error = %e, "Invalid LAN advertisement");
                        }
                    }
                }
                let _ = daemon.stop_browse(SERVICE_TYPE);
                let _ = daemon.shutdown();
                tracing::debug!("mDNS browsing stopped");
            });

            Ok(rx)
        }
    }
}
