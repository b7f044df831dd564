// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LAN transport.
//!
//! Commands go straight to the device's zeroconf HTTP endpoint, encrypted
//! with the device key. The endpoint (address, port, IV) is learnt from the
//! device's mDNS advertisements and cached in `lan-info.json` so commands
//! work right after a restart, before the next advertisement.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::Device;
use crate::error::{Error, ParseError, ProtocolError, Result};
use crate::persist;

use super::crypto;
use super::discovery::DiscoveryRecord;

/// `selfApikey` value the zeroconf API expects from LAN clients.
const LAN_SELF_APIKEY: &str = "123";

/// Where a device can be reached on the LAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanEndpoint {
    /// Device address.
    pub ip: IpAddr,
    /// Zeroconf HTTP port.
    pub port: u16,
    /// Base64 IV from the latest advertisement.
    pub iv: String,
}

impl From<&DiscoveryRecord> for LanEndpoint {
    fn from(record: &DiscoveryRecord) -> Self {
        Self {
            ip: record.ip,
            port: record.port,
            iv: record.iv.clone(),
        }
    }
}

/// Endpoints keyed by device id; the on-disk form of `lan-info.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable {
    endpoints: BTreeMap<String, LanEndpoint>,
}

impl EndpointTable {
    /// Returns the endpoint of a device.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<&LanEndpoint> {
        self.endpoints.get(device_id)
    }

    /// Stores the endpoint of a device, replacing any previous one.
    pub fn insert(&mut self, device_id: impl Into<String>, endpoint: LanEndpoint) {
        self.endpoints.insert(device_id.into(), endpoint);
    }

    /// Number of known endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns true if no endpoint is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Body of a zeroconf request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroconfBody {
    /// Request sequence, epoch milliseconds as a string.
    pub sequence: String,
    /// Target device id.
    pub deviceid: String,
    /// Fixed LAN api key.
    pub self_apikey: String,
    /// Base64 IV used for `data`.
    pub iv: String,
    /// Always true; devices in LAN mode only accept encrypted payloads.
    pub encrypt: bool,
    /// Base64 encrypted parameters.
    pub data: String,
}

/// A request to a device's zeroconf endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroconfRequest {
    /// Target endpoint.
    pub endpoint: LanEndpoint,
    /// `switch` for single relays, `switches` for banks.
    pub operation: &'static str,
    /// Request body.
    pub body: ZeroconfBody,
}

impl ZeroconfRequest {
    /// URL of the request.
    #[must_use]
    pub fn url(&self) -> String {
        let host = match self.endpoint.ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{ip}]"),
        };
        format!(
            "http://{host}:{}/zeroconf/{}",
            self.endpoint.port, self.operation
        )
    }
}

/// Sends zeroconf requests.
#[async_trait]
pub trait LanClient: Send + Sync {
    /// Sends one request and waits for the device's answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached or rejects the
    /// request.
    async fn send(&self, request: ZeroconfRequest) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ZeroconfReply {
    error: i64,
}

/// [`LanClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct ZeroconfClient {
    client: Client,
}

impl ZeroconfClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProtocolError::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LanClient for ZeroconfClient {
    async fn send(&self, request: ZeroconfRequest) -> Result<()> {
        let url = request.url();
        tracing::debug!(url = %url, device_id = %request.body.deviceid, "Sending zeroconf request");

        let response = self
            .client
            .post(&url)
            .json(&request.body)
            .send()
            .await
            .map_err(ProtocolError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CommandRejected(format!("device answered HTTP {status}")));
        }

        let reply: ZeroconfReply = response
            .json()
            .await
            .map_err(|e| ParseError::UnexpectedFormat(e.to_string()))?;

        if reply.error == 0 {
            Ok(())
        } else {
            Err(Error::CommandRejected(format!(
                "device returned error {}",
                reply.error
            )))
        }
    }
}

/// LAN side of the bridge: endpoint bookkeeping and command delivery.
pub struct LanChannel {
    client: Arc<dyn LanClient>,
    endpoints: Mutex<EndpointTable>,
    cache_path: Option<PathBuf>,
}

impl LanChannel {
    /// Creates a channel with an empty endpoint table and no cache file.
    #[must_use]
    pub fn new(client: Arc<dyn LanClient>) -> Self {
        Self {
            client,
            endpoints: Mutex::new(EndpointTable::default()),
            cache_path: None,
        }
    }

    /// Creates a channel backed by an endpoint cache file, loading it.
    #[must_use]
    pub fn with_cache(client: Arc<dyn LanClient>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let endpoints: EndpointTable = persist::load_json(&path).unwrap_or_default();
        tracing::debug!(count = endpoints.len(), "Loaded LAN endpoints");
        Self {
            client,
            endpoints: Mutex::new(endpoints),
            cache_path: Some(path),
        }
    }

    /// Returns true if an endpoint is known for the device.
    #[must_use]
    pub fn has_endpoint(&self, device_id: &str) -> bool {
        self.endpoints.lock().get(device_id).is_some()
    }

    /// Returns the endpoint of a device.
    #[must_use]
    pub fn endpoint(&self, device_id: &str) -> Option<LanEndpoint> {
        self.endpoints.lock().get(device_id).cloned()
    }

    /// Records the endpoint carried by an advertisement and rewrites the
    /// cache file.
    pub fn record_endpoint(&self, record: &DiscoveryRecord) {
        let snapshot = {
            let mut endpoints = self.endpoints.lock();
            endpoints.insert(record.device_id.clone(), LanEndpoint::from(record));
            endpoints.clone()
        };
        if let Some(path) = &self.cache_path
            && let Err(e) = persist::save_json(path, &snapshot)
        {
            tracing::error!(path = %path.display(), error = %e, "Failed to save LAN endpoints");
        }
    }

    /// Sends parameters to a device over the LAN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEndpointKnown`] if the device has not been seen on
    /// the LAN, or the error of the encryption or of the request.
    pub async fn send_command(&self, device: &Device, params: &Map<String, Value>) -> Result<()> {
        let endpoint = self
            .endpoint(&device.id)
            .ok_or_else(|| Error::NoEndpointKnown(device.id.clone()))?;

        let plain = serde_json::to_string(params).map_err(ParseError::from)?;
        let iv = crypto::random_iv();
        let data = crypto::encrypt(&plain, &device.device_key, &iv)?;
        let operation = if params.contains_key("switches") {
            "switches"
        } else {
            "switch"
        };

        let request = ZeroconfRequest {
            body: ZeroconfBody {
                sequence: chrono::Utc::now().timestamp_millis().to_string(),
                deviceid: device.id.clone(),
                self_apikey: LAN_SELF_APIKEY.to_string(),
                iv,
                encrypt: true,
                data,
            },
            endpoint,
            operation,
        };

        self.client.send(request).await
    }
}

impl std::fmt::Debug for LanChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanChannel")
            .field("endpoints", &self.endpoints.lock().len())
            .field("cache_path", &self.cache_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingClient {
        requests: Arc<Mutex<Vec<ZeroconfRequest>>>,
    }

    #[async_trait]
    impl LanClient for RecordingClient {
        async fn send(&self, request: ZeroconfRequest) -> Result<()> {
            self.requests.lock().push(request);
            Ok(())
        }
    }

    fn record(device_id: &str) -> DiscoveryRecord {
        DiscoveryRecord {
            device_id: device_id.to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            port: 8081,
            iv: crypto::random_iv(),
            encrypted_payload: String::new(),
        }
    }

    #[tokio::test]
    async fn no_endpoint_known() {
        let channel = LanChannel::new(Arc::new(RecordingClient::default()));
        let device = Device::new("1000sw", "Anchor", 1).with_device_key("k");
        let params = json!({ "switch": "on" });

        let err = channel
            .send_command(&device, params.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoEndpointKnown(id) if id == "1000sw"));
    }

    #[tokio::test]
    async fn sends_encrypted_payload() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let channel = LanChannel::new(Arc::new(RecordingClient {
            requests: Arc::clone(&requests),
        }));
        let advertised = record("1000bank");
        channel.record_endpoint(&advertised);
        let device = Device::new("1000bank", "Bank", 4).with_device_key("secret");
        let params = json!({ "switches": [{ "switch": "on", "outlet": 2 }] });

        channel
            .send_command(&device, params.as_object().unwrap())
            .await
            .unwrap();

        let sent = requests.lock().pop().unwrap();
        assert_eq!(sent.operation, "switches");
        assert_eq!(sent.url(), "http://192.168.1.20:8081/zeroconf/switches");
        assert_eq!(sent.body.self_apikey, "123");
        assert!(sent.body.encrypt);
        assert_ne!(sent.body.iv, advertised.iv);
        let decrypted = crypto::decrypt_params(&sent.body.data, "secret", &sent.body.iv).unwrap();
        assert_eq!(Value::Object(decrypted), params);
    }

    #[test]
    fn endpoints_persist_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lan-info.json");

        let channel = LanChannel::with_cache(Arc::new(RecordingClient::default()), &path);
        let advertised = record("1000sw");
        channel.record_endpoint(&advertised);

        let reloaded = LanChannel::with_cache(Arc::new(RecordingClient::default()), &path);
        assert_eq!(reloaded.endpoint("1000sw"), Some(LanEndpoint::from(&advertised)));
    }

    #[test]
    fn cache_file_shape() {
        let mut table = EndpointTable::default();
        table.insert(
            "1000sw",
            LanEndpoint {
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
                port: 8081,
                iv: "aXY=".to_string(),
            },
        );
        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            json!({ "1000sw": { "ip": "10.0.0.7", "port": 8081, "iv": "aXY=" } })
        );
    }

    #[test]
    fn ipv6_url() {
        let request = ZeroconfRequest {
            endpoint: LanEndpoint {
                ip: "fe80::1".parse().unwrap(),
                port: 8081,
                iv: String::new(),
            },
            operation: "switch",
            body: ZeroconfBody {
                sequence: "1".to_string(),
                deviceid: "d".to_string(),
                self_apikey: LAN_SELF_APIKEY.to_string(),
                iv: String::new(),
                encrypt: true,
                data: String::new(),
            },
        };
        assert_eq!(request.url(), "http://[fe80::1]:8081/zeroconf/switch");
    }
}
